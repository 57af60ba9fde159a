//! Capture device seam.
//!
//! A [`CaptureDevice`] turns an acquired stream into an ordered feed of PCM
//! frames and supports the recorder lifecycle (start/pause/resume/stop).
//! [`StreamCaptureDevice`] is the stream-backed implementation;
//! [`MockCaptureDevice`] exists for controller tests.

use crate::audio::stream::{MicStream, PcmFrame};
use crate::error::{Result, SottoError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::warn;

/// Lifecycle state of a capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Created but never started.
    Inactive,
    /// Actively delivering frames.
    Recording,
    /// Started but currently suppressing frame delivery.
    Paused,
    /// Stopped; will never deliver frames again.
    Stopped,
}

const STATE_INACTIVE: u8 = 0;
const STATE_RECORDING: u8 = 1;
const STATE_PAUSED: u8 = 2;
const STATE_STOPPED: u8 = 3;

fn decode_state(raw: u8) -> DeviceState {
    match raw {
        STATE_RECORDING => DeviceState::Recording,
        STATE_PAUSED => DeviceState::Paused,
        STATE_STOPPED => DeviceState::Stopped,
        _ => DeviceState::Inactive,
    }
}

/// Trait for capture devices.
///
/// This trait allows swapping implementations (stream-backed vs mock).
pub trait CaptureDevice: Send {
    /// Start capturing. Returns the frame feed; may only be called once.
    fn start(&mut self) -> Result<mpsc::UnboundedReceiver<PcmFrame>>;

    /// Suspend frame delivery. Frames arriving while paused are dropped.
    fn pause(&mut self);

    /// Resume frame delivery after a pause.
    fn resume(&mut self);

    /// Stop capturing permanently.
    fn stop(&mut self);

    /// Current device state.
    fn state(&self) -> DeviceState;
}

/// Factory for capture devices, one per acquired stream.
pub trait DeviceFactory: Send + Sync {
    /// Open a capture device attached to the given stream.
    fn open(&self, stream: &MicStream) -> Box<dyn CaptureDevice>;
}

/// Capture device that forwards frames from a [`MicStream`] subscription.
pub struct StreamCaptureDevice {
    frames: broadcast::Sender<PcmFrame>,
    state: Arc<AtomicU8>,
    task: Option<JoinHandle<()>>,
}

impl StreamCaptureDevice {
    /// Creates a device attached to the given stream.
    pub fn new(stream: &MicStream) -> Self {
        Self {
            frames: stream.sender(),
            state: Arc::new(AtomicU8::new(STATE_INACTIVE)),
            task: None,
        }
    }
}

impl CaptureDevice for StreamCaptureDevice {
    fn start(&mut self) -> Result<mpsc::UnboundedReceiver<PcmFrame>> {
        if self.task.is_some() {
            return Err(SottoError::AudioCapture {
                message: "capture device already started".to_string(),
            });
        }

        let mut stream_rx = self.frames.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::clone(&self.state);
        self.state.store(STATE_RECORDING, Ordering::SeqCst);

        self.task = Some(tokio::spawn(async move {
            loop {
                match stream_rx.recv().await {
                    Ok(frame) => match state.load(Ordering::SeqCst) {
                        STATE_RECORDING => {
                            if tx.send(frame).is_err() {
                                break;
                            }
                        }
                        STATE_PAUSED => continue,
                        _ => break,
                    },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("capture device lagged, dropped {n} frames");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));

        Ok(rx)
    }

    fn pause(&mut self) {
        let _ = self.state.compare_exchange(
            STATE_RECORDING,
            STATE_PAUSED,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    fn resume(&mut self) {
        let _ = self.state.compare_exchange(
            STATE_PAUSED,
            STATE_RECORDING,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    fn stop(&mut self) {
        self.state.store(STATE_STOPPED, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn state(&self) -> DeviceState {
        decode_state(self.state.load(Ordering::SeqCst))
    }
}

impl Drop for StreamCaptureDevice {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Default factory producing [`StreamCaptureDevice`]s.
pub struct StreamDeviceFactory;

impl DeviceFactory for StreamDeviceFactory {
    fn open(&self, stream: &MicStream) -> Box<dyn CaptureDevice> {
        Box::new(StreamCaptureDevice::new(stream))
    }
}

/// Mock capture device for testing.
pub struct MockCaptureDevice {
    state: DeviceState,
    should_fail_start: bool,
    sender: mpsc::UnboundedSender<PcmFrame>,
    receiver: Option<mpsc::UnboundedReceiver<PcmFrame>>,
}

impl MockCaptureDevice {
    /// Create a new mock capture device.
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            state: DeviceState::Inactive,
            should_fail_start: false,
            sender,
            receiver: Some(receiver),
        }
    }

    /// Configure the mock to fail on start.
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    /// Returns a sender that injects frames into the device's feed.
    pub fn frame_sender(&self) -> mpsc::UnboundedSender<PcmFrame> {
        self.sender.clone()
    }
}

impl Default for MockCaptureDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureDevice for MockCaptureDevice {
    fn start(&mut self) -> Result<mpsc::UnboundedReceiver<PcmFrame>> {
        if self.should_fail_start {
            return Err(SottoError::AudioCapture {
                message: "mock device start failure".to_string(),
            });
        }
        let receiver = self.receiver.take().ok_or_else(|| SottoError::AudioCapture {
            message: "mock device already started".to_string(),
        })?;
        self.state = DeviceState::Recording;
        Ok(receiver)
    }

    fn pause(&mut self) {
        if self.state == DeviceState::Recording {
            self.state = DeviceState::Paused;
        }
    }

    fn resume(&mut self) {
        if self.state == DeviceState::Paused {
            self.state = DeviceState::Recording;
        }
    }

    fn stop(&mut self) {
        self.state = DeviceState::Stopped;
    }

    fn state(&self) -> DeviceState {
        self.state
    }
}
