//! Microphone stream acquisition.
//!
//! A [`MicStream`] is the handle returned by a [`StreamSource`]. Both the
//! capture device and the voice-activity listener subscribe to the same
//! stream, mirroring how a single media stream feeds a recorder and a
//! speech detector.

use crate::error::{Result, SottoError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Capacity of the per-stream frame fan-out channel.
const FRAME_CHANNEL_CAPACITY: usize = 256;

/// A bounded segment of raw PCM audio delivered by a stream.
#[derive(Debug, Clone)]
pub struct PcmFrame {
    /// Sequence number for ordering frames.
    pub sequence: u64,
    /// Timestamp when the audio was captured.
    pub timestamp: Instant,
    /// Audio samples as 16-bit PCM.
    pub samples: Vec<i16>,
}

impl PcmFrame {
    /// Creates a new frame stamped with the current time.
    pub fn new(sequence: u64, samples: Vec<i16>) -> Self {
        Self {
            sequence,
            timestamp: Instant::now(),
            samples,
        }
    }

    /// Returns the duration of this frame in milliseconds.
    pub fn duration_ms(&self, sample_rate: u32) -> u32 {
        (self.samples.len() as u32 * 1000) / sample_rate
    }
}

/// Handle to an acquired microphone stream.
///
/// Frames published on the stream fan out to every subscriber.
pub struct MicStream {
    id: u64,
    frames: broadcast::Sender<PcmFrame>,
}

impl MicStream {
    /// Creates a standalone stream with its own frame channel.
    pub fn new(id: u64) -> Self {
        let (frames, _) = broadcast::channel(FRAME_CHANNEL_CAPACITY);
        Self { id, frames }
    }

    /// Creates a stream handle backed by an existing frame channel.
    pub fn with_sender(id: u64, frames: broadcast::Sender<PcmFrame>) -> Self {
        Self { id, frames }
    }

    /// Returns the stream identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Subscribes to the stream's frames.
    pub fn subscribe(&self) -> broadcast::Receiver<PcmFrame> {
        self.frames.subscribe()
    }

    /// Returns a sender that publishes frames onto this stream.
    pub fn sender(&self) -> broadcast::Sender<PcmFrame> {
        self.frames.clone()
    }
}

/// Trait for microphone stream acquisition.
///
/// This trait allows swapping implementations (real platform stream vs mock).
/// Acquisition failure maps to [`SottoError::PermissionDenied`] and is
/// retryable.
pub trait StreamSource: Send + Sync {
    /// Acquire a microphone stream.
    fn acquire(&self) -> Result<MicStream>;

    /// Release a previously acquired stream.
    fn release(&self, stream: MicStream);
}

/// Mock stream source for testing.
///
/// All streams it hands out share one frame channel, so tests can inject
/// frames with [`MockStreamSource::push_samples`] regardless of when the
/// stream was acquired.
pub struct MockStreamSource {
    should_deny: bool,
    deny_message: String,
    frames: broadcast::Sender<PcmFrame>,
    next_sequence: AtomicU64,
    next_id: AtomicU64,
    acquired: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl MockStreamSource {
    /// Create a new mock stream source that grants every acquisition.
    pub fn new() -> Self {
        let (frames, _) = broadcast::channel(FRAME_CHANNEL_CAPACITY);
        Self {
            should_deny: false,
            deny_message: "mock permission denied".to_string(),
            frames,
            next_sequence: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
            acquired: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Configure the mock to deny acquisition.
    pub fn with_denial(mut self) -> Self {
        self.should_deny = true;
        self
    }

    /// Configure the denial message.
    pub fn with_deny_message(mut self, message: &str) -> Self {
        self.deny_message = message.to_string();
        self
    }

    /// Publish a frame of samples onto the shared stream.
    pub fn push_samples(&self, samples: Vec<i16>) {
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        // Send errors just mean no subscriber is listening yet.
        let _ = self.frames.send(PcmFrame::new(sequence, samples));
    }

    /// Number of streams handed out.
    pub fn acquired_count(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    /// Number of streams released back.
    pub fn released_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Number of streams currently held by callers.
    pub fn active_count(&self) -> usize {
        self.acquired_count() - self.released_count()
    }
}

impl Default for MockStreamSource {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamSource for MockStreamSource {
    fn acquire(&self) -> Result<MicStream> {
        if self.should_deny {
            return Err(SottoError::PermissionDenied {
                message: self.deny_message.clone(),
            });
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(MicStream::with_sender(id, self.frames.clone()))
    }

    fn release(&self, stream: MicStream) {
        self.released.fetch_add(1, Ordering::SeqCst);
        drop(stream);
    }
}
