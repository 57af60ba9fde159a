//! Recording lifecycle controller.
//!
//! [`RecordingController`] owns one microphone session at a time: it
//! acquires the stream, runs capture and voice-activity detection off the
//! same feed, encodes frames as they arrive, and hands encoded audio to the
//! transcription dispatcher. All transitions serialize on one internal lock,
//! so a stop racing an auto-stop timer resolves to a single teardown.

use crate::audio::device::{CaptureDevice, DeviceFactory, StreamDeviceFactory};
use crate::audio::stream::{MicStream, PcmFrame, StreamSource};
use crate::audio::vad::{RmsVadProvider, VadConfig, VadEdge, VadListener, VadProvider};
use crate::config::{RecorderConfig, TranscriptionBackend};
use crate::encode::{ChunkEncoder, CodecFactory, WavCodecFactory};
use crate::error::{Result, SottoError};
use crate::silence::{SilenceFilter, SizeThresholdFilter};
use crate::timer::AutoStopTimer;
use crate::transcribe::dispatch::TranscriptionDispatcher;
use crate::transcribe::provider::{TranscribeOptions, TranscriptionProvider};
use crate::transcribe::remote::WhisperApiProvider;
use crate::transcribe::transcript::{Transcript, TranscriptAssembler};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Lifecycle state of a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session active; all resources released.
    Idle,
    /// Capturing and encoding frames.
    Recording,
    /// Session held open but frame delivery suspended.
    Paused,
}

/// Why a session is being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    /// Caller asked for the stop.
    Requested,
    /// The silence timer fired.
    Timeout,
}

/// Point-in-time view of the controller for diagnostics and tests.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Current lifecycle state.
    pub state: SessionState,
    /// Whether a microphone stream is currently held.
    pub stream_held: bool,
    /// Whether the session encoder is open.
    pub encoder_open: bool,
    /// Encoded byte batches produced this session.
    pub chunks_encoded: u64,
    /// When the session started, if one is active.
    pub started_at: Option<Instant>,
}

struct Deps {
    stream_source: Arc<dyn StreamSource>,
    vad: Arc<dyn VadProvider>,
    device_factory: Arc<dyn DeviceFactory>,
    codec_factory: Arc<dyn CodecFactory>,
    silence_filter: Arc<dyn SilenceFilter>,
    provider: Arc<dyn TranscriptionProvider>,
}

struct Inner {
    state: SessionState,
    stream: Option<MicStream>,
    device: Option<Box<dyn CaptureDevice>>,
    encoder: Option<ChunkEncoder>,
    vad_listener: Option<VadListener>,
    stop_timer: AutoStopTimer,
    dispatcher: Option<TranscriptionDispatcher>,
    session_bytes: Vec<u8>,
    slice_bytes: Vec<u8>,
    chunks_encoded: u64,
    started_at: Option<Instant>,
    frame_pump: Option<JoinHandle<()>>,
    vad_pump: Option<JoinHandle<()>>,
    slice_ticker: Option<JoinHandle<()>>,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: SessionState::Idle,
            stream: None,
            device: None,
            encoder: None,
            vad_listener: None,
            stop_timer: AutoStopTimer::new(),
            dispatcher: None,
            session_bytes: Vec::new(),
            slice_bytes: Vec::new(),
            chunks_encoded: 0,
            started_at: None,
            frame_pump: None,
            vad_pump: None,
            slice_ticker: None,
        }
    }
}

/// What teardown hands back for processing outside the lock.
struct TeardownOutcome {
    session_audio: Vec<u8>,
    final_slice: Vec<u8>,
    dispatcher: Option<TranscriptionDispatcher>,
    assembler: TranscriptAssembler,
}

/// Per-session handles the controller reads without the lifecycle lock.
///
/// Replaced wholesale on every session start, so a late completion from a
/// previous session lands in that session's detached assembler and can never
/// write into the current transcript.
struct SessionHandles {
    assembler: TranscriptAssembler,
    transcribing: Option<watch::Receiver<bool>>,
}

/// Builder for [`RecordingController`].
pub struct RecorderBuilder {
    config: RecorderConfig,
    stream_source: Option<Arc<dyn StreamSource>>,
    vad: Arc<dyn VadProvider>,
    device_factory: Arc<dyn DeviceFactory>,
    codec_factory: Arc<dyn CodecFactory>,
    silence_filter: Arc<dyn SilenceFilter>,
}

impl RecorderBuilder {
    /// Starts a builder from the given configuration.
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            stream_source: None,
            vad: Arc::new(RmsVadProvider),
            device_factory: Arc::new(StreamDeviceFactory),
            codec_factory: Arc::new(WavCodecFactory::default()),
            silence_filter: Arc::new(SizeThresholdFilter),
        }
    }

    /// Sets the microphone stream source (required).
    pub fn stream_source(mut self, source: Arc<dyn StreamSource>) -> Self {
        self.stream_source = Some(source);
        self
    }

    /// Overrides the voice-activity provider.
    pub fn vad_provider(mut self, vad: Arc<dyn VadProvider>) -> Self {
        self.vad = vad;
        self
    }

    /// Overrides the capture device factory.
    pub fn device_factory(mut self, factory: Arc<dyn DeviceFactory>) -> Self {
        self.device_factory = factory;
        self
    }

    /// Overrides the codec factory.
    pub fn codec_factory(mut self, factory: Arc<dyn CodecFactory>) -> Self {
        self.codec_factory = factory;
        self
    }

    /// Overrides the silence filter.
    pub fn silence_filter(mut self, filter: Arc<dyn SilenceFilter>) -> Self {
        self.silence_filter = filter;
        self
    }

    /// Validates the configuration and builds the controller.
    pub fn build(self) -> Result<RecordingController> {
        let backend = self.config.validate()?;
        let stream_source = self.stream_source.ok_or_else(|| SottoError::Config {
            message: "a stream source is required".to_string(),
        })?;
        let provider: Arc<dyn TranscriptionProvider> = match backend {
            TranscriptionBackend::ApiKey(key) => Arc::new(WhisperApiProvider::new(&key)),
            TranscriptionBackend::External(provider) => provider,
        };

        Ok(RecordingController {
            inner: Arc::new(Mutex::new(Inner::new())),
            deps: Arc::new(Deps {
                stream_source,
                vad: self.vad,
                device_factory: self.device_factory,
                codec_factory: self.codec_factory,
                silence_filter: self.silence_filter,
                provider,
            }),
            config: Arc::new(self.config),
            handles: Arc::new(StdMutex::new(SessionHandles {
                assembler: TranscriptAssembler::new(),
                transcribing: None,
            })),
            recording: Arc::new(AtomicBool::new(false)),
            speaking: Arc::new(AtomicBool::new(false)),
        })
    }
}

/// Controller for the microphone recording lifecycle.
#[derive(Clone)]
pub struct RecordingController {
    inner: Arc<Mutex<Inner>>,
    deps: Arc<Deps>,
    config: Arc<RecorderConfig>,
    handles: Arc<StdMutex<SessionHandles>>,
    recording: Arc<AtomicBool>,
    speaking: Arc<AtomicBool>,
}

impl RecordingController {
    /// Starts a session, or resumes a paused one.
    ///
    /// Calling start while already recording is a no-op. Stream acquisition
    /// failure leaves the controller idle and is retryable.
    pub async fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            SessionState::Recording => return Ok(()),
            SessionState::Paused => {
                if let Some(device) = inner.device.as_mut() {
                    device.resume();
                }
                inner.state = SessionState::Recording;
                self.recording.store(true, Ordering::SeqCst);
                if self.config.non_stop {
                    self.arm_stop_timer(&mut inner);
                }
                debug!("session resumed");
                return Ok(());
            }
            SessionState::Idle => {}
        }

        let stream = self.deps.stream_source.acquire()?;

        let (vad_tx, vad_rx) = mpsc::unbounded_channel();
        let vad_config = VadConfig {
            speech_threshold: self.config.vad_threshold,
            debounce_ms: self.config.vad_debounce_ms,
        };
        let listener = self.deps.vad.attach(&stream, vad_config, vad_tx);

        let mut device = self.deps.device_factory.open(&stream);
        let frames = match device.start() {
            Ok(frames) => frames,
            Err(e) => {
                let mut listener = listener;
                listener.detach();
                self.deps.stream_source.release(stream);
                return Err(e);
            }
        };

        // Fresh transcript and busy signal per session; the previous
        // dispatcher keeps writing only into its own detached assembler.
        let assembler = TranscriptAssembler::new();
        let dispatcher = TranscriptionDispatcher::new(
            Arc::clone(&self.deps.provider),
            self.transcribe_options(),
            assembler.clone(),
        );
        {
            let mut handles = self.handles();
            handles.assembler = assembler;
            handles.transcribing = Some(dispatcher.signal());
        }

        inner.stream = Some(stream);
        inner.device = Some(device);
        inner.encoder = Some(ChunkEncoder::new(self.deps.codec_factory.open()));
        inner.vad_listener = Some(listener);
        inner.dispatcher = Some(dispatcher);
        inner.session_bytes.clear();
        inner.slice_bytes.clear();
        inner.chunks_encoded = 0;
        inner.started_at = Some(Instant::now());
        inner.state = SessionState::Recording;
        self.recording.store(true, Ordering::SeqCst);
        self.speaking.store(false, Ordering::SeqCst);

        inner.frame_pump = Some(self.spawn_frame_pump(frames));
        inner.vad_pump = Some(self.spawn_vad_pump(vad_rx));
        if self.config.streaming && self.config.auto_transcribe {
            inner.slice_ticker = Some(self.spawn_slice_ticker());
        }
        if self.config.non_stop {
            self.arm_stop_timer(&mut inner);
        }

        info!("recording started");
        Ok(())
    }

    /// Starts only if `auto_start` is configured.
    pub async fn start_if_configured(&self) -> Result<()> {
        if self.config.auto_start {
            self.start().await
        } else {
            Ok(())
        }
    }

    /// Suspends frame delivery without ending the session.
    ///
    /// Pausing disarms the silence timer; a paused session never auto-stops.
    pub async fn pause(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state != SessionState::Recording {
            return;
        }
        if let Some(device) = inner.device.as_mut() {
            device.pause();
        }
        inner.stop_timer.disarm();
        inner.state = SessionState::Paused;
        self.recording.store(false, Ordering::SeqCst);
        debug!("session paused");
    }

    /// Stops the session and finalizes the transcript.
    ///
    /// Stopping an idle controller is a no-op. When `auto_transcribe` is
    /// off the session audio is stored on the transcript untranscribed.
    pub async fn stop(&self) -> Transcript {
        match self.stop_with_reason(StopReason::Requested).await {
            // Snapshot the stopped session's own transcript, even if a new
            // session has started in the meantime.
            Some(assembler) => assembler.snapshot(),
            None => self.transcript(),
        }
    }

    async fn auto_stop(&self) {
        self.stop_with_reason(StopReason::Timeout).await;
    }

    async fn stop_with_reason(&self, reason: StopReason) -> Option<TranscriptAssembler> {
        let outcome = {
            let mut inner = self.inner.lock().await;
            match inner.state {
                SessionState::Idle => return None,
                // A stale timeout must not tear down a paused session.
                SessionState::Paused if reason == StopReason::Timeout => return None,
                _ => {}
            }
            self.teardown(&mut inner)
        };

        if reason == StopReason::Timeout {
            info!("recording auto-stopped after silence timeout");
        } else {
            info!("recording stopped");
        }
        let assembler = outcome.assembler.clone();
        self.finalize(outcome).await;
        Some(assembler)
    }

    /// Releases session resources in a fixed order, under the lock.
    fn teardown(&self, inner: &mut Inner) -> TeardownOutcome {
        inner.stop_timer.disarm();
        if let Some(mut listener) = inner.vad_listener.take() {
            listener.detach();
        }
        if let Some(mut device) = inner.device.take() {
            device.stop();
        }
        if let Some(stream) = inner.stream.take() {
            self.deps.stream_source.release(stream);
        }
        for task in [
            inner.frame_pump.take(),
            inner.vad_pump.take(),
            inner.slice_ticker.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }

        let mut session_audio = std::mem::take(&mut inner.session_bytes);
        let mut final_slice = std::mem::take(&mut inner.slice_bytes);
        if let Some(mut encoder) = inner.encoder.take() {
            match encoder.flush() {
                Ok(tail) if !tail.is_empty() => {
                    if let Some(callback) = &self.config.on_data_available {
                        callback(&tail);
                    }
                    session_audio.extend_from_slice(&tail);
                    final_slice.extend_from_slice(&tail);
                }
                Ok(_) => {}
                Err(e) => warn!("encoder flush failed: {e}"),
            }
        }

        inner.state = SessionState::Idle;
        inner.started_at = None;
        self.recording.store(false, Ordering::SeqCst);
        self.speaking.store(false, Ordering::SeqCst);

        TeardownOutcome {
            session_audio,
            final_slice,
            dispatcher: inner.dispatcher.take(),
            assembler: self.handles().assembler.clone(),
        }
    }

    /// Routes the session audio after teardown, outside the lock.
    ///
    /// Writes only through the stopped session's assembler from the
    /// teardown outcome, never through the current handles.
    async fn finalize(&self, outcome: TeardownOutcome) {
        let TeardownOutcome {
            session_audio,
            final_slice,
            dispatcher,
            assembler,
        } = outcome;

        if !self.config.auto_transcribe {
            assembler.set_blob(session_audio);
            return;
        }

        let Some(mut dispatcher) = dispatcher else {
            assembler.set_blob(session_audio);
            return;
        };

        if self.config.streaming {
            if !final_slice.is_empty() {
                if let Some(blob) = self.apply_silence_filter(final_slice) {
                    dispatcher.dispatch_chunk(blob);
                }
            }
            assembler.set_blob(session_audio);
            // Dropping the dispatcher leaves its writer task running until
            // every in-flight chunk has landed in this session's assembler.
            drop(dispatcher);
        } else {
            match self.apply_silence_filter(session_audio.clone()) {
                Some(blob) => dispatcher.dispatch_batch(blob).await,
                None => {
                    debug!("session audio under silence threshold, skipping transcription");
                    assembler.replace(Some(session_audio), None);
                }
            }
        }
    }

    fn apply_silence_filter(&self, blob: Vec<u8>) -> Option<Vec<u8>> {
        if self.config.remove_silence {
            self.deps
                .silence_filter
                .filter(&blob, self.config.silence_threshold_bytes)
        } else {
            Some(blob)
        }
    }

    fn transcribe_options(&self) -> TranscribeOptions {
        TranscribeOptions {
            mode: self.config.mode,
            language: self.config.language.clone(),
            prompt: self.config.prompt.clone(),
            response_format: self.config.response_format.clone(),
            temperature: self.config.temperature,
        }
    }

    fn arm_stop_timer(&self, inner: &mut Inner) {
        let controller = self.clone();
        let timeout = Duration::from_millis(self.config.stop_timeout_ms);
        inner.stop_timer.arm(timeout, move || async move {
            controller.auto_stop().await;
        });
    }

    fn spawn_frame_pump(&self, mut frames: mpsc::UnboundedReceiver<PcmFrame>) -> JoinHandle<()> {
        let controller = self.clone();
        tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                controller.on_frame(frame).await;
            }
        })
    }

    fn spawn_vad_pump(&self, mut edges: mpsc::UnboundedReceiver<VadEdge>) -> JoinHandle<()> {
        let controller = self.clone();
        tokio::spawn(async move {
            while let Some(edge) = edges.recv().await {
                controller.on_vad_edge(edge).await;
            }
        })
    }

    fn spawn_slice_ticker(&self) -> JoinHandle<()> {
        let controller = self.clone();
        let interval = Duration::from_millis(self.config.time_slice_ms);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                controller.flush_slice().await;
            }
        })
    }

    async fn on_frame(&self, frame: PcmFrame) {
        let mut inner = self.inner.lock().await;
        if inner.state != SessionState::Recording {
            return;
        }
        let result = match inner.encoder.as_mut() {
            Some(encoder) => encoder.encode(frame.sequence, &frame.samples),
            None => return,
        };
        match result {
            Ok(bytes) if !bytes.is_empty() => {
                if let Some(callback) = &self.config.on_data_available {
                    callback(&bytes);
                }
                inner.session_bytes.extend_from_slice(&bytes);
                inner.slice_bytes.extend_from_slice(&bytes);
                inner.chunks_encoded += 1;
            }
            Ok(_) => {}
            Err(e) => warn!("frame {} dropped: {e}", frame.sequence),
        }
    }

    /// Dispatches bytes accumulated since the previous slice.
    async fn flush_slice(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state != SessionState::Recording || inner.slice_bytes.is_empty() {
            return;
        }
        let blob = std::mem::take(&mut inner.slice_bytes);
        if let Some(blob) = self.apply_silence_filter(blob) {
            if let Some(dispatcher) = inner.dispatcher.as_mut() {
                dispatcher.dispatch_chunk(blob);
            }
        }
    }

    async fn on_vad_edge(&self, edge: VadEdge) {
        let mut inner = self.inner.lock().await;
        match edge {
            VadEdge::SpeakingStarted => {
                self.speaking.store(true, Ordering::SeqCst);
                inner.stop_timer.disarm();
            }
            VadEdge::SpeakingStopped => {
                self.speaking.store(false, Ordering::SeqCst);
                if self.config.non_stop && inner.state == SessionState::Recording {
                    self.arm_stop_timer(&mut inner);
                }
            }
        }
    }

    fn handles(&self) -> MutexGuard<'_, SessionHandles> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current transcript contents.
    pub fn transcript(&self) -> Transcript {
        self.handles().assembler.snapshot()
    }

    /// True while a session is actively recording.
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// True while the voice-activity detector reports speech.
    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    /// True while any transcription dispatch of the current session is
    /// unresolved.
    pub fn is_transcribing(&self) -> bool {
        self.handles()
            .transcribing
            .as_ref()
            .is_some_and(|signal| *signal.borrow())
    }

    /// Waits until every dispatched transcription of the current session
    /// has landed.
    pub async fn wait_for_transcription(&self) {
        let signal = self.handles().transcribing.clone();
        if let Some(mut signal) = signal {
            // A closed signal means the writer exited with nothing pending.
            let _ = signal.wait_for(|busy| !*busy).await;
        }
    }

    /// Point-in-time view of the session for diagnostics and tests.
    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.lock().await;
        SessionSnapshot {
            state: inner.state,
            stream_held: inner.stream.is_some(),
            encoder_open: inner.encoder.as_ref().is_some_and(|e| !e.is_closed()),
            chunks_encoded: inner.chunks_encoded,
            started_at: inner.started_at,
        }
    }
}
