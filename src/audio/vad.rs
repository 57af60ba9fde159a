//! Voice activity detection adapter.
//!
//! Turns a raw microphone stream into two debounced, edge-triggered events:
//! speaking started and speaking stopped. The recorder reacts to the edges
//! only; per-frame classification never leaves this module.

use crate::audio::stream::MicStream;
use crate::defaults;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Trait for time operations, allowing mock time in tests.
///
/// Uses the tokio clock so paused-time tests control debounce timing.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// Real clock backed by `tokio::time::Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Configuration for voice activity detection.
#[derive(Debug, Clone, Copy)]
pub struct VadConfig {
    /// RMS threshold for detecting speech (0.0 to 1.0).
    pub speech_threshold: f32,
    /// Duration a condition must hold before an edge is reported (ms).
    pub debounce_ms: u64,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            speech_threshold: defaults::VAD_THRESHOLD,
            debounce_ms: defaults::VAD_DEBOUNCE_MS,
        }
    }
}

/// Edge-triggered voice activity events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEdge {
    /// The stream transitioned from silence to speech.
    SpeakingStarted,
    /// The stream transitioned from speech to silence.
    SpeakingStopped,
}

/// Debounced speech/silence edge detector.
///
/// An edge is only emitted once the opposite condition has held for the
/// configured debounce window, so brief gaps and plosives don't flicker.
pub struct SpeechGate<C: Clock = SystemClock> {
    config: VadConfig,
    clock: C,
    speaking: bool,
    pending_since: Option<Instant>,
}

impl<C: Clock> SpeechGate<C> {
    /// Creates a gate with the given configuration and clock.
    pub fn with_clock(config: VadConfig, clock: C) -> Self {
        Self {
            config,
            clock,
            speaking: false,
            pending_since: None,
        }
    }

    /// Processes one frame of samples and returns an edge if one fired.
    pub fn process(&mut self, samples: &[i16]) -> Option<VadEdge> {
        let rms = calculate_rms(samples);
        let is_speech = rms > self.config.speech_threshold;

        if is_speech == self.speaking {
            self.pending_since = None;
            return None;
        }

        let now = self.clock.now();
        let since = *self.pending_since.get_or_insert(now);
        if now.duration_since(since).as_millis() as u64 >= self.config.debounce_ms {
            self.speaking = is_speech;
            self.pending_since = None;
            Some(if is_speech {
                VadEdge::SpeakingStarted
            } else {
                VadEdge::SpeakingStopped
            })
        } else {
            None
        }
    }

    /// Returns true while the gate considers the stream to be speech.
    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    /// Resets the gate to silent.
    pub fn reset(&mut self) {
        self.speaking = false;
        self.pending_since = None;
    }
}

impl SpeechGate<SystemClock> {
    /// Creates a gate using the system clock.
    pub fn new(config: VadConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

/// Calculates the Root Mean Square (RMS) of audio samples.
///
/// Returns a normalized value (0.0 to 1.0) where 0.0 is silence.
pub fn calculate_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&sample| {
            let normalized = sample as f64 / i16::MAX as f64;
            normalized * normalized
        })
        .sum();

    let mean_square = sum_squares / samples.len() as f64;
    mean_square.sqrt() as f32
}

/// Trait for attaching a voice-activity listener to a stream.
pub trait VadProvider: Send + Sync {
    /// Attach a listener to the stream, emitting edges on `events`.
    ///
    /// Listener lifetime is tied to the returned [`VadListener`]; detaching
    /// it stops edge delivery.
    fn attach(
        &self,
        stream: &MicStream,
        config: VadConfig,
        events: mpsc::UnboundedSender<VadEdge>,
    ) -> VadListener;
}

/// RMS-based VAD provider running a [`SpeechGate`] over the stream frames.
pub struct RmsVadProvider;

impl VadProvider for RmsVadProvider {
    fn attach(
        &self,
        stream: &MicStream,
        config: VadConfig,
        events: mpsc::UnboundedSender<VadEdge>,
    ) -> VadListener {
        let mut frames = stream.subscribe();
        let task = tokio::spawn(async move {
            let mut gate = SpeechGate::new(config);
            loop {
                match frames.recv().await {
                    Ok(frame) => {
                        if let Some(edge) = gate.process(&frame.samples) {
                            if events.send(edge).is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!("vad listener lagged, skipped {n} frames");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        VadListener {
            task: Some(task),
            detached: false,
        }
    }
}

/// Handle to an attached voice-activity listener.
///
/// Detachment is idempotent: detaching an already-detached listener is a
/// no-op, never an error.
pub struct VadListener {
    task: Option<JoinHandle<()>>,
    detached: bool,
}

impl VadListener {
    /// Creates a listener over an already-spawned task (for custom providers).
    pub fn from_task(task: JoinHandle<()>) -> Self {
        Self {
            task: Some(task),
            detached: false,
        }
    }

    /// Stops edge delivery. Safe to call more than once.
    pub fn detach(&mut self) {
        if self.detached {
            return;
        }
        self.detached = true;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Returns true once the listener has been detached.
    pub fn is_detached(&self) -> bool {
        self.detached
    }
}

impl Drop for VadListener {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::stream::{MockStreamSource, StreamSource};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Mock clock for testing that allows manual time advancement.
    #[derive(Debug, Clone)]
    struct MockClock {
        current: Arc<Mutex<Instant>>,
    }

    impl MockClock {
        fn new() -> Self {
            Self {
                current: Arc::new(Mutex::new(Instant::now())),
            }
        }

        fn advance(&self, duration: Duration) {
            let mut current = self.current.lock().unwrap();
            *current += duration;
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> Instant {
            *self.current.lock().unwrap()
        }
    }

    fn make_silence(count: usize) -> Vec<i16> {
        vec![0i16; count]
    }

    fn make_speech(count: usize, amplitude: i16) -> Vec<i16> {
        vec![amplitude; count]
    }

    #[test]
    fn test_rms_silence_is_zero() {
        assert_eq!(calculate_rms(&make_silence(1000)), 0.0);
    }

    #[test]
    fn test_rms_max_amplitude() {
        let rms = calculate_rms(&make_speech(1000, i16::MAX));
        assert!((rms - 1.0).abs() < 0.001, "RMS should be ~1.0, got {}", rms);
    }

    #[test]
    fn test_rms_empty_samples() {
        assert_eq!(calculate_rms(&[]), 0.0);
    }

    #[test]
    fn test_gate_starts_silent() {
        let gate = SpeechGate::new(VadConfig::default());
        assert!(!gate.is_speaking());
    }

    #[test]
    fn test_gate_debounces_speech_start() {
        let clock = MockClock::new();
        let config = VadConfig {
            speech_threshold: 0.02,
            debounce_ms: 100,
        };
        let mut gate = SpeechGate::with_clock(config, clock.clone());

        let speech = make_speech(160, 3000);

        // First speech frame starts the debounce window but fires nothing.
        assert_eq!(gate.process(&speech), None);
        assert!(!gate.is_speaking());

        clock.advance(Duration::from_millis(150));
        assert_eq!(gate.process(&speech), Some(VadEdge::SpeakingStarted));
        assert!(gate.is_speaking());
    }

    #[test]
    fn test_gate_brief_blip_does_not_fire() {
        let clock = MockClock::new();
        let config = VadConfig {
            speech_threshold: 0.02,
            debounce_ms: 100,
        };
        let mut gate = SpeechGate::with_clock(config, clock.clone());

        let speech = make_speech(160, 3000);
        let silence = make_silence(160);

        assert_eq!(gate.process(&speech), None);
        clock.advance(Duration::from_millis(50));
        // Back to silence before the debounce elapsed; window resets.
        assert_eq!(gate.process(&silence), None);
        clock.advance(Duration::from_millis(200));
        assert_eq!(gate.process(&silence), None);
        assert!(!gate.is_speaking());
    }

    #[test]
    fn test_gate_debounces_speech_end() {
        let clock = MockClock::new();
        let config = VadConfig {
            speech_threshold: 0.02,
            debounce_ms: 100,
        };
        let mut gate = SpeechGate::with_clock(config, clock.clone());

        let speech = make_speech(160, 3000);
        let silence = make_silence(160);

        gate.process(&speech);
        clock.advance(Duration::from_millis(150));
        assert_eq!(gate.process(&speech), Some(VadEdge::SpeakingStarted));

        assert_eq!(gate.process(&silence), None);
        clock.advance(Duration::from_millis(150));
        assert_eq!(gate.process(&silence), Some(VadEdge::SpeakingStopped));
        assert!(!gate.is_speaking());
    }

    #[test]
    fn test_gate_reset() {
        let clock = MockClock::new();
        let config = VadConfig {
            speech_threshold: 0.02,
            debounce_ms: 0,
        };
        let mut gate = SpeechGate::with_clock(config, clock);

        let speech = make_speech(160, 3000);
        assert_eq!(gate.process(&speech), Some(VadEdge::SpeakingStarted));

        gate.reset();
        assert!(!gate.is_speaking());
        assert_eq!(gate.process(&speech), Some(VadEdge::SpeakingStarted));
    }

    #[tokio::test]
    async fn test_provider_emits_edges() {
        let source = MockStreamSource::new();
        let stream = source.acquire().unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = VadConfig {
            speech_threshold: 0.02,
            debounce_ms: 0,
        };
        let _listener = RmsVadProvider.attach(&stream, config, tx);

        source.push_samples(make_speech(160, 5000));

        let edge = rx.recv().await.unwrap();
        assert_eq!(edge, VadEdge::SpeakingStarted);
    }

    #[tokio::test]
    async fn test_listener_detach_is_idempotent() {
        let source = MockStreamSource::new();
        let stream = source.acquire().unwrap();

        let (tx, _rx) = mpsc::unbounded_channel();
        let mut listener = RmsVadProvider.attach(&stream, VadConfig::default(), tx);

        assert!(!listener.is_detached());
        listener.detach();
        assert!(listener.is_detached());

        // Second detach is a no-op, never an error.
        listener.detach();
        assert!(listener.is_detached());
    }
}
