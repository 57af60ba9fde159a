//! Default configuration constants for sotto.
//!
//! Shared across configuration types to keep the recorder, timer, and
//! dispatcher in agreement about timing and thresholds.

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard for speech recognition and keeps frame math cheap.
pub const SAMPLE_RATE: u32 = 16000;

/// Default silence timeout in milliseconds before auto-stop fires.
///
/// With `non_stop` enabled, the recorder stops itself after this much
/// sustained silence.
pub const STOP_TIMEOUT_MS: u64 = 5000;

/// Default streaming dispatch interval in milliseconds.
///
/// In streaming mode, bytes accumulated since the previous dispatch are sent
/// to the provider once per interval.
pub const TIME_SLICE_MS: u64 = 1000;

/// Default voice-activity debounce in milliseconds.
///
/// A speaking/silence edge is only reported after the condition has held for
/// this long, suppressing flicker on plosives and short gaps.
pub const VAD_DEBOUNCE_MS: u64 = 100;

/// Default RMS threshold separating speech from silence.
///
/// Normalized 0.0..1.0; 0.02 is tuned for typical microphone input levels.
pub const VAD_THRESHOLD: f32 = 0.02;

/// Default silence threshold in bytes for the size-based silence filter.
///
/// An encoded blob at or below this size carries no usable speech. 225 bytes
/// is the size of an empty MP3 produced by a silence-removal pass.
pub const SILENCE_THRESHOLD_BYTES: usize = 225;

/// Base URL for the Whisper speech-to-text API.
pub const WHISPER_API_BASE: &str = "https://api.openai.com/v1/audio";

/// Model name sent to the Whisper API.
pub const WHISPER_MODEL: &str = "whisper-1";
