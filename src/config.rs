//! Recorder configuration.
//!
//! [`RecorderConfig`] mirrors the knobs a caller tunes before building a
//! recorder: transcription backend, auto-stop behavior, streaming cadence,
//! and silence filtering. Validation happens once at build time; a recorder
//! never exists with an unusable configuration.

use crate::defaults;
use crate::error::{Result, SottoError};
use crate::transcribe::provider::{TranscriptionMode, TranscriptionProvider};
use std::fmt;
use std::sync::Arc;

/// Callback invoked with every encoded byte batch as it becomes available.
pub type DataCallback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Resolved transcription backend, exactly one of the two.
#[derive(Clone)]
pub enum TranscriptionBackend {
    /// Use the Whisper API with this key.
    ApiKey(String),
    /// Use a caller-supplied provider.
    External(Arc<dyn TranscriptionProvider>),
}

impl fmt::Debug for TranscriptionBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscriptionBackend::ApiKey(_) => f.write_str("TranscriptionBackend::ApiKey(..)"),
            TranscriptionBackend::External(_) => f.write_str("TranscriptionBackend::External(..)"),
        }
    }
}

/// Configuration for a recording controller.
#[derive(Clone)]
pub struct RecorderConfig {
    /// Whisper API key. Mutually exclusive with `provider`.
    pub api_key: Option<String>,
    /// Caller-supplied transcription provider. Mutually exclusive with
    /// `api_key`.
    pub provider: Option<Arc<dyn TranscriptionProvider>>,
    /// Begin recording as soon as the recorder is built.
    pub auto_start: bool,
    /// Transcribe automatically when recording stops.
    pub auto_transcribe: bool,
    /// Transcribe or translate.
    pub mode: TranscriptionMode,
    /// Stop automatically after sustained silence.
    pub non_stop: bool,
    /// Silence duration before auto-stop fires (ms).
    pub stop_timeout_ms: u64,
    /// Dispatch partial audio to the provider while recording.
    pub streaming: bool,
    /// Streaming dispatch interval (ms).
    pub time_slice_ms: u64,
    /// Drop encoded blobs the silence filter rejects.
    pub remove_silence: bool,
    /// Size threshold for the silence filter (bytes).
    pub silence_threshold_bytes: usize,
    /// RMS threshold separating speech from silence.
    pub vad_threshold: f32,
    /// Debounce for speaking/silence edges (ms).
    pub vad_debounce_ms: u64,
    /// ISO-639-1 language hint forwarded to the provider.
    pub language: Option<String>,
    /// Prompt forwarded to the provider.
    pub prompt: Option<String>,
    /// Response format forwarded to the provider.
    pub response_format: Option<String>,
    /// Sampling temperature forwarded to the provider.
    pub temperature: Option<f32>,
    /// Called with each encoded byte batch as it is produced.
    pub on_data_available: Option<DataCallback>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            provider: None,
            auto_start: false,
            auto_transcribe: false,
            mode: TranscriptionMode::Transcriptions,
            non_stop: false,
            stop_timeout_ms: defaults::STOP_TIMEOUT_MS,
            streaming: false,
            time_slice_ms: defaults::TIME_SLICE_MS,
            remove_silence: false,
            silence_threshold_bytes: defaults::SILENCE_THRESHOLD_BYTES,
            vad_threshold: defaults::VAD_THRESHOLD,
            vad_debounce_ms: defaults::VAD_DEBOUNCE_MS,
            language: None,
            prompt: None,
            response_format: None,
            temperature: None,
            on_data_available: None,
        }
    }
}

impl fmt::Debug for RecorderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecorderConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("provider", &self.provider.as_ref().map(|_| "<provider>"))
            .field("auto_start", &self.auto_start)
            .field("auto_transcribe", &self.auto_transcribe)
            .field("mode", &self.mode)
            .field("non_stop", &self.non_stop)
            .field("stop_timeout_ms", &self.stop_timeout_ms)
            .field("streaming", &self.streaming)
            .field("time_slice_ms", &self.time_slice_ms)
            .field("remove_silence", &self.remove_silence)
            .field("silence_threshold_bytes", &self.silence_threshold_bytes)
            .field("vad_threshold", &self.vad_threshold)
            .field("vad_debounce_ms", &self.vad_debounce_ms)
            .field("language", &self.language)
            .field("prompt", &self.prompt)
            .field("response_format", &self.response_format)
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}

impl RecorderConfig {
    /// Validates the configuration and resolves the transcription backend.
    pub fn validate(&self) -> Result<TranscriptionBackend> {
        let backend = match (&self.api_key, &self.provider) {
            (Some(_), Some(_)) => {
                return Err(SottoError::ConfigInvalidValue {
                    key: "provider".to_string(),
                    message: "api_key and provider are mutually exclusive".to_string(),
                });
            }
            (Some(key), None) => {
                if key.is_empty() {
                    return Err(SottoError::Config {
                        message: "api_key must not be empty".to_string(),
                    });
                }
                TranscriptionBackend::ApiKey(key.clone())
            }
            (None, Some(provider)) => TranscriptionBackend::External(Arc::clone(provider)),
            (None, None) => {
                return Err(SottoError::Config {
                    message: "either api_key or a transcription provider is required".to_string(),
                });
            }
        };

        if self.non_stop && self.stop_timeout_ms == 0 {
            return Err(SottoError::ConfigInvalidValue {
                key: "stop_timeout_ms".to_string(),
                message: "must be positive when non_stop is enabled".to_string(),
            });
        }
        if self.streaming && self.time_slice_ms == 0 {
            return Err(SottoError::ConfigInvalidValue {
                key: "time_slice_ms".to_string(),
                message: "must be positive when streaming is enabled".to_string(),
            });
        }

        Ok(backend)
    }
}
