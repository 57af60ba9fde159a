//! Error types for sotto.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SottoError {
    // Configuration errors (fatal at construction)
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    // Stream acquisition errors (non-fatal, retryable)
    #[error("Microphone access denied: {message}")]
    PermissionDenied { message: String },

    // Audio capture errors
    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    // Encoder errors
    #[error("Encoder is closed: encode called after flush")]
    EncoderClosed,

    #[error("Encoding failed: {message}")]
    Encode { message: String },

    // Transcription errors
    #[error("Transcription provider error: {message}")]
    Provider { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, SottoError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_config_display() {
        let error = SottoError::Config {
            message: "api key or provider required".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Configuration error: api key or provider required"
        );
    }

    #[test]
    fn test_config_invalid_value_display() {
        let error = SottoError::ConfigInvalidValue {
            key: "stop_timeout_ms".to_string(),
            message: "must be positive".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for stop_timeout_ms: must be positive"
        );
    }

    #[test]
    fn test_permission_denied_display() {
        let error = SottoError::PermissionDenied {
            message: "user dismissed the prompt".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Microphone access denied: user dismissed the prompt"
        );
    }

    #[test]
    fn test_audio_capture_display() {
        let error = SottoError::AudioCapture {
            message: "buffer overflow".to_string(),
        };
        assert_eq!(error.to_string(), "Audio capture failed: buffer overflow");
    }

    #[test]
    fn test_encoder_closed_display() {
        let error = SottoError::EncoderClosed;
        assert_eq!(
            error.to_string(),
            "Encoder is closed: encode called after flush"
        );
    }

    #[test]
    fn test_encode_display() {
        let error = SottoError::Encode {
            message: "sample out of range".to_string(),
        };
        assert_eq!(error.to_string(), "Encoding failed: sample out of range");
    }

    #[test]
    fn test_provider_display() {
        let error = SottoError::Provider {
            message: "429 too many requests".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Transcription provider error: 429 too many requests"
        );
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: SottoError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_source_chain_io() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let error: SottoError = io_error.into();

        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<SottoError>();
        assert_sync::<SottoError>();
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(returns_result().unwrap(), 42);
    }
}
