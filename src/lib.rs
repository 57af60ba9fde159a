//! sotto - Microphone recording lifecycle with transcription
//!
//! Capture, voice-activity detection, silence-triggered auto-stop, chunked
//! encoding, and Whisper transcription behind one controller.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod config;
pub mod controller;
pub mod defaults;
pub mod encode;
pub mod error;
pub mod silence;
pub mod timer;
pub mod transcribe;

// Core seams (stream → capture → encode → transcribe)
pub use audio::stream::StreamSource;
pub use audio::vad::{VadConfig, VadEdge, VadProvider};
pub use encode::{Codec, CodecFactory};
pub use silence::SilenceFilter;
pub use transcribe::provider::TranscriptionProvider;

// Controller
pub use controller::{RecorderBuilder, RecordingController, SessionSnapshot, SessionState};

// Error handling
pub use error::{Result, SottoError};

// Config
pub use config::{RecorderConfig, TranscriptionBackend};

// Transcript
pub use transcribe::provider::{TranscribeOptions, TranscriptionMode};
pub use transcribe::transcript::{Transcript, TranscriptAssembler};
