//! Transcription pipeline.
//!
//! Providers turn audio into text, the dispatcher keeps streamed results in
//! order, and the assembler exposes the session transcript.

pub mod dispatch;
pub mod provider;
pub mod remote;
pub mod transcript;

pub use dispatch::TranscriptionDispatcher;
pub use provider::{
    CallbackProvider, MockProvider, TranscribeOptions, TranscriptionMode, TranscriptionProvider,
};
pub use remote::WhisperApiProvider;
pub use transcript::{Transcript, TranscriptAssembler};
