//! Transcript assembly.
//!
//! The assembler is the single writer for the session transcript. Streaming
//! completions append text in dispatch order; a batch result replaces the
//! whole transcript at once.

use std::sync::{Arc, Mutex, PoisonError};

/// The observable result of a recording session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    /// Accumulated transcription text, if any transcription ran.
    pub text: Option<String>,
    /// The encoded session audio, once the session has stopped.
    pub blob: Option<Vec<u8>>,
}

/// Shared, clonable handle to the session transcript.
#[derive(Clone, Default)]
pub struct TranscriptAssembler {
    inner: Arc<Mutex<Transcript>>,
}

impl TranscriptAssembler {
    /// Creates an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Transcript> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clears text and blob.
    pub fn reset(&self) {
        let mut transcript = self.lock();
        transcript.text = None;
        transcript.blob = None;
    }

    /// Appends streamed text to the transcript.
    pub fn append(&self, text: &str) {
        let mut transcript = self.lock();
        match &mut transcript.text {
            Some(existing) => existing.push_str(text),
            None => transcript.text = Some(text.to_string()),
        }
    }

    /// Replaces the whole transcript with a batch result.
    pub fn replace(&self, blob: Option<Vec<u8>>, text: Option<String>) {
        let mut transcript = self.lock();
        transcript.blob = blob;
        transcript.text = text;
    }

    /// Sets the session audio without touching accumulated text.
    pub fn set_blob(&self, blob: Vec<u8>) {
        self.lock().blob = Some(blob);
    }

    /// Returns a copy of the current transcript.
    pub fn snapshot(&self) -> Transcript {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_empty() {
        let assembler = TranscriptAssembler::new();
        assert_eq!(assembler.snapshot(), Transcript::default());
    }

    #[test]
    fn test_append_accumulates_in_order() {
        let assembler = TranscriptAssembler::new();
        assembler.append("hello ");
        assembler.append("world");
        assert_eq!(assembler.snapshot().text.as_deref(), Some("hello world"));
    }

    #[test]
    fn test_replace_overwrites_streamed_text() {
        let assembler = TranscriptAssembler::new();
        assembler.append("partial");
        assembler.replace(Some(vec![1, 2, 3]), Some("final".to_string()));

        let snapshot = assembler.snapshot();
        assert_eq!(snapshot.text.as_deref(), Some("final"));
        assert_eq!(snapshot.blob, Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_set_blob_keeps_text() {
        let assembler = TranscriptAssembler::new();
        assembler.append("streamed");
        assembler.set_blob(vec![9, 9]);

        let snapshot = assembler.snapshot();
        assert_eq!(snapshot.text.as_deref(), Some("streamed"));
        assert_eq!(snapshot.blob, Some(vec![9, 9]));
    }

    #[test]
    fn test_reset_clears_everything() {
        let assembler = TranscriptAssembler::new();
        assembler.append("old");
        assembler.set_blob(vec![1]);
        assembler.reset();
        assert_eq!(assembler.snapshot(), Transcript::default());
    }

    #[test]
    fn test_clones_share_state() {
        let assembler = TranscriptAssembler::new();
        let clone = assembler.clone();
        clone.append("shared");
        assert_eq!(assembler.snapshot().text.as_deref(), Some("shared"));
    }
}
