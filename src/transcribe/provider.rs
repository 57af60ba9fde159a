//! Transcription provider seam.
//!
//! A [`TranscriptionProvider`] turns an encoded audio blob into text. The
//! shipped implementation talks to the Whisper API; callers can plug in
//! their own via [`CallbackProvider`] or any other impl.

use crate::error::{Result, SottoError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Which speech-to-text operation to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptionMode {
    /// Transcribe in the spoken language.
    #[default]
    Transcriptions,
    /// Translate to English.
    Translations,
}

impl TranscriptionMode {
    /// API endpoint path segment for this mode.
    pub fn endpoint(&self) -> &'static str {
        match self {
            TranscriptionMode::Transcriptions => "transcriptions",
            TranscriptionMode::Translations => "translations",
        }
    }
}

/// Options forwarded to the provider with every request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscribeOptions {
    /// Transcribe or translate.
    pub mode: TranscriptionMode,
    /// ISO-639-1 language hint.
    pub language: Option<String>,
    /// Prompt to bias the model.
    pub prompt: Option<String>,
    /// Response format requested from the API.
    pub response_format: Option<String>,
    /// Sampling temperature (0.0 to 1.0).
    pub temperature: Option<f32>,
}

/// Trait for transcription providers.
///
/// This trait allows swapping implementations (remote API, local model,
/// caller-supplied callback, mock).
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    /// Transcribe an encoded audio blob to text.
    async fn transcribe(&self, audio: Vec<u8>, options: &TranscribeOptions) -> Result<String>;
}

type CallbackFuture = Pin<Box<dyn Future<Output = Result<String>> + Send>>;

/// Provider backed by a caller-supplied async function.
pub struct CallbackProvider {
    callback: Box<dyn Fn(Vec<u8>, TranscribeOptions) -> CallbackFuture + Send + Sync>,
}

impl CallbackProvider {
    /// Wraps an async function as a provider.
    pub fn new<F, Fut>(callback: F) -> Self
    where
        F: Fn(Vec<u8>, TranscribeOptions) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        Self {
            callback: Box::new(move |audio, options| Box::pin(callback(audio, options))),
        }
    }
}

#[async_trait]
impl TranscriptionProvider for CallbackProvider {
    async fn transcribe(&self, audio: Vec<u8>, options: &TranscribeOptions) -> Result<String> {
        (self.callback)(audio, options.clone()).await
    }
}

enum ScriptedCall {
    Respond(String),
    Fail(String),
}

/// Mock transcription provider for testing.
///
/// Responses are scripted in order; once the script runs out, every call
/// returns the fallback response.
pub struct MockProvider {
    script: Mutex<VecDeque<ScriptedCall>>,
    fallback: String,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockProvider {
    /// Create a mock that answers every call with the given text.
    pub fn new(fallback: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: fallback.to_string(),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    fn script(&self) -> std::sync::MutexGuard<'_, VecDeque<ScriptedCall>> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a successful response for the next unscripted call.
    pub fn with_response(self, text: &str) -> Self {
        self.script().push_back(ScriptedCall::Respond(text.to_string()));
        self
    }

    /// Queue a failure for the next unscripted call.
    pub fn with_failure(self, message: &str) -> Self {
        self.script().push_back(ScriptedCall::Fail(message.to_string()));
        self
    }

    /// Delay every call by the given duration.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of transcribe calls received.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Wraps the mock in an `Arc` for sharing with a recorder.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl TranscriptionProvider for MockProvider {
    async fn transcribe(&self, _audio: Vec<u8>, _options: &TranscribeOptions) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.script().pop_front();
        match scripted {
            Some(ScriptedCall::Respond(text)) => Ok(text),
            Some(ScriptedCall::Fail(message)) => Err(SottoError::Provider { message }),
            None => Ok(self.fallback.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_endpoints() {
        assert_eq!(TranscriptionMode::Transcriptions.endpoint(), "transcriptions");
        assert_eq!(TranscriptionMode::Translations.endpoint(), "translations");
    }

    #[test]
    fn test_mode_serde_lowercase() {
        let json = serde_json::to_string(&TranscriptionMode::Translations).unwrap();
        assert_eq!(json, "\"translations\"");
        let mode: TranscriptionMode = serde_json::from_str("\"transcriptions\"").unwrap();
        assert_eq!(mode, TranscriptionMode::Transcriptions);
    }

    #[tokio::test]
    async fn test_mock_scripted_then_fallback() {
        let provider = MockProvider::new("fallback")
            .with_response("first")
            .with_failure("boom");

        let options = TranscribeOptions::default();
        assert_eq!(provider.transcribe(vec![], &options).await.unwrap(), "first");
        assert!(matches!(
            provider.transcribe(vec![], &options).await,
            Err(SottoError::Provider { .. })
        ));
        assert_eq!(
            provider.transcribe(vec![], &options).await.unwrap(),
            "fallback"
        );
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_callback_provider_receives_audio() {
        let provider = CallbackProvider::new(|audio: Vec<u8>, _options| async move {
            Ok(format!("{} bytes", audio.len()))
        });

        let text = provider
            .transcribe(vec![0u8; 42], &TranscribeOptions::default())
            .await
            .unwrap();
        assert_eq!(text, "42 bytes");
    }
}
