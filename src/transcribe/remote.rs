//! Whisper API transcription provider.
//!
//! Sends encoded audio as a multipart upload to the OpenAI speech-to-text
//! endpoints and extracts the transcript text from the JSON response.

use crate::defaults;
use crate::error::{Result, SottoError};
use crate::transcribe::provider::{TranscribeOptions, TranscriptionProvider};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Provider backed by the Whisper HTTP API.
pub struct WhisperApiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl WhisperApiProvider {
    /// Creates a provider using the default API base URL.
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, defaults::WHISPER_API_BASE)
    }

    /// Creates a provider against a custom base URL (proxies, test servers).
    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn build_form(audio: Vec<u8>, options: &TranscribeOptions) -> Result<reqwest::multipart::Form> {
        let file = reqwest::multipart::Part::bytes(audio)
            .file_name("speech.wav")
            .mime_str("audio/wav")
            .map_err(|e| SottoError::Provider {
                message: format!("failed to build upload part: {e}"),
            })?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model", defaults::WHISPER_MODEL);

        if let Some(language) = &options.language {
            form = form.text("language", language.clone());
        }
        if let Some(prompt) = &options.prompt {
            form = form.text("prompt", prompt.clone());
        }
        if let Some(response_format) = &options.response_format {
            form = form.text("response_format", response_format.clone());
        }
        if let Some(temperature) = options.temperature {
            form = form.text("temperature", temperature.to_string());
        }
        Ok(form)
    }
}

#[async_trait]
impl TranscriptionProvider for WhisperApiProvider {
    async fn transcribe(&self, audio: Vec<u8>, options: &TranscribeOptions) -> Result<String> {
        let url = format!("{}/{}", self.base_url, options.mode.endpoint());
        let audio_len = audio.len();
        let form = Self::build_form(audio, options)?;

        debug!("uploading {audio_len} bytes to {url}");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SottoError::Provider {
                message: format!("request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SottoError::Provider {
                message: format!("API returned {status}: {body}"),
            });
        }

        let parsed: WhisperResponse =
            response.json().await.map_err(|e| SottoError::Provider {
                message: format!("failed to parse response: {e}"),
            })?;
        Ok(parsed.text)
    }
}
