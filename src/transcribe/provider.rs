use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::Result;

/// Recognized text returned by one provider call
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderTranscript {
    pub text: String,
}

/// One failed provider call, carrying the HTTP-like status used for retry
/// classification. Transport failures (no response at all) have no status.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ProviderError {
    pub status: Option<u16>,
    pub message: String,
}

impl ProviderError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    /// Rate limiting and transient server faults warrant a retry with a
    /// different credential; transport failures count as transient too.
    /// Everything else (authorization, malformed input, exhausted quota)
    /// is fatal.
    pub fn is_retryable(&self) -> bool {
        matches!(self.status, None | Some(429) | Some(500) | Some(503))
    }
}

/// Seam to the speech-to-text provider, one call per audio segment
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        audio_path: &Path,
        api_key: &str,
        language: Option<&str>,
        prompt: Option<&str>,
    ) -> std::result::Result<ProviderTranscript, ProviderError>;
}

/// Whisper-compatible HTTP transcription client
pub struct WhisperClient {
    client: Client,
    api_base: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl WhisperClient {
    pub fn new(provider: &ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(provider.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_base: provider.api_base.trim_end_matches('/').to_string(),
            model: provider.model.clone(),
        })
    }

    /// Pull the human-readable rejection reason out of the error body,
    /// falling back to the raw body text
    fn rejection_message(body: &str) -> String {
        serde_json::from_str::<ApiErrorBody>(body)
            .ok()
            .and_then(|parsed| parsed.error)
            .map(|detail| detail.message)
            .unwrap_or_else(|| body.trim().to_string())
    }
}

#[async_trait]
impl Transcriber for WhisperClient {
    async fn transcribe(
        &self,
        audio_path: &Path,
        api_key: &str,
        language: Option<&str>,
        prompt: Option<&str>,
    ) -> std::result::Result<ProviderTranscript, ProviderError> {
        let audio_bytes = tokio::fs::read(audio_path)
            .await
            .map_err(|e| ProviderError::transport(format!("failed to read audio file: {}", e)))?;

        debug!(
            "Uploading {} bytes from {} for transcription",
            audio_bytes.len(),
            audio_path.display()
        );

        let file_name = audio_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.mp3".to_string());

        let file_part = Part::bytes(audio_bytes)
            .file_name(file_name)
            .mime_str("audio/mpeg")
            .map_err(|e| ProviderError::transport(e.to_string()))?;

        let mut form = Form::new()
            .part("file", file_part)
            .text("model", self.model.clone())
            .text("response_format", "json");

        // Omitting the language field entirely lets the provider auto-detect
        if let Some(language) = language {
            form = form.text("language", language.to_string());
        }

        if let Some(prompt) = prompt {
            form = form.text("prompt", prompt.to_string());
        }

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.api_base))
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ProviderError::transport(e.to_string()))?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();

            return Err(ProviderError {
                status: Some(status.as_u16()),
                message: Self::rejection_message(&body),
            });
        }

        response.json::<ProviderTranscript>().await.map_err(|e| ProviderError {
            // A malformed success body is not worth burning retries on
            status: Some(status.as_u16()),
            message: format!("unexpected provider response: {}", e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_with_status(status: u16) -> ProviderError {
        ProviderError {
            status: Some(status),
            message: "test".to_string(),
        }
    }

    #[test]
    fn test_rate_limit_and_server_faults_are_retryable() {
        assert!(error_with_status(429).is_retryable());
        assert!(error_with_status(500).is_retryable());
        assert!(error_with_status(503).is_retryable());
        assert!(ProviderError::transport("connection reset").is_retryable());
    }

    #[test]
    fn test_auth_and_client_errors_are_fatal() {
        assert!(!error_with_status(401).is_retryable());
        assert!(!error_with_status(400).is_retryable());
        assert!(!error_with_status(403).is_retryable());
        assert!(!error_with_status(413).is_retryable());
    }

    #[test]
    fn test_rejection_message_prefers_structured_body() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        assert_eq!(
            WhisperClient::rejection_message(body),
            "Incorrect API key provided"
        );
    }

    #[test]
    fn test_rejection_message_falls_back_to_raw_body() {
        assert_eq!(
            WhisperClient::rejection_message("upstream connect error"),
            "upstream connect error"
        );
        assert_eq!(WhisperClient::rejection_message("{}"), "{}");
    }
}
