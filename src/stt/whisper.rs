//! Whisper-compatible HTTP transcription engine.
//!
//! Speaks the OpenAI `/audio/transcriptions` endpoint: multipart upload,
//! `response_format=text`, bearer auth. Any server exposing the same
//! contract works by pointing `STT_BASE_URL` at it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart;
use secrecy::{ExposeSecret, SecretString};
use tracing::Instrument;

use super::{TranscriptionEngine, audio_mime};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::telemetry;

pub struct WhisperHttpEngine {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl WhisperHttpEngine {
    pub fn new(
        api_key: SecretString,
        base_url: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Other(format!("http client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.openai_api_key.clone(),
            &config.stt_base_url,
            &config.stt_model,
            config.stt_timeout,
        )
    }

    async fn request_transcript(&self, audio: &[u8], file_name: &str) -> Result<String> {
        let started = std::time::Instant::now();

        let url = format!("{}/audio/transcriptions", self.base_url);
        let file_part = multipart::Part::bytes(audio.to_vec())
            .file_name(file_name.to_string())
            .mime_str(audio_mime(file_name))
            .map_err(|e| Error::Other(format!("mime: {e}")))?;
        let form = multipart::Form::new()
            .text("model", self.model.clone())
            .text("response_format", "text")
            .part("file", file_part);

        tracing::debug!(model = %self.model, bytes = audio.len(), "sending audio for transcription");

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::TranscriptionTimeout(self.timeout)
                } else {
                    Error::TranscriptionApi {
                        status: e.status().map(|s| s.as_u16()),
                        message: format!("request: {e}"),
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unreadable error body".to_string());
            return Err(Error::TranscriptionApi {
                status: Some(status),
                message: api_error_detail(&body),
            });
        }

        let transcript = response.text().await.map_err(|e| {
            if e.is_timeout() {
                Error::TranscriptionTimeout(self.timeout)
            } else {
                Error::TranscriptionApi {
                    status: None,
                    message: format!("body: {e}"),
                }
            }
        })?;
        let transcript = transcript.trim().to_string();

        telemetry::metrics::transcription_duration_ms()
            .record(started.elapsed().as_millis() as f64, &[]);
        tracing::info!(chars = transcript.chars().count(), "transcription completed");

        Ok(transcript)
    }
}

#[async_trait]
impl TranscriptionEngine for WhisperHttpEngine {
    async fn transcribe(&self, audio: &[u8], file_name: &str) -> Result<String> {
        let span = telemetry::stt::start_transcribe_span(&self.model, audio.len());
        let result = self
            .request_transcript(audio, file_name)
            .instrument(span.clone())
            .await;
        if let Ok(transcript) = &result {
            telemetry::stt::record_transcript(&span, transcript.chars().count() as u64);
        }
        result
    }
}

/// Pull the human-readable message out of an API error body. Bodies are
/// JSON `{"error": {"message": ...}}` on the real endpoint but plain text
/// on some compatible servers.
fn api_error_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}
