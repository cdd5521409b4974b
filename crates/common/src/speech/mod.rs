//! Whisper-compatible speech transcription

use crate::db::models::{SpeechConfig, PROVIDER_WHISPER};
use crate::errors::{AppError, Result};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{info, instrument};

/// Language hint sent with every transcription
pub const LANGUAGE: &str = "zh";

#[derive(Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

/// Endpoint details resolved from the stored speech config
#[derive(Debug, Clone, PartialEq)]
pub struct WhisperTarget {
    pub url: String,
    pub api_key: String,
    pub model: String,
}

impl WhisperTarget {
    /// Validate that the config selects Whisper and carries its credentials
    pub fn from_config(config: &SpeechConfig, default_model: &str) -> Result<Self> {
        if config.provider != PROVIDER_WHISPER {
            return Err(AppError::SpeechNotConfigured {
                message: format!("provider is {}, not whisper", config.provider),
            });
        }

        let url = config
            .whisper_api_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| AppError::SpeechNotConfigured {
                message: "whisper API url is not set".to_string(),
            })?;

        let api_key = config
            .whisper_api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AppError::SpeechNotConfigured {
                message: "whisper API key is not set".to_string(),
            })?;

        let model = if config.whisper_model.trim().is_empty() {
            default_model.to_string()
        } else {
            config.whisper_model.clone()
        };

        Ok(Self { url, api_key, model })
    }
}

/// Transcribes uploaded audio through `{url}/audio/transcriptions`
#[derive(Clone)]
pub struct SpeechClient {
    client: reqwest::Client,
}

impl SpeechClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }

    #[instrument(skip(self, target, audio), fields(model = %target.model, bytes = audio.len()))]
    pub async fn transcribe(&self, target: &WhisperTarget, file_name: String, audio: Vec<u8>) -> Result<String> {
        let start = Instant::now();

        let form = Form::new()
            .text("model", target.model.clone())
            .text("language", LANGUAGE)
            .text("response_format", "json")
            .part("file", Part::bytes(audio).file_name(file_name));

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", target.url.trim_end_matches('/')))
            .bearer_auth(&target.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), body = %body, "Transcription failed");
            return Err(AppError::Upstream {
                message: format!("speech service returned status {}", status.as_u16()),
            });
        }

        let parsed: TranscriptionResponse = response.json().await.map_err(|e| AppError::Upstream {
            message: format!("Failed to parse transcription: {}", e),
        })?;

        info!(
            chars = parsed.text.chars().count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Transcription complete"
        );
        Ok(parsed.text)
    }
}
