//! Speech-to-text settings and transcription

use axum::{
    extract::{Multipart, State},
    Json,
};
use mockview_common::{
    db::models::{SpeechConfig, PROVIDER_WEB_SPEECH, PROVIDER_WHISPER},
    errors::{AppError, Result},
    speech::WhisperTarget,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::read_upload;
use crate::AppState;

/// Shown in place of a stored key
const KEY_MASK: &str = "***";

#[derive(Debug, Serialize)]
pub struct SpeechConfigResponse {
    pub provider: String,
    pub whisper_api_url: Option<String>,
    pub whisper_api_key: Option<String>,
    pub whisper_model: String,
}

impl SpeechConfigResponse {
    fn from_config(config: Option<SpeechConfig>, default_model: &str) -> Self {
        match config {
            Some(config) => Self {
                provider: config.provider,
                whisper_api_url: config.whisper_api_url,
                whisper_api_key: config
                    .whisper_api_key
                    .filter(|k| !k.is_empty())
                    .map(|_| KEY_MASK.to_string()),
                whisper_model: config.whisper_model,
            },
            None => Self {
                provider: PROVIDER_WEB_SPEECH.to_string(),
                whisper_api_url: None,
                whisper_api_key: None,
                whisper_model: default_model.to_string(),
            },
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSpeechConfigRequest {
    pub provider: Option<String>,

    #[validate(url)]
    pub whisper_api_url: Option<String>,

    /// `***` keeps the stored key
    pub whisper_api_key: Option<String>,

    #[validate(length(min = 1, max = 100))]
    pub whisper_model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub transcript: String,
}

pub async fn get_config(State(state): State<AppState>) -> Result<Json<SpeechConfigResponse>> {
    let config = state.repo().find_speech_config().await?;
    Ok(Json(SpeechConfigResponse::from_config(
        config,
        &state.config.speech.default_model,
    )))
}

pub async fn update_config(
    State(state): State<AppState>,
    Json(request): Json<UpdateSpeechConfigRequest>,
) -> Result<Json<SpeechConfigResponse>> {
    request.validate()?;

    if let Some(provider) = request.provider.as_deref() {
        if provider != PROVIDER_WEB_SPEECH && provider != PROVIDER_WHISPER {
            return Err(AppError::Validation {
                message: format!("provider must be '{}' or '{}'", PROVIDER_WEB_SPEECH, PROVIDER_WHISPER),
                field: Some("provider".to_string()),
            });
        }
    }

    let api_key = request.whisper_api_key.filter(|k| k != KEY_MASK);
    let saved = state
        .repo()
        .save_speech_config(
            request.provider,
            request.whisper_api_url,
            api_key,
            request.whisper_model,
        )
        .await?;

    tracing::info!(provider = %saved.provider, "Speech config saved");

    Ok(Json(SpeechConfigResponse::from_config(
        Some(saved),
        &state.config.speech.default_model,
    )))
}

/// Transcribe an uploaded recording through the configured Whisper endpoint
pub async fn transcribe(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<TranscriptResponse>> {
    let config = state
        .repo()
        .find_speech_config()
        .await?
        .ok_or_else(|| AppError::SpeechNotConfigured {
            message: "no speech config saved".to_string(),
        })?;
    let target = WhisperTarget::from_config(&config, &state.config.speech.default_model)?;

    let upload = read_upload(multipart, "file", state.config.server.max_upload_bytes).await?;
    if upload.bytes.is_empty() {
        return Err(AppError::Validation {
            message: "audio file is empty".to_string(),
            field: Some("file".to_string()),
        });
    }

    let transcript = state
        .speech
        .transcribe(&target, upload.file_name, upload.bytes)
        .await?;

    Ok(Json(TranscriptResponse { transcript }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_default_when_unset() {
        let response = SpeechConfigResponse::from_config(None, "whisper-1");
        assert_eq!(response.provider, PROVIDER_WEB_SPEECH);
        assert_eq!(response.whisper_model, "whisper-1");
        assert!(response.whisper_api_key.is_none());
    }

    #[test]
    fn test_key_is_masked() {
        let config = SpeechConfig {
            id: 1,
            provider: PROVIDER_WHISPER.into(),
            whisper_api_url: Some("https://api.example.com/v1".into()),
            whisper_api_key: Some("sk-secret-value".into()),
            whisper_model: "whisper-1".into(),
            is_active: true,
            updated_at: Utc::now(),
        };
        let response = SpeechConfigResponse::from_config(Some(config), "whisper-1");
        assert_eq!(response.whisper_api_key.as_deref(), Some(KEY_MASK));
    }
}
