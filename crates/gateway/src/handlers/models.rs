//! LLM model configuration handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use mockview_common::{
    db::models::{ModelConfig, ModelRole},
    db::ModelConfigInput,
    errors::{AppError, Result},
    llm,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct ModelConfigRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,

    #[validate(url)]
    pub base_url: Option<String>,

    pub api_key: Option<String>,

    #[validate(length(min = 1, max = 100))]
    pub model_name: Option<String>,

    /// `analyze` or `import`
    pub role: Option<String>,

    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ListModelsQuery {
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct FetchModelsRequest {
    #[validate(url)]
    pub base_url: String,

    pub api_key: Option<String>,

    /// Stored config whose key is used when `api_key` is absent or masked
    pub model_id: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct FetchModelsResponse {
    pub models: Vec<String>,
}

/// Model config as shown to clients, with the key masked
#[derive(Debug, Serialize)]
pub struct ModelConfigResponse {
    #[serde(flatten)]
    pub config: ModelConfig,
    pub api_key: String,
}

impl From<ModelConfig> for ModelConfigResponse {
    fn from(config: ModelConfig) -> Self {
        Self {
            api_key: config.masked_api_key(),
            config,
        }
    }
}

fn parse_role(raw: &str) -> Result<ModelRole> {
    ModelRole::parse(raw).ok_or_else(|| AppError::Validation {
        message: format!("role must be 'analyze' or 'import', got '{}'", raw),
        field: Some("role".to_string()),
    })
}

/// A key echoed back from a listing carries the mask and means "unchanged"
fn is_masked(key: &str) -> bool {
    key.contains("...") || key.contains("***")
}

impl ModelConfigRequest {
    fn into_input(self) -> Result<ModelConfigInput> {
        Ok(ModelConfigInput {
            name: self.name,
            base_url: self.base_url,
            api_key: self.api_key.filter(|k| !is_masked(k)),
            model_name: self.model_name,
            role: self.role.as_deref().map(parse_role).transpose()?,
            is_active: self.is_active,
        })
    }
}

/// List model configs, optionally for one role
pub async fn list_models(
    State(state): State<AppState>,
    Query(query): Query<ListModelsQuery>,
) -> Result<Json<Vec<ModelConfigResponse>>> {
    let role = query.role.as_deref().map(parse_role).transpose()?;
    let configs = state.repo().list_model_configs(role).await?;

    Ok(Json(configs.into_iter().map(Into::into).collect()))
}

/// Create a model config
pub async fn create_model(
    State(state): State<AppState>,
    Json(request): Json<ModelConfigRequest>,
) -> Result<(StatusCode, Json<ModelConfigResponse>)> {
    request.validate()?;

    let config = state.repo().create_model_config(request.into_input()?).await?;
    tracing::info!(
        model_id = config.id,
        role = %config.role,
        active = config.is_active,
        "Model config created"
    );

    Ok((StatusCode::CREATED, Json(config.into())))
}

/// Update a model config; an empty or masked key keeps the stored one
pub async fn update_model(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(request): Json<ModelConfigRequest>,
) -> Result<Json<ModelConfigResponse>> {
    request.validate()?;

    let config = state.repo().update_model_config(id, request.into_input()?).await?;
    Ok(Json(config.into()))
}

/// Delete a model config
pub async fn delete_model(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode> {
    if !state.repo().delete_model_config(id).await? {
        return Err(AppError::ModelNotFound { id });
    }

    tracing::info!(model_id = id, "Model config deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Make a config the only active one of its role
pub async fn activate_model(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ModelConfigResponse>> {
    let config = state.repo().activate_model_config(id).await?;
    tracing::info!(model_id = id, role = %config.role, "Model activated");

    Ok(Json(config.into()))
}

/// Ask a provider which models it serves
pub async fn fetch_models(
    State(state): State<AppState>,
    Json(request): Json<FetchModelsRequest>,
) -> Result<Json<FetchModelsResponse>> {
    request.validate()?;

    let api_key = match request.api_key.filter(|k| !k.trim().is_empty() && !is_masked(k)) {
        Some(key) => key,
        None => {
            let id = request.model_id.ok_or_else(|| AppError::MissingField {
                field: "api_key".to_string(),
            })?;
            state
                .repo()
                .find_model_config(id)
                .await?
                .ok_or(AppError::ModelNotFound { id })?
                .api_key
        }
    };

    let timeout = Duration::from_secs(state.config.llm.timeout_secs);
    let models = llm::list_models(&request.base_url, &api_key, timeout).await?;
    tracing::info!(base_url = %request.base_url, count = models.len(), "Fetched provider models");

    Ok(Json(FetchModelsResponse { models }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masked_key_is_ignored() {
        let request = ModelConfigRequest {
            name: None,
            base_url: None,
            api_key: Some("sk-...3456".into()),
            model_name: None,
            role: Some("import".into()),
            is_active: None,
        };
        let input = request.into_input().unwrap();
        assert!(input.api_key.is_none());
        assert_eq!(input.role, Some(ModelRole::Import));
    }

    #[test]
    fn test_unknown_role_rejected() {
        assert!(parse_role("chat").is_err());
        assert_eq!(parse_role("analyze").unwrap(), ModelRole::Analyze);
    }
}
