//! Prompt template handlers

use axum::{
    extract::{Path, State},
    Json,
};
use mockview_common::{
    db::models::Prompt,
    errors::{AppError, Result},
};
use serde::Deserialize;
use validator::Validate;

use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePromptRequest {
    #[validate(length(min = 1, max = 100))]
    pub title: Option<String>,

    #[validate(length(min = 1, max = 20000))]
    pub content: String,
}

pub async fn list_prompts(State(state): State<AppState>) -> Result<Json<Vec<Prompt>>> {
    Ok(Json(state.repo().list_prompts().await?))
}

pub async fn get_prompt(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Prompt>> {
    let prompt = state
        .repo()
        .find_prompt(id)
        .await?
        .ok_or(AppError::PromptNotFound { id })?;

    Ok(Json(prompt))
}

/// Replace a template body. Placeholders are substituted literally at call time.
pub async fn update_prompt(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(request): Json<UpdatePromptRequest>,
) -> Result<Json<Prompt>> {
    request.validate()?;

    let prompt = state
        .repo()
        .update_prompt(id, request.title, request.content)
        .await?;
    tracing::info!(prompt_id = id, prompt_type = %prompt.prompt_type, "Prompt updated");

    Ok(Json(prompt))
}
