//! Document import handlers
//!
//! Requests only create the task; extraction runs as a background job and
//! clients poll `/import/status/{id}`.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use mockview_common::{
    db::models::{ImportKind, ImportTask, MAX_IMPORT_CHARS},
    errors::{AppError, Result},
};
use mockview_ingestion::{extract_document, max_import_chars, start_import};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::read_upload;
use crate::AppState;

/// Tasks returned by `/import/history`
pub const IMPORT_HISTORY_LIMIT: u64 = 20;

const TEXT_FILE_TYPE: &str = "text";
const DEFAULT_TEXT_FILE_NAME: &str = "pasted-text.txt";

#[derive(Debug, Serialize)]
pub struct ImportAcceptedResponse {
    pub message: String,
    pub import_id: i32,
    pub file_name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ImportTextRequest {
    #[validate(length(min = 1))]
    pub text: String,

    /// `single` or `paper`
    #[serde(default = "default_import_type")]
    pub import_type: String,

    #[validate(length(min = 1, max = 255))]
    pub file_name: Option<String>,
}

fn default_import_type() -> String {
    ImportKind::Single.as_str().to_string()
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct ImportSettings {
    #[validate(range(min = 1000, max = 200000))]
    pub max_import_chars: usize,
}

async fn accept(
    state: &AppState,
    file_name: String,
    file_type: &str,
    kind: ImportKind,
    text: String,
) -> Result<(StatusCode, Json<ImportAcceptedResponse>)> {
    let task = start_import(&state.jobs, file_name, file_type, kind, text).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ImportAcceptedResponse {
            message: "import started".to_string(),
            import_id: task.id,
            file_name: task.file_name,
        }),
    ))
}

async fn import_upload(
    state: AppState,
    multipart: Multipart,
    kind: ImportKind,
) -> Result<(StatusCode, Json<ImportAcceptedResponse>)> {
    let upload = read_upload(multipart, "file", state.config.server.max_upload_bytes).await?;
    let document = extract_document(&upload.file_name, &upload.bytes)?;

    tracing::info!(
        file_name = %upload.file_name,
        file_type = document.doc_type.as_str(),
        bytes = upload.bytes.len(),
        "Document received for import"
    );

    accept(&state, upload.file_name, document.doc_type.as_str(), kind, document.text).await
}

/// `POST /import/single`: upload a question list
pub async fn import_single(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ImportAcceptedResponse>)> {
    import_upload(state, multipart, ImportKind::Single).await
}

/// `POST /import/paper`: upload a whole paper
pub async fn import_paper(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ImportAcceptedResponse>)> {
    import_upload(state, multipart, ImportKind::Paper).await
}

/// `POST /import/text`: import pasted text
pub async fn import_text(
    State(state): State<AppState>,
    Json(request): Json<ImportTextRequest>,
) -> Result<(StatusCode, Json<ImportAcceptedResponse>)> {
    request.validate()?;

    let kind = ImportKind::parse(&request.import_type).ok_or_else(|| AppError::Validation {
        message: format!("import_type must be 'single' or 'paper', got '{}'", request.import_type),
        field: Some("import_type".to_string()),
    })?;

    if request.text.trim().is_empty() {
        return Err(AppError::Validation {
            message: "text is empty".to_string(),
            field: Some("text".to_string()),
        });
    }

    let file_name = request
        .file_name
        .unwrap_or_else(|| DEFAULT_TEXT_FILE_NAME.to_string());
    accept(&state, file_name, TEXT_FILE_TYPE, kind, request.text).await
}

/// `GET /import/status/{id}`
pub async fn import_status(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<ImportTask>> {
    let task = state
        .repo()
        .find_import_task(id)
        .await?
        .ok_or(AppError::ImportTaskNotFound { id })?;

    Ok(Json(task))
}

/// `GET /import/history`
pub async fn import_history(State(state): State<AppState>) -> Result<Json<Vec<ImportTask>>> {
    Ok(Json(state.repo().list_import_tasks(IMPORT_HISTORY_LIMIT).await?))
}

/// `GET /import/settings`
pub async fn get_settings(State(state): State<AppState>) -> Result<Json<ImportSettings>> {
    let max_import_chars =
        max_import_chars(&state.repo(), state.config.import.default_max_chars).await?;

    Ok(Json(ImportSettings { max_import_chars }))
}

/// `PUT /import/settings`
pub async fn update_settings(
    State(state): State<AppState>,
    Json(request): Json<ImportSettings>,
) -> Result<Json<ImportSettings>> {
    request.validate()?;

    state
        .repo()
        .set_setting(MAX_IMPORT_CHARS, request.max_import_chars.to_string())
        .await?;
    tracing::info!(max_import_chars = request.max_import_chars, "Import budget updated");

    Ok(Json(request))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_range() {
        assert!(ImportSettings { max_import_chars: 999 }.validate().is_err());
        assert!(ImportSettings { max_import_chars: 1000 }.validate().is_ok());
        assert!(ImportSettings { max_import_chars: 200_000 }.validate().is_ok());
        assert!(ImportSettings { max_import_chars: 200_001 }.validate().is_err());
    }
}
