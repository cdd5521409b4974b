//! Paper management handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use mockview_common::{
    db::models::{Paper, PaperItem},
    db::PaperDetail,
    errors::{AppError, Result},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{Page, PageQuery};
use crate::AppState;

/// Request to create a paper from existing questions
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePaperRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,

    #[validate(length(max = 2000))]
    pub description: Option<String>,

    #[validate(range(min = 0))]
    pub time_limit_seconds: Option<i32>,

    /// Question ids in paper order
    #[serde(default)]
    pub question_ids: Vec<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePaperRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,

    #[validate(length(max = 2000))]
    pub description: Option<String>,

    #[validate(range(min = 0))]
    pub time_limit_seconds: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct AddItemQuery {
    pub question_id: i32,
}

/// Listing row
#[derive(Serialize)]
pub struct PaperSummary {
    #[serde(flatten)]
    pub paper: Paper,
    pub question_count: usize,
}

/// List papers, newest first
pub async fn list_papers(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<PaperSummary>>> {
    let (page, page_size) = query.resolve()?;
    let (rows, total) = state.repo().list_papers(page, page_size).await?;

    Ok(Json(Page {
        items: rows
            .into_iter()
            .map(|(paper, question_count)| PaperSummary { paper, question_count })
            .collect(),
        total,
        page,
        page_size,
    }))
}

/// Create a paper
pub async fn create_paper(
    State(state): State<AppState>,
    Json(request): Json<CreatePaperRequest>,
) -> Result<(StatusCode, Json<PaperDetail>)> {
    request.validate()?;

    let repo = state.repo();
    let paper = repo
        .create_paper(
            request.title,
            request.description,
            request.time_limit_seconds,
            &request.question_ids,
        )
        .await?;

    tracing::info!(
        paper_id = paper.id,
        questions = request.question_ids.len(),
        "Paper created"
    );

    let detail = repo
        .find_paper_detail(paper.id)
        .await?
        .ok_or(AppError::PaperNotFound { id: paper.id })?;

    Ok((StatusCode::CREATED, Json(detail)))
}

/// Get a paper with its ordered questions
pub async fn get_paper(
    State(state): State<AppState>,
    Path(paper_id): Path<i32>,
) -> Result<Json<PaperDetail>> {
    let detail = state
        .repo()
        .find_paper_detail(paper_id)
        .await?
        .ok_or(AppError::PaperNotFound { id: paper_id })?;

    Ok(Json(detail))
}

/// Update paper metadata
pub async fn update_paper(
    State(state): State<AppState>,
    Path(paper_id): Path<i32>,
    Json(request): Json<UpdatePaperRequest>,
) -> Result<Json<Paper>> {
    request.validate()?;

    let paper = state
        .repo()
        .update_paper(
            paper_id,
            request.title,
            request.description,
            request.time_limit_seconds,
        )
        .await?;

    Ok(Json(paper))
}

/// Delete a paper. Answers given under it are kept without the link.
pub async fn delete_paper(
    State(state): State<AppState>,
    Path(paper_id): Path<i32>,
) -> Result<StatusCode> {
    if !state.repo().delete_paper(paper_id).await? {
        return Err(AppError::PaperNotFound { id: paper_id });
    }

    tracing::info!(paper_id, "Paper deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Append a question to a paper
pub async fn add_item(
    State(state): State<AppState>,
    Path(paper_id): Path<i32>,
    Query(query): Query<AddItemQuery>,
) -> Result<(StatusCode, Json<PaperItem>)> {
    let item = state.repo().add_paper_item(paper_id, query.question_id).await?;

    tracing::info!(
        paper_id,
        question_id = query.question_id,
        sort_order = item.sort_order,
        "Question added to paper"
    );

    Ok((StatusCode::CREATED, Json(item)))
}

/// Remove one question from a paper
pub async fn remove_item(
    State(state): State<AppState>,
    Path((paper_id, item_id)): Path<(i32, i32)>,
) -> Result<StatusCode> {
    if !state.repo().remove_paper_item(paper_id, item_id).await? {
        return Err(AppError::NotFound {
            resource_type: "paper item".to_string(),
            id: item_id.to_string(),
        });
    }

    Ok(StatusCode::NO_CONTENT)
}
