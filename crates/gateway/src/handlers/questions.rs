//! Question bank handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use mockview_common::{
    db::models::{Question, DEFAULT_CATEGORY, SOURCE_MANUAL},
    db::{NewQuestion, QuestionFilter, QuestionPatch},
    errors::{AppError, Result},
};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{Page, PageQuery};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuestionsQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    /// Comma-separated categories
    pub category: Option<String>,
    pub keyword: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 50))]
    pub category: Option<String>,

    #[validate(length(min = 1, max = 10000))]
    pub content: String,

    pub analysis: Option<String>,
    pub reference_answer: Option<String>,
    pub image_url: Option<String>,
    pub tags: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuestionRequest {
    #[validate(length(min = 1, max = 50))]
    pub category: Option<String>,

    #[validate(length(min = 1, max = 10000))]
    pub content: Option<String>,

    pub analysis: Option<String>,
    pub reference_answer: Option<String>,
    pub image_url: Option<String>,
    pub tags: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BatchDeleteRequest {
    #[validate(length(min = 1, max = 500))]
    pub ids: Vec<i32>,
}

#[derive(Debug, Serialize)]
pub struct BatchDeleteResponse {
    pub deleted: u64,
}

#[derive(Debug, Deserialize)]
pub struct RandomQuery {
    pub category: Option<String>,
}

fn split_categories(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}

/// List live questions
pub async fn list_questions(
    State(state): State<AppState>,
    Query(query): Query<ListQuestionsQuery>,
) -> Result<Json<Page<Question>>> {
    let (page, page_size) = PageQuery {
        page: query.page,
        page_size: query.page_size,
    }
    .resolve()?;

    let filter = QuestionFilter {
        categories: split_categories(query.category.as_deref()),
        keyword: query.keyword,
        page,
        page_size,
    };
    let (items, total) = state.repo().list_questions(&filter).await?;

    Ok(Json(Page {
        items,
        total,
        page,
        page_size,
    }))
}

/// Create a question
pub async fn create_question(
    State(state): State<AppState>,
    Json(request): Json<CreateQuestionRequest>,
) -> Result<(StatusCode, Json<Question>)> {
    request.validate()?;

    let question = state
        .repo()
        .create_question(NewQuestion {
            category: request.category.unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            content: request.content,
            analysis: request.analysis,
            reference_answer: request.reference_answer,
            image_url: request.image_url,
            tags: request.tags,
            source: Some(SOURCE_MANUAL.to_string()),
        })
        .await?;

    tracing::info!(question_id = question.id, category = %question.category, "Question created");

    Ok((StatusCode::CREATED, Json(question)))
}

/// Get a live question
pub async fn get_question(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Question>> {
    let question = state
        .repo()
        .find_question(id)
        .await?
        .filter(|q| !q.is_deleted)
        .ok_or(AppError::QuestionNotFound { id })?;

    Ok(Json(question))
}

/// Partially update a question
pub async fn update_question(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(request): Json<UpdateQuestionRequest>,
) -> Result<Json<Question>> {
    request.validate()?;

    let question = state
        .repo()
        .update_question(
            id,
            QuestionPatch {
                category: request.category,
                content: request.content,
                analysis: request.analysis,
                reference_answer: request.reference_answer,
                image_url: request.image_url,
                tags: request.tags,
            },
        )
        .await?;

    Ok(Json(question))
}

/// Soft-delete one question
pub async fn delete_question(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode> {
    let deleted = state.repo().soft_delete_questions(&[id]).await?;
    if deleted == 0 {
        return Err(AppError::QuestionNotFound { id });
    }

    tracing::info!(question_id = id, "Question deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Soft-delete several questions; unknown ids are ignored
pub async fn batch_delete(
    State(state): State<AppState>,
    Json(request): Json<BatchDeleteRequest>,
) -> Result<Json<BatchDeleteResponse>> {
    request.validate()?;

    let deleted = state.repo().soft_delete_questions(&request.ids).await?;
    tracing::info!(requested = request.ids.len(), deleted, "Questions deleted");

    Ok(Json(BatchDeleteResponse { deleted }))
}

/// Draw one live question at random, optionally within a category
pub async fn random_question(
    State(state): State<AppState>,
    Query(query): Query<RandomQuery>,
) -> Result<Json<Question>> {
    let repo = state.repo();
    let category = query.category.as_deref().map(str::trim).filter(|c| !c.is_empty());
    let ids = repo.live_question_ids(category).await?;

    let picked = {
        let mut rng = rand::thread_rng();
        ids.choose(&mut rng).copied()
    };

    let not_found = || AppError::NotFound {
        resource_type: "question".to_string(),
        id: category.unwrap_or("any").to_string(),
    };
    let id = picked.ok_or_else(not_found)?;
    let question = repo.find_question(id).await?.ok_or_else(not_found)?;

    Ok(Json(question))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_categories() {
        assert_eq!(
            split_categories(Some("综合分析, 组织协调,,")),
            vec!["综合分析".to_string(), "组织协调".to_string()]
        );
        assert!(split_categories(None).is_empty());
        assert!(split_categories(Some(" ")).is_empty());
    }

    #[test]
    fn test_create_request_validation() {
        let request = CreateQuestionRequest {
            category: Some(String::new()),
            content: "谈谈你的理解".into(),
            analysis: None,
            reference_answer: None,
            image_url: None,
            tags: None,
        };
        assert!(request.validate().is_err());
    }
}
