//! Answer recording and analysis handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use mockview_common::{
    analysis::{history_kind, AnalyzeAnswerJob, Feedback},
    db::models::{AnalysisResult, Answer, AnswerMode, Question},
    db::{AnswerDetail, NewAnswer},
    errors::{AppError, Result},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAnswerRequest {
    /// `single` or `paper`
    pub mode: String,

    pub question_id: i32,

    pub paper_id: Option<i32>,

    #[validate(length(min = 1, max = 100))]
    pub paper_session_id: Option<String>,

    pub transcript: Option<String>,

    pub audio_url: Option<String>,

    #[validate(range(min = 0))]
    pub duration_seconds: Option<i32>,

    pub started_at: Option<DateTime<Utc>>,

    pub finished_at: Option<DateTime<Utc>>,
}

/// Answer with its question and stored analysis
#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    #[serde(flatten)]
    pub answer: Answer,
    pub question: Option<Question>,
    pub analysis: Option<AnalysisResult>,
}

impl From<AnswerDetail> for AnswerResponse {
    fn from(detail: AnswerDetail) -> Self {
        Self {
            answer: detail.answer,
            question: detail.question,
            analysis: detail.analysis,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AnalyzeAcceptedResponse {
    pub message: String,
    pub answer_id: i32,
}

#[derive(Debug, Deserialize)]
pub struct HistoryAnalyzeRequest {
    pub answer_ids: Vec<i32>,
    /// `single`/`paper` or the full prompt type name
    pub analysis_type: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PaperAnalyzeRequest {
    #[validate(length(min = 1, max = 100))]
    pub paper_session_id: String,
}

/// Mode rules that the column types cannot express
fn check_mode_fields(request: &CreateAnswerRequest) -> Result<AnswerMode> {
    let mode = AnswerMode::parse(&request.mode).ok_or_else(|| AppError::Validation {
        message: format!("mode must be 'single' or 'paper', got '{}'", request.mode),
        field: Some("mode".to_string()),
    })?;

    let has_session = request
        .paper_session_id
        .as_deref()
        .is_some_and(|s| !s.trim().is_empty());

    match mode {
        AnswerMode::Paper if !has_session => Err(AppError::Validation {
            message: "paper mode requires paper_session_id".to_string(),
            field: Some("paper_session_id".to_string()),
        }),
        AnswerMode::Single if request.paper_id.is_some() => Err(AppError::Validation {
            message: "single mode does not take paper_id".to_string(),
            field: Some("paper_id".to_string()),
        }),
        AnswerMode::Single if request.paper_session_id.is_some() => Err(AppError::Validation {
            message: "single mode does not take paper_session_id".to_string(),
            field: Some("paper_session_id".to_string()),
        }),
        _ => Ok(mode),
    }
}

/// Record an answer
pub async fn create_answer(
    State(state): State<AppState>,
    Json(request): Json<CreateAnswerRequest>,
) -> Result<(StatusCode, Json<Answer>)> {
    let mode = check_mode_fields(&request)?;
    request.validate()?;

    let repo = state.repo();
    if repo.find_question(request.question_id).await?.is_none() {
        return Err(AppError::QuestionNotFound { id: request.question_id });
    }
    if let Some(paper_id) = request.paper_id {
        if repo.find_paper(paper_id).await?.is_none() {
            return Err(AppError::PaperNotFound { id: paper_id });
        }
    }

    let answer = repo
        .create_answer(NewAnswer {
            mode,
            question_id: request.question_id,
            paper_id: request.paper_id,
            paper_session_id: request.paper_session_id,
            transcript: request.transcript,
            audio_url: request.audio_url,
            duration_seconds: request.duration_seconds,
            started_at: request.started_at.unwrap_or_else(Utc::now),
            finished_at: request.finished_at,
        })
        .await?;

    tracing::info!(
        answer_id = answer.id,
        mode = mode.as_str(),
        question_id = answer.question_id,
        "Answer recorded"
    );

    Ok((StatusCode::CREATED, Json(answer)))
}

/// Get an answer with its question and analysis
pub async fn get_answer(
    State(state): State<AppState>,
    Path(answer_id): Path<i32>,
) -> Result<Json<AnswerResponse>> {
    let detail = state.analysis().answer_detail(answer_id).await?;
    Ok(Json(detail.into()))
}

/// Start a background analysis; the result is fetched from `/analysis`
pub async fn analyze_answer(
    State(state): State<AppState>,
    Path(answer_id): Path<i32>,
) -> Result<(StatusCode, Json<AnalyzeAcceptedResponse>)> {
    let service = state.analysis();
    let detail = service.answer_detail(answer_id).await?;
    if detail.analysis.is_some() {
        return Err(AppError::AlreadyAnalyzed { answer_id });
    }

    let permit = state
        .answer_locks
        .try_acquire(answer_id)
        .ok_or_else(|| AppError::AnalysisInProgress {
            key: format!("answer {}", answer_id),
        })?;

    let call = service.prepare_answer(&detail).await?;
    tracing::info!(answer_id, model = %call.model_name(), "Background analysis submitted");

    state.jobs.submit(AnalyzeAnswerJob {
        answer: detail.answer,
        call,
        permit,
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(AnalyzeAcceptedResponse {
            message: "analysis started".to_string(),
            answer_id,
        }),
    ))
}

/// Stored analysis of an answer
pub async fn get_analysis(
    State(state): State<AppState>,
    Path(answer_id): Path<i32>,
) -> Result<Json<AnalysisResult>> {
    let repo = state.repo();
    if repo.find_answer(answer_id).await?.is_none() {
        return Err(AppError::AnswerNotFound { id: answer_id });
    }

    let analysis = repo
        .find_analysis(answer_id)
        .await?
        .ok_or(AppError::AnalysisNotFound { answer_id })?;

    Ok(Json(analysis))
}

/// Coach-style review across several past answers; not stored
pub async fn history_analyze(
    State(state): State<AppState>,
    Json(request): Json<HistoryAnalyzeRequest>,
) -> Result<Json<Feedback>> {
    let kind = history_kind(&request.analysis_type).ok_or_else(|| AppError::Validation {
        message: format!("unknown analysis_type '{}'", request.analysis_type),
        field: Some("analysis_type".to_string()),
    })?;

    let feedback = state.analysis().analyze_history(kind, &request.answer_ids).await?;
    Ok(Json(feedback))
}

/// Whole-paper review of one attempt; not stored
pub async fn paper_analyze(
    State(state): State<AppState>,
    Json(request): Json<PaperAnalyzeRequest>,
) -> Result<Json<Feedback>> {
    request.validate()?;

    let feedback = state.analysis().analyze_paper(&request.paper_session_id).await?;
    Ok(Json(feedback))
}
