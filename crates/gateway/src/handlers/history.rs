//! Practice history and score trends

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use mockview_common::{
    db::models::AnswerMode,
    db::{AnswerDetail, TrendPoint},
    errors::{AppError, Result},
};
use serde::{Deserialize, Serialize};

use super::answers::AnswerResponse;
use super::PageQuery;
use crate::AppState;

const DEFAULT_TREND_DAYS: i64 = 30;
const MIN_TREND_DAYS: i64 = 7;
const MAX_TREND_DAYS: i64 = 90;

#[derive(Debug, Serialize)]
pub struct HistoryPage<G> {
    pub groups: Vec<G>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

/// Single-question answers practised on one day
#[derive(Debug, Serialize)]
pub struct DayGroup {
    pub date: String,
    pub items: Vec<AnswerResponse>,
}

/// Paper attempts practised on one day
#[derive(Debug, Serialize)]
pub struct PaperDayGroup {
    pub date: String,
    pub sessions: Vec<SessionGroup>,
}

#[derive(Debug, Serialize)]
pub struct SessionGroup {
    pub paper_session_id: String,
    pub paper_id: Option<i32>,
    pub total_seconds: i64,
    pub answers: Vec<AnswerResponse>,
}

#[derive(Debug, Deserialize)]
pub struct TrendsQuery {
    pub mode: Option<String>,
    pub days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TrendsResponse {
    pub mode: AnswerMode,
    pub days: i64,
    pub points: Vec<TrendPoint>,
}

/// Split answers (already newest first) into runs of the same practice date
fn group_by_date(answers: Vec<AnswerDetail>) -> Vec<(String, Vec<AnswerDetail>)> {
    let mut groups: Vec<(String, Vec<AnswerDetail>)> = Vec::new();
    for detail in answers {
        match groups.last_mut() {
            Some((date, items)) if *date == detail.answer.practice_date => items.push(detail),
            _ => groups.push((detail.answer.practice_date.clone(), vec![detail])),
        }
    }
    groups
}

/// Sessions in order of first appearance; answers inside a session in the
/// order they were given
fn group_by_session(answers: Vec<AnswerDetail>) -> Vec<SessionGroup> {
    let mut sessions: Vec<(String, Vec<AnswerDetail>)> = Vec::new();
    for detail in answers {
        let key = detail.answer.paper_session_id.clone().unwrap_or_default();
        match sessions.iter_mut().find(|(id, _)| *id == key) {
            Some((_, items)) => items.push(detail),
            None => sessions.push((key, vec![detail])),
        }
    }

    sessions
        .into_iter()
        .map(|(paper_session_id, mut items)| {
            items.sort_by_key(|d| (d.answer.started_at, d.answer.id));
            SessionGroup {
                paper_session_id,
                paper_id: items.iter().find_map(|d| d.answer.paper_id),
                total_seconds: items
                    .iter()
                    .map(|d| i64::from(d.answer.duration_seconds.unwrap_or(0)))
                    .sum(),
                answers: items.into_iter().map(AnswerResponse::from).collect(),
            }
        })
        .collect()
}

/// `GET /history/single`
pub async fn single_history(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<HistoryPage<DayGroup>>> {
    let (page, page_size) = query.resolve()?;
    let (answers, total) = state
        .repo()
        .list_answers(AnswerMode::Single, page, page_size)
        .await?;

    let groups = group_by_date(answers)
        .into_iter()
        .map(|(date, items)| DayGroup {
            date,
            items: items.into_iter().map(AnswerResponse::from).collect(),
        })
        .collect();

    Ok(Json(HistoryPage {
        groups,
        total,
        page,
        page_size,
    }))
}

/// `GET /history/paper`
pub async fn paper_history(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<HistoryPage<PaperDayGroup>>> {
    let (page, page_size) = query.resolve()?;
    let (answers, total) = state
        .repo()
        .list_answers(AnswerMode::Paper, page, page_size)
        .await?;

    let groups = group_by_date(answers)
        .into_iter()
        .map(|(date, items)| PaperDayGroup {
            date,
            sessions: group_by_session(items),
        })
        .collect();

    Ok(Json(HistoryPage {
        groups,
        total,
        page,
        page_size,
    }))
}

/// `GET /history/trends?mode=&days=`
pub async fn trends(
    State(state): State<AppState>,
    Query(query): Query<TrendsQuery>,
) -> Result<Json<TrendsResponse>> {
    let mode = match query.mode.as_deref() {
        None => AnswerMode::Single,
        Some(raw) => AnswerMode::parse(raw).ok_or_else(|| AppError::Validation {
            message: format!("mode must be 'single' or 'paper', got '{}'", raw),
            field: Some("mode".to_string()),
        })?,
    };

    let days = query.days.unwrap_or(DEFAULT_TREND_DAYS);
    if !(MIN_TREND_DAYS..=MAX_TREND_DAYS).contains(&days) {
        return Err(AppError::Validation {
            message: format!("days must be between {} and {}", MIN_TREND_DAYS, MAX_TREND_DAYS),
            field: Some("days".to_string()),
        });
    }

    let since = (Utc::now().date_naive() - chrono::Duration::days(days - 1))
        .format("%Y-%m-%d")
        .to_string();
    let points = state.repo().score_trends(mode, &since).await?;

    Ok(Json(TrendsResponse { mode, days, points }))
}
