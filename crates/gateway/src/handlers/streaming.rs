//! Server-sent event relays for streamed analyses
//!
//! Provider fragments are forwarded as `token` events. A finished answer
//! analysis is stored and announced with `done`; provider failures become an
//! `error` event. If the client goes away first, whatever text it had
//! already received is handed to a background save.

use axum::{
    extract::{Path, State},
    http::{header, HeaderName, HeaderValue},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use futures::{Stream, StreamExt};
use mockview_common::{
    analysis::SavePartialAnalysisJob,
    errors::{AppError, Result},
    jobs::JobRunner,
    locks::KeyPermit,
    metrics,
};
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;

use crate::AppState;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

fn token_event(content: &str) -> Event {
    Event::default()
        .event("token")
        .data(json!({ "content": content }).to_string())
}

fn done_event(score: Option<f64>, full_content: &str) -> Event {
    Event::default()
        .event("done")
        .data(json!({ "score": score, "full_content": full_content }).to_string())
}

fn paper_done_event(full_content: &str) -> Event {
    Event::default()
        .event("done")
        .data(json!({ "full_content": full_content }).to_string())
}

fn error_event(error: &AppError) -> Event {
    Event::default()
        .event("error")
        .data(json!({ "message": error.public_message() }).to_string())
}

/// Wrap an event stream with keep-alives and the no-buffering headers
fn sse_response<S>(stream: S) -> Response
where
    S: Stream<Item = std::result::Result<Event, Infallible>> + Send + 'static,
{
    let sse = Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL));

    (
        [
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
            (
                HeaderName::from_static("x-accel-buffering"),
                HeaderValue::from_static("no"),
            ),
        ],
        sse,
    )
        .into_response()
}

/// Text relayed for one answer, plus the answer's permit.
///
/// Dropped before `settle` means the client disconnected: non-empty text is
/// submitted as a partial save. The permit is released after that. A relay
/// stays unsettled until the final store returns, so a disconnect while the
/// store is in flight still hands the full text to a background save.
struct PartialRelay {
    answer_id: i32,
    model_name: String,
    text: String,
    settled: bool,
    jobs: JobRunner,
    _permit: KeyPermit<i32>,
}

impl PartialRelay {
    fn new(answer_id: i32, model_name: String, jobs: JobRunner, permit: KeyPermit<i32>) -> Self {
        Self {
            answer_id,
            model_name,
            text: String::new(),
            settled: false,
            jobs,
            _permit: permit,
        }
    }

    fn push(&mut self, fragment: &str) {
        self.text.push_str(fragment);
    }

    fn text(&self) -> &str {
        &self.text
    }

    /// The stream reached an end of its own; nothing to salvage
    fn settle(&mut self) -> String {
        self.settled = true;
        std::mem::take(&mut self.text)
    }
}

impl Drop for PartialRelay {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if self.text.is_empty() {
            tracing::info!(answer_id = self.answer_id, "Client left before any analysis text");
            return;
        }

        tracing::info!(
            answer_id = self.answer_id,
            chars = self.text.chars().count(),
            "Client disconnected mid-stream, saving partial analysis"
        );
        self.jobs.submit(SavePartialAnalysisJob {
            answer_id: self.answer_id,
            text: std::mem::take(&mut self.text),
            model_name: std::mem::take(&mut self.model_name),
        });
    }
}

/// `GET /answers/{id}/analysis/stream`
pub async fn stream_answer_analysis(
    State(state): State<AppState>,
    Path(answer_id): Path<i32>,
) -> Result<Response> {
    let service = state.analysis();
    let detail = service.answer_detail(answer_id).await?;

    if let Some(existing) = detail.analysis {
        let event = done_event(existing.score, existing.feedback.as_deref().unwrap_or(""));
        let stream = futures::stream::once(async move { Ok::<_, Infallible>(event) });
        return Ok(sse_response(stream));
    }

    let permit = state
        .answer_locks
        .try_acquire(answer_id)
        .ok_or_else(|| AppError::AnalysisInProgress {
            key: format!("answer {}", answer_id),
        })?;

    let call = service.prepare_answer(&detail).await?;
    let model_name = call.model_name().to_string();
    let mut chunks = call.stream().await?;

    tracing::info!(answer_id, model = %model_name, "Streaming analysis started");

    let mut relay = PartialRelay::new(answer_id, model_name.clone(), state.jobs.clone(), permit);
    let answer = detail.answer;

    let stream = async_stream::stream! {
        while let Some(item) = chunks.next().await {
            match item {
                Ok(fragment) => {
                    relay.push(&fragment);
                    metrics::record_stream_chunk();
                    yield Ok::<_, Infallible>(token_event(&fragment));
                }
                Err(e) => {
                    tracing::warn!(answer_id, error = %e, "Analysis stream failed");
                    relay.settle();
                    yield Ok(error_event(&e));
                    return;
                }
            }
        }

        let full = relay.text().to_string();
        let stored = service.store(&answer, full.clone(), model_name).await;
        relay.settle();
        match stored {
            Ok(stored) => {
                yield Ok(done_event(stored.score, &full));
            }
            Err(e) => {
                tracing::warn!(answer_id, error = %e, "Failed to store streamed analysis");
                yield Ok(error_event(&e));
            }
        }
    };

    Ok(sse_response(stream))
}

/// `GET /answers/paper-analyze/stream/{session_id}`; nothing is stored
pub async fn stream_paper_analysis(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response> {
    let permit = state
        .session_locks
        .try_acquire(session_id.clone())
        .ok_or_else(|| AppError::AnalysisInProgress {
            key: format!("paper session {}", session_id),
        })?;

    let call = state.analysis().prepare_paper(&session_id).await?;
    let mut chunks = call.stream().await?;

    tracing::info!(paper_session_id = %session_id, "Streaming paper analysis started");

    let stream = async_stream::stream! {
        let _permit = permit;
        let mut full = String::new();

        while let Some(item) = chunks.next().await {
            match item {
                Ok(fragment) => {
                    full.push_str(&fragment);
                    metrics::record_stream_chunk();
                    yield Ok::<_, Infallible>(token_event(&fragment));
                }
                Err(e) => {
                    tracing::warn!(paper_session_id = %session_id, error = %e, "Paper stream failed");
                    yield Ok(error_event(&e));
                    return;
                }
            }
        }

        yield Ok(paper_done_event(&full));
    };

    Ok(sse_response(stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockview_common::config::AppConfig;
    use mockview_common::db::DbPool;
    use mockview_common::llm::{Script, ScriptedChatFactory};
    use mockview_common::locks::KeyedLocks;
    use std::sync::Arc;

    async fn runner() -> JobRunner {
        let config = Arc::new(AppConfig::for_tests());
        let pool = DbPool::bootstrap(&config.database, config.import.default_max_chars)
            .await
            .unwrap();
        JobRunner::new(pool, Arc::new(ScriptedChatFactory::new(Script::default())), config)
    }

    #[tokio::test]
    async fn test_settled_relay_releases_permit_without_saving() {
        let jobs = runner().await;
        let locks = KeyedLocks::new();
        let permit = locks.try_acquire(7).unwrap();

        let mut relay = PartialRelay::new(7, "m".into(), jobs.clone(), permit);
        relay.push("总体评分：");
        assert_eq!(relay.settle(), "总体评分：");
        drop(relay);

        assert!(!locks.is_locked(&7));
        assert_eq!(jobs.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_empty_relay_drop_submits_nothing() {
        let jobs = runner().await;
        let locks = KeyedLocks::new();
        let relay = PartialRelay::new(8, "m".into(), jobs.clone(), locks.try_acquire(8).unwrap());
        drop(relay);

        assert!(!locks.is_locked(&8));
        assert_eq!(jobs.in_flight(), 0);
    }
}
