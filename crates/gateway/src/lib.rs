//! Mockview API Gateway
//!
//! HTTP surface of the interview practice backend:
//! - Question bank, papers and answers
//! - Buffered and streamed AI analysis
//! - Document import, model/prompt/speech settings
//! - Rate limiting, request ids, metrics

pub mod handlers;
pub mod middleware;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Router,
};
use mockview_common::{
    analysis::AnalysisService,
    config::AppConfig,
    db::DbPool,
    errors::Result,
    jobs::JobRunner,
    llm::ChatClientFactory,
    locks::KeyedLocks,
    speech::SpeechClient,
    Repository,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::middleware::metrics::track_metrics;
use crate::middleware::rate_limit::{create_rate_limiter, rate_limit_middleware, GlobalRateLimiter};
use crate::middleware::timeout::request_timeout;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
    pub jobs: JobRunner,
    pub llm: Arc<dyn ChatClientFactory>,
    /// Held while an answer is being analyzed
    pub answer_locks: KeyedLocks<i32>,
    /// Held while a paper session is being streamed
    pub session_locks: KeyedLocks<String>,
    pub speech: SpeechClient,
    pub rate_limiter: Option<Arc<GlobalRateLimiter>>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, db: DbPool, llm: Arc<dyn ChatClientFactory>) -> Result<Self> {
        let jobs = JobRunner::new(db.clone(), llm.clone(), config.clone());
        let speech = SpeechClient::new(Duration::from_secs(config.speech.timeout_secs))?;

        let rate_limiter = if config.rate_limit.enabled {
            create_rate_limiter(config.rate_limit.requests_per_second, config.rate_limit.burst)
        } else {
            None
        };

        Ok(Self {
            config,
            db,
            jobs,
            llm,
            answer_locks: KeyedLocks::new(),
            session_locks: KeyedLocks::new(),
            speech,
            rate_limiter,
        })
    }

    pub fn repo(&self) -> Repository {
        Repository::new(self.db.clone())
    }

    pub fn analysis(&self) -> AnalysisService {
        AnalysisService::new(self.repo(), self.llm.clone(), self.config.llm.clone())
    }
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    use handlers::{answers, history, imports, models, papers, prompts, questions, speech, streaming};

    let cors = cors_layer(&state.config.server.cors_origins);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // Routes bounded by the request timeout
    let bounded = Router::new()
        // Question bank
        .route("/questions", get(questions::list_questions).post(questions::create_question))
        .route("/questions/batch-delete", post(questions::batch_delete))
        .route("/questions/random/single", get(questions::random_question))
        .route(
            "/questions/{id}",
            get(questions::get_question)
                .put(questions::update_question)
                .delete(questions::delete_question),
        )
        // Papers
        .route("/papers", get(papers::list_papers).post(papers::create_paper))
        .route(
            "/papers/{id}",
            get(papers::get_paper)
                .put(papers::update_paper)
                .delete(papers::delete_paper),
        )
        .route("/papers/{id}/items", post(papers::add_item))
        .route("/papers/{id}/items/{item_id}", axum::routing::delete(papers::remove_item))
        // Answers
        .route("/answers", post(answers::create_answer))
        .route("/answers/{id}", get(answers::get_answer))
        .route("/answers/{id}/analyze", post(answers::analyze_answer))
        .route("/answers/{id}/analysis", get(answers::get_analysis))
        // History
        .route("/history/single", get(history::single_history))
        .route("/history/paper", get(history::paper_history))
        .route("/history/trends", get(history::trends))
        // Model configs
        .route("/models", get(models::list_models).post(models::create_model))
        .route("/models/{id}", put(models::update_model).delete(models::delete_model))
        .route("/models/{id}/activate", post(models::activate_model))
        // Prompts
        .route("/prompts", get(prompts::list_prompts))
        .route("/prompts/{id}", get(prompts::get_prompt).put(prompts::update_prompt))
        // Speech settings
        .route("/speech/config", get(speech::get_config).put(speech::update_config))
        // Import
        .route("/import/single", post(imports::import_single))
        .route("/import/paper", post(imports::import_paper))
        .route("/import/text", post(imports::import_text))
        .route("/import/status/{id}", get(imports::import_status))
        .route("/import/history", get(imports::import_history))
        .route("/import/settings", get(imports::get_settings).put(imports::update_settings))
        .route_layer(from_fn_with_state(state.clone(), request_timeout));

    // Routes that wait on a model or speech provider
    let provider_bound = Router::new()
        .route("/answers/{id}/analysis/stream", get(streaming::stream_answer_analysis))
        .route("/answers/history-analyze", post(answers::history_analyze))
        .route("/answers/paper-analyze", post(answers::paper_analyze))
        .route(
            "/answers/paper-analyze/stream/{session_id}",
            get(streaming::stream_paper_analysis),
        )
        .route("/models/fetch-models", post(models::fetch_models))
        .route("/speech/transcribe", post(speech::transcribe));

    let api_routes = bounded
        .merge(provider_bound)
        .route_layer(from_fn(track_metrics))
        .layer(from_fn_with_state(state.clone(), rate_limit_middleware));

    // Compose the app
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/api/v1", api_routes)
        .layer(DefaultBodyLimit::max(state.config.server.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Any origin when none are configured, otherwise the configured list
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if parsed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(parsed)
    }
}
