//! Request deadline for routes that never wait on a model provider

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use mockview_common::errors::{AppError, Result};

use crate::AppState;

pub async fn request_timeout(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response> {
    let limit = state.config.request_timeout();
    let path = request.uri().path().to_owned();

    tokio::time::timeout(limit, next.run(request))
        .await
        .map_err(|_| {
            tracing::warn!(path = %path, timeout_secs = limit.as_secs(), "Request timed out");
            AppError::ServiceUnavailable {
                message: format!("request exceeded {}s", limit.as_secs()),
            }
        })
}
