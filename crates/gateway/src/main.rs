//! Mockview API Gateway
//!
//! Process entry point: configuration, logging, metrics exporter, database
//! bootstrap, and the HTTP server with graceful shutdown.

use anyhow::Context;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use mockview_common::{
    config::{AppConfig, ObservabilityConfig},
    db::DbPool,
    llm::OpenAiChatFactory,
    metrics,
};
use mockview_gateway::{create_router, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("failed to load configuration")?;
    let config = Arc::new(config);

    init_tracing(&config.observability);
    info!("Starting Mockview API Gateway v{}", mockview_common::VERSION);

    // Initialize metrics
    if config.observability.metrics_port != 0 {
        install_prometheus(config.observability.metrics_port)?;
    }
    metrics::register_metrics();

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::bootstrap(&config.database, config.import.default_max_chars).await?;

    // Create app state
    let llm = Arc::new(OpenAiChatFactory::new(Duration::from_secs(config.llm.timeout_secs)));
    let state = AppState::new(config.clone(), db, llm)?;
    let jobs = state.jobs.clone();

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.server.host, config.server.port))?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let background analyses and imports finish
    let pending = jobs.in_flight();
    if pending > 0 {
        info!(pending, "Waiting for background jobs");
        if tokio::time::timeout(config.shutdown_timeout(), jobs.wait_idle())
            .await
            .is_err()
        {
            warn!(remaining = jobs.in_flight(), "Shutdown timeout reached with jobs still running");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// `RUST_LOG` wins over the configured level
fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn install_prometheus(port: u16) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .set_buckets_for_metric(
            Matcher::Suffix("request_duration_seconds".to_string()),
            metrics::LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Suffix("analysis_duration_seconds".to_string()),
            metrics::LLM_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Suffix("import_duration_seconds".to_string()),
            metrics::LLM_BUCKETS,
        )?
        .install()
        .context("failed to install Prometheus exporter")?;

    info!(port, "Prometheus exporter listening");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
