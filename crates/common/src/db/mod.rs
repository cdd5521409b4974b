//! Database layer for Mockview
//!
//! Provides:
//! - SeaORM entity models
//! - Repository pattern for data access
//! - Connection pool management
//! - Schema bootstrap and default data

pub mod models;
mod repository;
mod schema;
mod seed;

pub use repository::{
    AnswerDetail, ImportedQuestion, ModelConfigInput, NewAnswer, NewQuestion, PaperDetail,
    PaperItemDetail, QuestionFilter, QuestionPatch, Repository, TrendPoint,
};
pub use schema::ensure_schema;
pub use seed::{seed_defaults, DEFAULT_PROMPTS};

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use std::time::Duration;
use tracing::info;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    conn: DatabaseConnection,
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!(url = %redact_url(&config.url), "Connecting to database...");

        let in_memory = config.url.contains(":memory:");

        let mut opts = ConnectOptions::new(&config.url);
        opts.connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .sqlx_logging(config.sqlx_logging);

        if in_memory {
            // Every connection to `:memory:` is its own database
            opts.max_connections(1).min_connections(1);
        } else {
            opts.max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .idle_timeout(Duration::from_secs(config.idle_timeout_secs));
        }

        let conn = Database::connect(opts)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Failed to connect: {}", e),
            })?;

        info!("Database connection established");

        Ok(Self { conn })
    }

    /// Connect, create missing tables and insert default rows
    pub async fn bootstrap(config: &DatabaseConfig, default_max_import_chars: usize) -> Result<Self> {
        let pool = Self::new(config).await?;
        ensure_schema(pool.connection()).await?;
        seed_defaults(pool.connection(), default_max_import_chars).await?;
        Ok(pool)
    }

    /// Wrap an existing connection
    pub fn from_connection(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Get the underlying connection
    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        self.conn
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Ping failed: {}", e),
            })?;

        Ok(())
    }
}

/// Strip credentials from a connection URL before logging it
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}
