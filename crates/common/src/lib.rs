//! Mockview Common Library
//!
//! Shared code for the Mockview gateway and ingestion crates including:
//! - Database models, schema bootstrap and repository
//! - Chat completion and speech clients
//! - Analysis orchestration and background jobs
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod analysis;
pub mod config;
pub mod db;
pub mod errors;
pub mod jobs;
pub mod llm;
pub mod locks;
pub mod metrics;
pub mod speech;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{DbPool, Repository};
pub use errors::{AppError, Result};
pub use jobs::{Job, JobContext, JobRunner};
pub use llm::{ChatClient, ChatClientFactory};
pub use locks::{KeyPermit, KeyedLocks};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
