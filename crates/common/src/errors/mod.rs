//! Error types for Mockview services
//!
//! Provides a single error enum with:
//! - HTTP status code mapping
//! - Machine-readable error codes
//! - Structured JSON error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    MissingField,
    InvalidFormat,
    PayloadTooLarge,
    UnsupportedFileType,

    // Resource errors (4xxx)
    NotFound,
    QuestionNotFound,
    PaperNotFound,
    AnswerNotFound,
    AnalysisNotFound,
    ImportTaskNotFound,
    ModelNotFound,
    PromptNotFound,

    // Conflict errors (5xxx)
    AlreadyAnalyzed,
    AnalysisInProgress,

    // Rate limiting (6xxx)
    RateLimited,

    // Database errors (7xxx)
    DatabaseError,
    ConnectionError,

    // Upstream model errors (8xxx)
    NoActiveModel,
    PromptNotConfigured,
    SpeechNotConfigured,
    UpstreamError,
    UpstreamTimeout,

    // Internal errors (9xxx)
    InternalError,

    // Service unavailable
    ServiceUnavailable,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,
            ErrorCode::MissingField => 1002,
            ErrorCode::InvalidFormat => 1003,
            ErrorCode::PayloadTooLarge => 1004,
            ErrorCode::UnsupportedFileType => 1005,

            ErrorCode::NotFound => 4001,
            ErrorCode::QuestionNotFound => 4002,
            ErrorCode::PaperNotFound => 4003,
            ErrorCode::AnswerNotFound => 4004,
            ErrorCode::AnalysisNotFound => 4005,
            ErrorCode::ImportTaskNotFound => 4006,
            ErrorCode::ModelNotFound => 4007,
            ErrorCode::PromptNotFound => 4008,

            ErrorCode::AlreadyAnalyzed => 5002,
            ErrorCode::AnalysisInProgress => 5003,

            ErrorCode::RateLimited => 6001,

            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,

            ErrorCode::NoActiveModel => 8001,
            ErrorCode::PromptNotConfigured => 8002,
            ErrorCode::SpeechNotConfigured => 8003,
            ErrorCode::UpstreamError => 8004,
            ErrorCode::UpstreamTimeout => 8005,

            ErrorCode::InternalError => 9001,

            ErrorCode::ServiceUnavailable => 9999,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Required field missing: {field}")]
    MissingField { field: String },

    #[error("Invalid format: {message}")]
    InvalidFormat { message: String },

    #[error("Payload too large: upload exceeds the limit of {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Unsupported file type: {extension}")]
    UnsupportedFileType { extension: String },

    // Resource errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    #[error("Question not found: {id}")]
    QuestionNotFound { id: i32 },

    #[error("Paper not found: {id}")]
    PaperNotFound { id: i32 },

    #[error("Answer not found: {id}")]
    AnswerNotFound { id: i32 },

    #[error("No analysis stored for answer {answer_id}")]
    AnalysisNotFound { answer_id: i32 },

    #[error("Import task not found: {id}")]
    ImportTaskNotFound { id: i32 },

    #[error("Model config not found: {id}")]
    ModelNotFound { id: i32 },

    #[error("Prompt not found: {id}")]
    PromptNotFound { id: i32 },

    // Conflict errors
    #[error("Answer {answer_id} has already been analyzed")]
    AlreadyAnalyzed { answer_id: i32 },

    #[error("Analysis already in progress for {key}")]
    AnalysisInProgress { key: String },

    // Rate limiting
    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // Model provider errors
    #[error("No active model configured for role '{role}'")]
    NoActiveModel { role: String },

    #[error("Prompt template '{prompt_type}' is not configured")]
    PromptNotConfigured { prompt_type: String },

    #[error("Speech recognition is not configured: {message}")]
    SpeechNotConfigured { message: String },

    #[error("AI service error: {message}")]
    Upstream { message: String },

    #[error("AI service timed out, please retry later")]
    UpstreamTimeout,

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::MissingField { .. } => ErrorCode::MissingField,
            AppError::InvalidFormat { .. } => ErrorCode::InvalidFormat,
            AppError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            AppError::UnsupportedFileType { .. } => ErrorCode::UnsupportedFileType,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::QuestionNotFound { .. } => ErrorCode::QuestionNotFound,
            AppError::PaperNotFound { .. } => ErrorCode::PaperNotFound,
            AppError::AnswerNotFound { .. } => ErrorCode::AnswerNotFound,
            AppError::AnalysisNotFound { .. } => ErrorCode::AnalysisNotFound,
            AppError::ImportTaskNotFound { .. } => ErrorCode::ImportTaskNotFound,
            AppError::ModelNotFound { .. } => ErrorCode::ModelNotFound,
            AppError::PromptNotFound { .. } => ErrorCode::PromptNotFound,
            AppError::AlreadyAnalyzed { .. } => ErrorCode::AlreadyAnalyzed,
            AppError::AnalysisInProgress { .. } => ErrorCode::AnalysisInProgress,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::NoActiveModel { .. } => ErrorCode::NoActiveModel,
            AppError::PromptNotConfigured { .. } => ErrorCode::PromptNotConfigured,
            AppError::SpeechNotConfigured { .. } => ErrorCode::SpeechNotConfigured,
            AppError::Upstream { .. } => ErrorCode::UpstreamError,
            AppError::UpstreamTimeout => ErrorCode::UpstreamTimeout,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::ServiceUnavailable { .. } => ErrorCode::ServiceUnavailable,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. }
            | AppError::MissingField { .. }
            | AppError::InvalidFormat { .. }
            | AppError::UnsupportedFileType { .. }
            | AppError::NoActiveModel { .. }
            | AppError::PromptNotConfigured { .. }
            | AppError::SpeechNotConfigured { .. } => StatusCode::BAD_REQUEST,

            // 404 Not Found
            AppError::NotFound { .. }
            | AppError::QuestionNotFound { .. }
            | AppError::PaperNotFound { .. }
            | AppError::AnswerNotFound { .. }
            | AppError::AnalysisNotFound { .. }
            | AppError::ImportTaskNotFound { .. }
            | AppError::ModelNotFound { .. }
            | AppError::PromptNotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::AlreadyAnalyzed { .. }
            | AppError::AnalysisInProgress { .. } => StatusCode::CONFLICT,

            // 413 Payload Too Large
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::Database(_)
            | AppError::DatabaseConnection { .. }
            | AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::Upstream { .. } => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            AppError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,

            // 504 Gateway Timeout
            AppError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Message safe to show to an end user in a response body or stream.
    /// Driver and provider detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Database(_) | AppError::DatabaseConnection { .. } => {
                "Failed to save the result, please retry".to_string()
            }
            AppError::Upstream { .. } => "AI service request failed, please retry later".to_string(),
            AppError::Internal { .. } => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

/// Convert reqwest failures from model or speech providers into upstream errors
impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::UpstreamTimeout
        } else if err.is_connect() {
            AppError::Upstream {
                message: "connection to AI service failed".to_string(),
            }
        } else {
            AppError::Upstream {
                message: err.without_url().to_string(),
            }
        }
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let detail = self.to_string();

        if self.is_server_error() {
            tracing::error!(
                error = %detail,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %detail,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let field = match &self {
            AppError::Validation { field, .. } => field.clone(),
            AppError::MissingField { field } => Some(field.clone()),
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message: self.public_message(),
                field,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        let field = err.field_errors().keys().next().map(|f| f.to_string());
        AppError::Validation {
            message: err.to_string(),
            field,
        }
    }
}
