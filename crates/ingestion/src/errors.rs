//! Ingestion error types

use mockview_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Unsupported file type: {extension}")]
    UnsupportedFileType { extension: String },

    #[error("Document contains no text")]
    EmptyDocument,

    #[error("PDF parse error for {file}: {message}")]
    PdfParseError { file: String, message: String },

    #[error("Model returned malformed JSON: {0}")]
    MalformedResponse(String),

    #[error(transparent)]
    App(#[from] AppError),
}

/// Request-path failures become client errors; wrapped application errors pass through
impl From<IngestionError> for AppError {
    fn from(err: IngestionError) -> Self {
        match err {
            IngestionError::UnsupportedFileType { extension } => AppError::UnsupportedFileType { extension },
            IngestionError::EmptyDocument => AppError::Validation {
                message: "document contains no text".to_string(),
                field: Some("file".to_string()),
            },
            IngestionError::PdfParseError { message, .. } => AppError::Validation {
                message: format!("could not read PDF: {}", message),
                field: Some("file".to_string()),
            },
            IngestionError::MalformedResponse(message) => AppError::Upstream { message },
            IngestionError::App(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockview_common::errors::ErrorCode;

    #[test]
    fn test_request_errors_are_client_errors() {
        let err: AppError = IngestionError::UnsupportedFileType { extension: "docx".into() }.into();
        assert!(err.is_client_error());
        assert_eq!(err.code(), ErrorCode::UnsupportedFileType);

        let err: AppError = IngestionError::EmptyDocument.into();
        assert!(err.is_client_error());
    }

    #[test]
    fn test_app_errors_pass_through() {
        let err: AppError = IngestionError::App(AppError::NoActiveModel { role: "import".into() }).into();
        assert!(matches!(err, AppError::NoActiveModel { .. }));
    }
}
