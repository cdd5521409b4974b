//! Upload routing by file extension

use crate::errors::IngestionError;
use crate::pdf::extract_text_from_pdf;
use crate::text::{decode_text, ensure_not_empty};

/// Accepted upload formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentType {
    Txt,
    Pdf,
}

impl DocumentType {
    /// Detect from the file name, case-insensitively
    pub fn from_file_name(file_name: &str) -> Result<Self, IngestionError> {
        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "txt" => Ok(DocumentType::Txt),
            "pdf" => Ok(DocumentType::Pdf),
            _ => Err(IngestionError::UnsupportedFileType { extension }),
        }
    }

    /// Value stored in `import_tasks.file_type`
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Txt => "txt",
            DocumentType::Pdf => "pdf",
        }
    }
}

/// Text pulled out of an upload
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedDocument {
    pub doc_type: DocumentType,
    pub text: String,
}

/// Decode or extract an uploaded file's text
pub fn extract_document(file_name: &str, bytes: &[u8]) -> Result<ExtractedDocument, IngestionError> {
    let doc_type = DocumentType::from_file_name(file_name)?;
    let text = match doc_type {
        DocumentType::Txt => decode_text(bytes),
        DocumentType::Pdf => extract_text_from_pdf(file_name, bytes)?,
    };
    ensure_not_empty(&text)?;

    Ok(ExtractedDocument { doc_type, text })
}
