//! PDF text extraction module
//!
//! Extracts text content from uploaded PDF bytes using lopdf.

use crate::errors::IngestionError;
use tracing::{debug, warn};

/// Extract the text of every page, in page order
pub fn extract_text_from_pdf(file_name: &str, bytes: &[u8]) -> Result<String, IngestionError> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| IngestionError::PdfParseError {
        file: file_name.to_string(),
        message: format!("Failed to load PDF: {}", e),
    })?;

    let pages = doc.get_pages();
    debug!(page_count = pages.len(), "Extracting text from PDF");

    let mut text = String::new();
    for page_num in pages.keys() {
        match doc.extract_text(&[*page_num]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(e) => {
                warn!(page = page_num, error = %e, "Failed to extract text from page, skipping");
            }
        }
    }

    let cleaned = clean_text(&text);
    if cleaned.is_empty() {
        return Err(IngestionError::PdfParseError {
            file: file_name.to_string(),
            message: "No text content extracted from PDF".to_string(),
        });
    }

    debug!(
        original_chars = text.chars().count(),
        cleaned_chars = cleaned.chars().count(),
        "Text extraction complete"
    );

    Ok(cleaned)
}

/// Collapse whitespace inside lines and drop empty lines. Line breaks are
/// kept so numbered questions stay apart.
fn clean_text(text: &str) -> String {
    text.replace('\u{FEFF}', "")
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text() {
        let input = "\u{FEFF}1. 题目   一\n\n\n  2.  题目二  \n";
        assert_eq!(clean_text(input), "1. 题目 一\n2. 题目二");
    }

    #[test]
    fn test_invalid_pdf_bytes() {
        let err = extract_text_from_pdf("broken.pdf", b"not a pdf").unwrap_err();
        assert!(matches!(err, IngestionError::PdfParseError { ref file, .. } if file == "broken.pdf"));
    }
}
