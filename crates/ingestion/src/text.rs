//! Plain-text decoding and character budgeting

use crate::errors::IngestionError;
use encoding_rs::GBK;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Decode an uploaded text file: UTF-8 (with or without BOM), then GBK
/// (a superset of GB2312), then Latin-1, which never fails.
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }
    if let Some(text) = GBK.decode_without_bom_handling_and_without_replacement(bytes) {
        return text.into_owned();
    }
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Reject documents with nothing but whitespace
pub fn ensure_not_empty(text: &str) -> Result<(), IngestionError> {
    if text.trim().is_empty() {
        Err(IngestionError::EmptyDocument)
    } else {
        Ok(())
    }
}

/// Keep at most `max_chars` characters; reports whether anything was cut
pub fn truncate_chars(text: &str, max_chars: usize) -> (&str, bool) {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => (&text[..byte_idx], true),
        None => (text, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_utf8_with_bom() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice("面试题".as_bytes());
        assert_eq!(decode_text(&bytes), "面试题");
    }

    #[test]
    fn test_decode_gbk() {
        // "面试题" encoded as GBK
        let bytes = [0xC3, 0xE6, 0xCA, 0xD4, 0xCC, 0xE2];
        assert_eq!(decode_text(&bytes), "面试题");
    }

    #[test]
    fn test_decode_falls_back_to_latin1() {
        // 0xE9 alone is invalid UTF-8
        assert_eq!(decode_text(&[b'c', b'a', b'f', 0xE9]), "café");
    }

    #[test]
    fn test_truncate_counts_characters() {
        let text = "一二三四五";
        assert_eq!(truncate_chars(text, 3), ("一二三", true));
        assert_eq!(truncate_chars(text, 5), ("一二三四五", false));
        assert_eq!(truncate_chars(text, 10), ("一二三四五", false));
    }

    #[test]
    fn test_empty_document() {
        assert!(ensure_not_empty(" \n\t").is_err());
        assert!(ensure_not_empty("题").is_ok());
    }
}
