//! API handlers module

pub mod answers;
pub mod health;
pub mod history;
pub mod imports;
pub mod models;
pub mod papers;
pub mod prompts;
pub mod questions;
pub mod speech;
pub mod streaming;

use axum::{extract::Multipart, http::StatusCode};
use mockview_common::errors::{AppError, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

/// `?page=&page_size=` with 1-based pages
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

impl PageQuery {
    /// Validated `(page, page_size)`
    pub fn resolve(&self) -> Result<(u64, u64)> {
        let page = self.page.unwrap_or(1);
        let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);

        if page == 0 {
            return Err(AppError::Validation {
                message: "page starts at 1".to_string(),
                field: Some("page".to_string()),
            });
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(AppError::Validation {
                message: format!("page_size must be between 1 and {}", MAX_PAGE_SIZE),
                field: Some("page_size".to_string()),
            });
        }
        Ok((page, page_size))
    }
}

/// One page of a listing
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

/// Plain acknowledgement body
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// A file taken from a multipart form
#[derive(Debug)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Read the first part named `field`; other parts are skipped.
/// A body over the upload limit (`limit` bytes) is reported as 413.
pub async fn read_upload(mut multipart: Multipart, field: &str, limit: usize) -> Result<Upload> {
    let invalid = |e: axum::extract::multipart::MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge { limit }
        } else {
            AppError::InvalidFormat {
                message: e.body_text(),
            }
        }
    };

    while let Some(part) = multipart.next_field().await.map_err(invalid)? {
        if part.name() != Some(field) {
            continue;
        }

        let file_name = part
            .file_name()
            .map(String::from)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| field.to_string());
        let bytes = part.bytes().await.map_err(invalid)?;

        return Ok(Upload {
            file_name,
            bytes: bytes.to_vec(),
        });
    }

    Err(AppError::MissingField {
        field: field.to_string(),
    })
}
