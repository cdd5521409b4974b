//! Mockview Ingestion
//!
//! Turns uploaded documents into question bank entries:
//! 1. Decodes `.txt` / extracts `.pdf` text
//! 2. Creates the import task and schedules an `ImportJob`
//! 3. Truncates to the character budget and asks the import model for JSON
//! 4. Stores questions or a paper and records the outcome on the task

pub mod document;
pub mod errors;
pub mod parser;
pub mod pdf;
pub mod processor;
pub mod text;

pub use document::{extract_document, DocumentType, ExtractedDocument};
pub use errors::IngestionError;
pub use processor::{max_import_chars, start_import, ImportJob};
