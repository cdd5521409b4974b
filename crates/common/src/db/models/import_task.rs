//! Import task entity for async document ingestion

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Import task status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Pending => "pending",
            ImportStatus::Running => "running",
            ImportStatus::Success => "success",
            ImportStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportStatus::Success | ImportStatus::Failed)
    }

    /// Allowed moves: pending -> running -> success | failed.
    /// A pending task may also fail directly.
    pub fn can_transition_to(&self, next: ImportStatus) -> bool {
        matches!(
            (self, next),
            (ImportStatus::Pending, ImportStatus::Running)
                | (ImportStatus::Pending, ImportStatus::Failed)
                | (ImportStatus::Running, ImportStatus::Success)
                | (ImportStatus::Running, ImportStatus::Failed)
        )
    }
}

impl From<&str> for ImportStatus {
    fn from(s: &str) -> Self {
        match s {
            "running" => ImportStatus::Running,
            "success" => ImportStatus::Success,
            "failed" => ImportStatus::Failed,
            _ => ImportStatus::Pending,
        }
    }
}

/// What the document is expected to contain
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportKind {
    Single,
    Paper,
}

impl ImportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportKind::Single => "single",
            ImportKind::Paper => "paper",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "single" => Some(ImportKind::Single),
            "paper" => Some(ImportKind::Paper),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "import_tasks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(column_type = "Text")]
    pub file_name: String,

    /// `txt`, `pdf` or `text`
    #[sea_orm(column_type = "Text")]
    pub file_type: String,

    #[sea_orm(column_type = "Text")]
    pub import_type: String,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    #[serde(skip_serializing)]
    #[sea_orm(column_type = "Text", nullable)]
    pub raw_text: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub result_summary: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,
}

impl Model {
    pub fn import_status(&self) -> ImportStatus {
        ImportStatus::from(self.status.as_str())
    }

    pub fn is_terminal(&self) -> bool {
        self.import_status().is_terminal()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        use ImportStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Running.can_transition_to(Success));
        assert!(Running.can_transition_to(Failed));
        assert!(!Success.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Success));
        assert!(!Pending.can_transition_to(Success));
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [ImportStatus::Pending, ImportStatus::Running, ImportStatus::Success, ImportStatus::Failed] {
            assert_eq!(ImportStatus::from(status.as_str()), status);
        }
        assert!(ImportStatus::Failed.is_terminal());
        assert!(!ImportStatus::Running.is_terminal());
    }
}
