//! Editable prompt templates

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Every template the application knows how to fill
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    SingleAnalyze,
    HistorySingleAnalyze,
    PaperAnalyze,
    HistoryPaperAnalyze,
    ImportSingle,
    ImportPaper,
}

impl PromptKind {
    pub const ALL: [PromptKind; 6] = [
        PromptKind::SingleAnalyze,
        PromptKind::HistorySingleAnalyze,
        PromptKind::PaperAnalyze,
        PromptKind::HistoryPaperAnalyze,
        PromptKind::ImportSingle,
        PromptKind::ImportPaper,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PromptKind::SingleAnalyze => "single_analyze",
            PromptKind::HistorySingleAnalyze => "history_single_analyze",
            PromptKind::PaperAnalyze => "paper_analyze",
            PromptKind::HistoryPaperAnalyze => "history_paper_analyze",
            PromptKind::ImportSingle => "import_single",
            PromptKind::ImportPaper => "import_paper",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "prompts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(column_type = "Text", unique)]
    pub prompt_type: String,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    /// Template body with `{placeholder}` markers
    #[sea_orm(column_type = "Text")]
    pub content: String,

    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
