//! Answer entity: one recorded attempt at one question

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Practice mode of an answer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMode {
    Single,
    Paper,
}

impl AnswerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerMode::Single => "single",
            AnswerMode::Paper => "paper",
        }
    }

    /// Parse a client-supplied mode; anything else is rejected
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "single" => Some(AnswerMode::Single),
            "paper" => Some(AnswerMode::Paper),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "answers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(column_type = "Text")]
    pub mode: String,

    pub question_id: i32,

    pub paper_id: Option<i32>,

    /// Client-generated id grouping all answers of one paper attempt
    #[sea_orm(column_type = "Text", nullable)]
    pub paper_session_id: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub transcript: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub audio_url: Option<String>,

    pub duration_seconds: Option<i32>,

    pub started_at: DateTimeUtc,

    pub finished_at: Option<DateTimeUtc>,

    /// `YYYY-MM-DD` of `started_at`
    #[sea_orm(column_type = "Text")]
    pub practice_date: String,

    pub created_at: DateTimeUtc,
}

impl Model {
    pub fn answer_mode(&self) -> Option<AnswerMode> {
        AnswerMode::parse(&self.mode)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::question::Entity",
        from = "Column::QuestionId",
        to = "super::question::Column::Id"
    )]
    Question,

    #[sea_orm(
        belongs_to = "super::paper::Entity",
        from = "Column::PaperId",
        to = "super::paper::Column::Id",
        on_delete = "SetNull"
    )]
    Paper,

    #[sea_orm(has_one = "super::analysis_result::Entity")]
    Analysis,
}

impl Related<super::question::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Question.def()
    }
}

impl Related<super::paper::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Paper.def()
    }
}

impl Related<super::analysis_result::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Analysis.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!(AnswerMode::parse("single"), Some(AnswerMode::Single));
        assert_eq!(AnswerMode::parse("paper"), Some(AnswerMode::Paper));
        assert_eq!(AnswerMode::parse("Paper"), None);
        assert_eq!(AnswerMode::Paper.as_str(), "paper");
    }
}
