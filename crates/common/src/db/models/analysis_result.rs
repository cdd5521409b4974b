//! Stored AI feedback for an answer

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

pub const ANALYSIS_TYPE_SINGLE: &str = "single";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "analysis_results")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// At most one result per answer
    #[sea_orm(unique)]
    pub answer_id: i32,

    #[sea_orm(column_type = "Text", nullable)]
    pub paper_session_id: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub analysis_type: String,

    pub score: Option<f64>,

    #[sea_orm(column_type = "Text", nullable)]
    pub score_details: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub feedback: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub model_answer: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub model_name: String,

    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::answer::Entity",
        from = "Column::AnswerId",
        to = "super::answer::Column::Id",
        on_delete = "Cascade"
    )]
    Answer,
}

impl Related<super::answer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Answer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
