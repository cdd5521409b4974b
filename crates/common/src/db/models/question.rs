//! Question entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Where a question came from
pub const SOURCE_MANUAL: &str = "manual";
pub const SOURCE_IMPORT: &str = "import";

/// Category used when an imported question carries none
pub const DEFAULT_CATEGORY: &str = "未分类";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "questions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(column_type = "Text")]
    pub category: String,

    #[sea_orm(column_type = "Text")]
    pub content: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub analysis: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub reference_answer: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub image_url: Option<String>,

    /// Comma-separated free-form tags
    #[sea_orm(column_type = "Text", nullable)]
    pub tags: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub source: Option<String>,

    pub is_deleted: bool,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::paper_item::Entity")]
    PaperItems,

    #[sea_orm(has_many = "super::answer::Entity")]
    Answers,
}

impl Related<super::paper_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PaperItems.def()
    }
}

impl Related<super::answer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Answers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
