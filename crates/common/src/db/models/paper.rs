//! Paper entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Title given to imported papers whose document names none
pub const DEFAULT_IMPORTED_TITLE: &str = "导入套卷";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "papers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    /// Overall time allowance for one attempt
    pub time_limit_seconds: Option<i32>,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::paper_item::Entity")]
    Items,

    #[sea_orm(has_many = "super::answer::Entity")]
    Answers,
}

impl Related<super::paper_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl Related<super::answer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Answers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
