//! Speech-to-text provider settings (singleton row)

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

pub const PROVIDER_WEB_SPEECH: &str = "web_speech";
pub const PROVIDER_WHISPER: &str = "whisper";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "speech_configs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(column_type = "Text")]
    pub provider: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub whisper_api_url: Option<String>,

    #[serde(skip_serializing)]
    #[sea_orm(column_type = "Text", nullable)]
    pub whisper_api_key: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub whisper_model: String,

    pub is_active: bool,

    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
