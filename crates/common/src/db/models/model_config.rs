//! LLM endpoint credentials, one active per role

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// What a model config is used for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelRole {
    Analyze,
    Import,
}

impl ModelRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelRole::Analyze => "analyze",
            ModelRole::Import => "import",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "analyze" => Some(ModelRole::Analyze),
            "import" => Some(ModelRole::Import),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "model_configs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(column_type = "Text")]
    pub name: String,

    #[sea_orm(column_type = "Text")]
    pub base_url: String,

    #[serde(skip_serializing)]
    #[sea_orm(column_type = "Text")]
    pub api_key: String,

    #[sea_orm(column_type = "Text")]
    pub model_name: String,

    #[sea_orm(column_type = "Text")]
    pub role: String,

    pub is_active: bool,

    pub created_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,
}

impl Model {
    /// The key as shown to clients
    pub fn masked_api_key(&self) -> String {
        mask_api_key(&self.api_key)
    }
}

/// `sk-abcdef123456` becomes `sk-...3456`; short keys are hidden entirely
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < 8 {
        return "***".to_string();
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_api_key() {
        assert_eq!(mask_api_key("sk-abcdef123456"), "sk-...3456");
        assert_eq!(mask_api_key("12345678"), "123...5678");
        assert_eq!(mask_api_key("short"), "***");
        assert_eq!(mask_api_key(""), "***");
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(ModelRole::parse("import"), Some(ModelRole::Import));
        assert_eq!(ModelRole::parse("chat"), None);
    }
}
