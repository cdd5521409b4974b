//! Default rows inserted on startup when missing

use crate::db::models::*;
use crate::errors::Result;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use tracing::info;

/// Built-in prompt templates: (kind, title, body)
pub const DEFAULT_PROMPTS: [(PromptKind, &str, &str); 6] = [
    (
        PromptKind::SingleAnalyze,
        "单题作答分析",
        include_str!("prompts/single_analyze.md"),
    ),
    (
        PromptKind::HistorySingleAnalyze,
        "单题历史分析",
        include_str!("prompts/history_single_analyze.md"),
    ),
    (
        PromptKind::PaperAnalyze,
        "套卷作答分析",
        include_str!("prompts/paper_analyze.md"),
    ),
    (
        PromptKind::HistoryPaperAnalyze,
        "套卷历史分析",
        include_str!("prompts/history_paper_analyze.md"),
    ),
    (
        PromptKind::ImportSingle,
        "单题导入解析",
        include_str!("prompts/import_single.md"),
    ),
    (
        PromptKind::ImportPaper,
        "套卷导入解析",
        include_str!("prompts/import_paper.md"),
    ),
];

/// Insert default prompts, speech config and settings. Existing rows are kept.
pub async fn seed_defaults(conn: &DatabaseConnection, default_max_import_chars: usize) -> Result<()> {
    let now = chrono::Utc::now();
    let existing: Vec<String> = PromptEntity::find()
        .all(conn)
        .await?
        .into_iter()
        .map(|p| p.prompt_type)
        .collect();

    let mut inserted = 0;
    for (kind, title, content) in DEFAULT_PROMPTS {
        if existing.iter().any(|t| t == kind.as_str()) {
            continue;
        }
        PromptActiveModel {
            prompt_type: Set(kind.as_str().to_string()),
            title: Set(title.to_string()),
            content: Set(content.to_string()),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(conn)
        .await?;
        inserted += 1;
    }

    if SpeechConfigEntity::find().one(conn).await?.is_none() {
        SpeechConfigActiveModel {
            provider: Set(PROVIDER_WEB_SPEECH.to_string()),
            whisper_api_url: Set(None),
            whisper_api_key: Set(None),
            whisper_model: Set("whisper-1".to_string()),
            is_active: Set(true),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(conn)
        .await?;
    }

    if SystemSettingEntity::find_by_id(MAX_IMPORT_CHARS.to_string())
        .one(conn)
        .await?
        .is_none()
    {
        SystemSettingActiveModel {
            key: Set(MAX_IMPORT_CHARS.to_string()),
            value: Set(default_max_import_chars.to_string()),
            updated_at: Set(now),
        }
        .insert(conn)
        .await?;
    }

    info!(prompts_inserted = inserted, "Default data ensured");
    Ok(())
}
