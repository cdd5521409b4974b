//! Import processor
//!
//! Runs a document import in the background: truncate to the character
//! budget, ask the import model to extract questions, store them, and
//! record the outcome on the import task row.

use crate::errors::IngestionError;
use crate::parser::{parse_paper, parse_single_questions};
use crate::text::truncate_chars;
use async_trait::async_trait;
use mockview_common::analysis::{AnalysisService, EXTRACTOR_PERSONA};
use mockview_common::db::models::{ImportKind, ImportStatus, ImportTask, ModelRole, PromptKind, MAX_IMPORT_CHARS};
use mockview_common::errors::AppError;
use mockview_common::jobs::{Job, JobContext, JobRunner};
use mockview_common::{metrics, Repository};
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Description given to papers created by import
pub const IMPORTED_PAPER_DESCRIPTION: &str = "通过文档导入";

/// Character budget: stored setting, else the configured default
pub async fn max_import_chars(repo: &Repository, default: usize) -> Result<usize, AppError> {
    Ok(repo
        .get_setting(MAX_IMPORT_CHARS)
        .await?
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default))
}

/// Create the pending task and hand the work to the job runner
pub async fn start_import(
    runner: &JobRunner,
    file_name: String,
    file_type: &str,
    kind: ImportKind,
    text: String,
) -> Result<ImportTask, AppError> {
    let ctx = runner.context();
    let (stored, _) = truncate_chars(&text, ctx.config.import.raw_text_store_limit);

    let task = ctx
        .repo
        .create_import_task(file_name.clone(), file_type, kind, stored.to_string())
        .await?;

    info!(
        import_id = task.id,
        kind = kind.as_str(),
        chars = text.chars().count(),
        "Import task created"
    );

    runner.submit(ImportJob {
        task_id: task.id,
        kind,
        file_name,
        text,
    });

    Ok(task)
}

/// Background half of an import
pub struct ImportJob {
    pub task_id: i32,
    pub kind: ImportKind,
    pub file_name: String,
    pub text: String,
}

#[async_trait]
impl Job for ImportJob {
    fn name(&self) -> &'static str {
        "import"
    }

    #[instrument(skip(self, ctx), fields(import_id = self.task_id, kind = self.kind.as_str()))]
    async fn run(self: Box<Self>, ctx: JobContext) -> Result<(), AppError> {
        let start = Instant::now();
        ctx.repo
            .transition_import_task(self.task_id, ImportStatus::Running, None, None)
            .await?;

        let (status, summary, error) = match self.process(&ctx).await {
            Ok(summary) => {
                info!(summary = %summary, "Import succeeded");
                (ImportStatus::Success, Some(summary), None)
            }
            Err(e) => {
                warn!(error = %e, "Import failed");
                (ImportStatus::Failed, None, Some(e.to_string()))
            }
        };

        metrics::record_import(self.kind.as_str(), status.as_str(), start.elapsed().as_secs_f64());

        ctx.repo
            .transition_import_task(self.task_id, status, summary, error)
            .await?;
        Ok(())
    }
}

impl ImportJob {
    async fn process(&self, ctx: &JobContext) -> Result<String, IngestionError> {
        let max_chars = max_import_chars(&ctx.repo, ctx.config.import.default_max_chars).await?;
        let (text, truncated) = truncate_chars(&self.text, max_chars);
        if truncated {
            info!(
                original_chars = self.text.chars().count(),
                max_chars,
                "Document truncated before extraction"
            );
        }

        let prompt = match self.kind {
            ImportKind::Single => PromptKind::ImportSingle,
            ImportKind::Paper => PromptKind::ImportPaper,
        };

        let call = AnalysisService::from_context(ctx)
            .prepare(
                ModelRole::Import,
                prompt,
                EXTRACTOR_PERSONA,
                &[("document_content", text), ("file_name", &self.file_name)],
                ctx.config.llm.import_temperature,
            )
            .await?;
        let response = call.run().await?;

        let mut summary = match self.kind {
            ImportKind::Single => {
                let questions = parse_single_questions(&response)?;
                let count = ctx.repo.insert_imported_questions(questions).await?;
                format!("成功导入 {} 道题目", count)
            }
            ImportKind::Paper => {
                let parsed = parse_paper(&response)?;
                let (paper, count) = ctx
                    .repo
                    .create_imported_paper(
                        parsed.title,
                        Some(IMPORTED_PAPER_DESCRIPTION.to_string()),
                        parsed.questions,
                    )
                    .await?;
                format!("成功创建套卷「{}」，包含 {} 道题目", paper.title, count)
            }
        };

        if truncated {
            summary.push_str(&format!("（文档已截断至 {} 字符）", max_chars));
        }
        Ok(summary)
    }
}
