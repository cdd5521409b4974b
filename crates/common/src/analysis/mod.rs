//! Answer, history and paper analysis
//!
//! Resolves the active model and prompt template, fills the template,
//! calls the model and stores single-answer results with an extracted score.
//! History and paper analyses are returned to the caller and never stored.

use crate::config::LlmConfig;
use crate::db::models::*;
use crate::db::{AnswerDetail, Repository};
use crate::errors::{AppError, Result};
use crate::jobs::{Job, JobContext};
use crate::llm::{ChatClient, ChatClientFactory, ChatRequest, ChunkStream};
use crate::locks::KeyPermit;
use crate::metrics;
use async_trait::async_trait;
use regex_lite::Regex;
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::{info, instrument, warn};

/// System persona for answer and paper analysis
pub const EXAMINER_PERSONA: &str = "你是一位资深的公务员面试考官。";

/// System persona for history analysis
pub const COACH_PERSONA: &str = "你是一位资深的公务员面试教练。";

/// System persona for question extraction during import
pub const EXTRACTOR_PERSONA: &str = "你是一个专业的题目解析助手，请严格按照 JSON 格式输出。";

const UNKNOWN_QUESTION: &str = "未知题目";
const UNANSWERED: &str = "未作答";

/// Replace each `{name}` marker with its value. Unknown markers are left as is.
pub fn render_prompt(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (name, value)| {
        acc.replace(&format!("{{{}}}", name), value)
    })
}

fn score_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"总体评分[：:]\s*(\d+(?:\.\d+)?)").ok())
        .as_ref()
}

/// Pull the overall score out of feedback text. Absence is not an error.
pub fn extract_score(text: &str) -> Option<f64> {
    score_pattern()?
        .captures(text)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

/// Map a client-supplied history analysis type to its prompt
pub fn history_kind(analysis_type: &str) -> Option<PromptKind> {
    match analysis_type {
        "history_single" | "history_single_analyze" => Some(PromptKind::HistorySingleAnalyze),
        "history_paper" | "history_paper_analyze" => Some(PromptKind::HistoryPaperAnalyze),
        _ => None,
    }
}

/// `{history_records}` block: one entry per answer, separated by `---`
pub fn history_records(answers: &[AnswerDetail]) -> String {
    answers
        .iter()
        .map(|d| {
            let question: String = d
                .question
                .as_ref()
                .map(|q| q.content.chars().take(100).collect())
                .unwrap_or_else(|| UNKNOWN_QUESTION.to_string());
            let transcript: String = d
                .answer
                .transcript
                .as_deref()
                .unwrap_or("")
                .chars()
                .take(200)
                .collect();
            let score = d
                .analysis
                .as_ref()
                .and_then(|a| a.score)
                .map(|s| s.to_string())
                .unwrap_or_else(|| "无".to_string());

            format!(
                "日期: {}\n题目: {}...\n作答: {}...\n得分: {}\n---",
                d.answer.practice_date, question, transcript, score
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompt inputs describing one paper attempt
#[derive(Debug, Clone, PartialEq)]
pub struct PaperSections {
    pub paper_content: String,
    pub time_details: String,
    pub total_seconds: i64,
}

pub fn paper_sections(answers: &[AnswerDetail]) -> PaperSections {
    let mut content = Vec::with_capacity(answers.len());
    let mut times = Vec::with_capacity(answers.len());
    let mut total: i64 = 0;

    for (idx, d) in answers.iter().enumerate() {
        let n = idx + 1;
        let question = d
            .question
            .as_ref()
            .map(|q| q.content.as_str())
            .unwrap_or(UNKNOWN_QUESTION);
        let transcript = d
            .answer
            .transcript
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(UNANSWERED);
        let duration = d.answer.duration_seconds.unwrap_or(0);
        total += i64::from(duration);

        content.push(format!("### 第 {} 题\n**题目**: {}\n**作答**: {}\n", n, question, transcript));
        times.push(format!("第 {} 题: {} 秒", n, duration));
    }

    PaperSections {
        paper_content: content.join("\n"),
        time_details: times.join("\n"),
        total_seconds: total,
    }
}

/// Feedback returned by the unsaved analyses
#[derive(Debug, Clone, Serialize)]
pub struct Feedback {
    pub feedback: String,
    pub model_name: String,
}

/// A filled prompt bound to the client that will answer it
pub struct PreparedCall {
    pub kind: PromptKind,
    pub client: Arc<dyn ChatClient>,
    pub request: ChatRequest,
}

impl PreparedCall {
    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    /// Buffered completion
    pub async fn run(self) -> Result<String> {
        let start = Instant::now();
        let result = self.client.chat(self.request).await;
        metrics::record_analysis(self.kind.as_str(), start.elapsed().as_secs_f64(), result.is_ok());
        result
    }

    /// Streamed completion
    pub async fn stream(self) -> Result<ChunkStream> {
        let result = self.client.chat_stream(self.request).await;
        if result.is_err() {
            metrics::record_analysis(self.kind.as_str(), 0.0, false);
        }
        result
    }
}

/// Analysis orchestration over the repository and model clients
#[derive(Clone)]
pub struct AnalysisService {
    repo: Repository,
    llm: Arc<dyn ChatClientFactory>,
    settings: LlmConfig,
}

impl AnalysisService {
    pub fn new(repo: Repository, llm: Arc<dyn ChatClientFactory>, settings: LlmConfig) -> Self {
        Self { repo, llm, settings }
    }

    pub fn from_context(ctx: &JobContext) -> Self {
        Self::new(ctx.repo.clone(), ctx.llm.clone(), ctx.config.llm.clone())
    }

    /// Resolve model and prompt for `role` and fill the template
    pub async fn prepare(
        &self,
        role: ModelRole,
        kind: PromptKind,
        system: &str,
        vars: &[(&str, &str)],
        temperature: f32,
    ) -> Result<PreparedCall> {
        let model = self
            .repo
            .find_active_model(role)
            .await?
            .ok_or_else(|| AppError::NoActiveModel {
                role: role.as_str().to_string(),
            })?;

        let prompt = self
            .repo
            .find_prompt_by_kind(kind)
            .await?
            .ok_or_else(|| AppError::PromptNotConfigured {
                prompt_type: kind.as_str().to_string(),
            })?;

        let client = self.llm.create(&model)?;
        let user = render_prompt(&prompt.content, vars);

        Ok(PreparedCall {
            kind,
            client,
            request: ChatRequest::new(system, user, temperature, self.settings.max_tokens),
        })
    }

    /// Load an answer with its question and stored analysis
    pub async fn answer_detail(&self, answer_id: i32) -> Result<AnswerDetail> {
        self.repo
            .find_answer_detail(answer_id)
            .await?
            .ok_or(AppError::AnswerNotFound { id: answer_id })
    }

    /// Prompt for a single answer
    pub async fn prepare_answer(&self, detail: &AnswerDetail) -> Result<PreparedCall> {
        let question = detail
            .question
            .as_ref()
            .map(|q| q.content.as_str())
            .unwrap_or(UNKNOWN_QUESTION);
        let transcript = detail.answer.transcript.as_deref().unwrap_or("");
        let duration = detail.answer.duration_seconds.unwrap_or(0).to_string();

        self.prepare(
            ModelRole::Analyze,
            PromptKind::SingleAnalyze,
            EXAMINER_PERSONA,
            &[("question", question), ("answer", transcript), ("duration", &duration)],
            self.settings.temperature,
        )
        .await
    }

    /// Persist feedback for an answer with its extracted score
    pub async fn store(&self, answer: &Answer, feedback: String, model_name: String) -> Result<AnalysisResult> {
        let score = extract_score(&feedback);
        let stored = self.repo.insert_analysis(answer, feedback, score, model_name).await?;
        info!(answer_id = answer.id, score = ?score, "Analysis stored");
        Ok(stored)
    }

    /// Run a prepared single-answer call and store the result
    pub async fn complete(&self, answer: &Answer, call: PreparedCall) -> Result<AnalysisResult> {
        let model_name = call.model_name().to_string();
        let feedback = call.run().await?;
        self.store(answer, feedback, model_name).await
    }

    /// Buffered analysis of one answer. A stored result makes this fail.
    #[instrument(skip(self))]
    pub async fn analyze_answer(&self, answer_id: i32) -> Result<AnalysisResult> {
        let detail = self.answer_detail(answer_id).await?;
        if detail.analysis.is_some() {
            return Err(AppError::AlreadyAnalyzed { answer_id });
        }

        let call = self.prepare_answer(&detail).await?;
        self.complete(&detail.answer, call).await
    }

    /// Store text salvaged from an interrupted stream unless a result exists
    pub async fn save_partial(
        &self,
        answer_id: i32,
        text: String,
        model_name: String,
    ) -> Result<Option<AnalysisResult>> {
        let answer = self
            .repo
            .find_answer(answer_id)
            .await?
            .ok_or(AppError::AnswerNotFound { id: answer_id })?;

        if self.repo.find_analysis(answer_id).await?.is_some() {
            info!(answer_id, "Analysis already stored, partial text dropped");
            return Ok(None);
        }

        match self.store(&answer, text, model_name).await {
            Ok(stored) => {
                metrics::record_partial_save();
                Ok(Some(stored))
            }
            // lost a race with a completing analysis
            Err(AppError::AlreadyAnalyzed { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Prompt over several past answers
    pub async fn prepare_history(&self, kind: PromptKind, answer_ids: &[i32]) -> Result<PreparedCall> {
        if answer_ids.is_empty() {
            return Err(AppError::Validation {
                message: "select at least one answer".to_string(),
                field: Some("answer_ids".to_string()),
            });
        }

        let answers = self.repo.answers_by_ids(answer_ids).await?;
        if answers.is_empty() {
            return Err(AppError::NotFound {
                resource_type: "answers".to_string(),
                id: format!("{:?}", answer_ids),
            });
        }

        let records = history_records(&answers);
        self.prepare(
            ModelRole::Analyze,
            kind,
            COACH_PERSONA,
            &[("history_records", &records)],
            self.settings.temperature,
        )
        .await
    }

    /// Buffered history analysis; nothing is stored
    #[instrument(skip(self, answer_ids), fields(answers = answer_ids.len()))]
    pub async fn analyze_history(&self, kind: PromptKind, answer_ids: &[i32]) -> Result<Feedback> {
        let call = self.prepare_history(kind, answer_ids).await?;
        let model_name = call.model_name().to_string();
        let feedback = call.run().await?;
        Ok(Feedback { feedback, model_name })
    }

    /// Prompt over every answer of one paper attempt
    pub async fn prepare_paper(&self, paper_session_id: &str) -> Result<PreparedCall> {
        let answers = self.repo.answers_by_session(paper_session_id).await?;
        if answers.is_empty() {
            return Err(AppError::NotFound {
                resource_type: "paper session".to_string(),
                id: paper_session_id.to_string(),
            });
        }

        let sections = paper_sections(&answers);
        let total = sections.total_seconds.to_string();
        self.prepare(
            ModelRole::Analyze,
            PromptKind::PaperAnalyze,
            EXAMINER_PERSONA,
            &[
                ("paper_content", &sections.paper_content),
                ("time_details", &sections.time_details),
                ("total_time", &total),
            ],
            self.settings.temperature,
        )
        .await
    }

    /// Buffered paper analysis; nothing is stored
    #[instrument(skip(self))]
    pub async fn analyze_paper(&self, paper_session_id: &str) -> Result<Feedback> {
        let call = self.prepare_paper(paper_session_id).await?;
        let model_name = call.model_name().to_string();
        let feedback = call.run().await?;
        Ok(Feedback { feedback, model_name })
    }
}

// ============================================================================
// Jobs
// ============================================================================

/// Background analysis started by `POST /answers/{id}/analyze`.
/// Holds the answer's permit until it finishes.
pub struct AnalyzeAnswerJob {
    pub answer: Answer,
    pub call: PreparedCall,
    pub permit: KeyPermit<i32>,
}

#[async_trait]
impl Job for AnalyzeAnswerJob {
    fn name(&self) -> &'static str {
        "analyze_answer"
    }

    async fn run(self: Box<Self>, ctx: JobContext) -> Result<()> {
        let AnalyzeAnswerJob { answer, call, permit } = *self;
        let service = AnalysisService::from_context(&ctx);

        let result = service.complete(&answer, call).await;
        drop(permit);

        match result {
            Ok(_) => Ok(()),
            Err(AppError::AlreadyAnalyzed { answer_id }) => {
                warn!(answer_id, "Analysis was stored concurrently");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Stores the text a client had received before disconnecting
pub struct SavePartialAnalysisJob {
    pub answer_id: i32,
    pub text: String,
    pub model_name: String,
}

#[async_trait]
impl Job for SavePartialAnalysisJob {
    fn name(&self) -> &'static str {
        "save_partial_analysis"
    }

    async fn run(self: Box<Self>, ctx: JobContext) -> Result<()> {
        let service = AnalysisService::from_context(&ctx);
        let chars = self.text.chars().count();
        if let Some(stored) = service.save_partial(self.answer_id, self.text, self.model_name).await? {
            info!(answer_id = stored.answer_id, chars, "Partial analysis saved");
        }
        Ok(())
    }
}
