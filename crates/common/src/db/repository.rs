//! Repository pattern for database operations
//!
//! Provides one interface for all data access, with multi-step writes
//! wrapped in transactions.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr,
    TransactionTrait, Value,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Filter for the question bank listing
#[derive(Debug, Clone, Default)]
pub struct QuestionFilter {
    pub categories: Vec<String>,
    pub keyword: Option<String>,
    pub page: u64,
    pub page_size: u64,
}

/// Fields for a new question
#[derive(Debug, Clone, Default)]
pub struct NewQuestion {
    pub category: String,
    pub content: String,
    pub analysis: Option<String>,
    pub reference_answer: Option<String>,
    pub image_url: Option<String>,
    pub tags: Option<String>,
    pub source: Option<String>,
}

/// Partial question update; `None` leaves the column unchanged
#[derive(Debug, Clone, Default)]
pub struct QuestionPatch {
    pub category: Option<String>,
    pub content: Option<String>,
    pub analysis: Option<String>,
    pub reference_answer: Option<String>,
    pub image_url: Option<String>,
    pub tags: Option<String>,
}

/// A question extracted from an imported document
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedQuestion {
    pub category: String,
    pub content: String,
    pub analysis: Option<String>,
    pub reference_answer: Option<String>,
}

/// Fields for a new answer; callers validate mode rules first
#[derive(Debug, Clone)]
pub struct NewAnswer {
    pub mode: AnswerMode,
    pub question_id: i32,
    pub paper_id: Option<i32>,
    pub paper_session_id: Option<String>,
    pub transcript: Option<String>,
    pub audio_url: Option<String>,
    pub duration_seconds: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Model config create/update payload
#[derive(Debug, Clone, Default)]
pub struct ModelConfigInput {
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model_name: Option<String>,
    pub role: Option<ModelRole>,
    pub is_active: Option<bool>,
}

/// Paper with its ordered questions
#[derive(Debug, Clone, Serialize)]
pub struct PaperDetail {
    #[serde(flatten)]
    pub paper: Paper,
    pub items: Vec<PaperItemDetail>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaperItemDetail {
    pub id: i32,
    pub question_id: i32,
    pub sort_order: i32,
    pub question: Option<Question>,
}

/// Answer joined with its question and stored analysis
#[derive(Debug, Clone)]
pub struct AnswerDetail {
    pub answer: Answer,
    pub question: Option<Question>,
    pub analysis: Option<AnalysisResult>,
}

/// Daily average score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub date: String,
    pub avg_score: f64,
    pub count: usize,
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> &DatabaseConnection {
        self.pool.connection()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Question Operations
    // ========================================================================

    /// List non-deleted questions, newest first
    pub async fn list_questions(&self, filter: &QuestionFilter) -> Result<(Vec<Question>, u64)> {
        let mut query = QuestionEntity::find().filter(QuestionColumn::IsDeleted.eq(false));

        if !filter.categories.is_empty() {
            query = query.filter(QuestionColumn::Category.is_in(filter.categories.clone()));
        }

        if let Some(keyword) = filter.keyword.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(QuestionColumn::Content.contains(keyword))
                    .add(QuestionColumn::Analysis.contains(keyword))
                    .add(QuestionColumn::ReferenceAnswer.contains(keyword))
                    .add(QuestionColumn::Tags.contains(keyword)),
            );
        }

        let page_size = filter.page_size.max(1);
        let paginator = query
            .order_by_desc(QuestionColumn::CreatedAt)
            .order_by_desc(QuestionColumn::Id)
            .paginate(self.conn(), page_size);

        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(filter.page.saturating_sub(1)).await?;

        Ok((items, total))
    }

    /// Find a question by id, including soft-deleted ones
    pub async fn find_question(&self, id: i32) -> Result<Option<Question>> {
        QuestionEntity::find_by_id(id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Create a question
    pub async fn create_question(&self, input: NewQuestion) -> Result<Question> {
        let now = Utc::now();

        QuestionActiveModel {
            category: Set(input.category),
            content: Set(input.content),
            analysis: Set(input.analysis),
            reference_answer: Set(input.reference_answer),
            image_url: Set(input.image_url),
            tags: Set(input.tags),
            source: Set(input.source),
            is_deleted: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.conn())
        .await
        .map_err(Into::into)
    }

    /// Apply a partial update to a live question
    pub async fn update_question(&self, id: i32, patch: QuestionPatch) -> Result<Question> {
        let question = self
            .find_question(id)
            .await?
            .filter(|q| !q.is_deleted)
            .ok_or(AppError::QuestionNotFound { id })?;

        let mut active = question.into_active_model();
        if let Some(category) = patch.category {
            active.category = Set(category);
        }
        if let Some(content) = patch.content {
            active.content = Set(content);
        }
        if let Some(analysis) = patch.analysis {
            active.analysis = Set(Some(analysis));
        }
        if let Some(reference_answer) = patch.reference_answer {
            active.reference_answer = Set(Some(reference_answer));
        }
        if let Some(image_url) = patch.image_url {
            active.image_url = Set(Some(image_url));
        }
        if let Some(tags) = patch.tags {
            active.tags = Set(Some(tags));
        }
        active.updated_at = Set(Utc::now());

        active.update(self.conn()).await.map_err(Into::into)
    }

    /// Soft-delete questions; returns how many rows changed
    pub async fn soft_delete_questions(&self, ids: &[i32]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = QuestionEntity::update_many()
            .col_expr(QuestionColumn::IsDeleted, Expr::value(true))
            .col_expr(QuestionColumn::UpdatedAt, Expr::value(Utc::now()))
            .filter(QuestionColumn::Id.is_in(ids.to_vec()))
            .filter(QuestionColumn::IsDeleted.eq(false))
            .exec(self.conn())
            .await?;

        Ok(result.rows_affected)
    }

    /// Ids of live questions, optionally restricted to one category
    pub async fn live_question_ids(&self, category: Option<&str>) -> Result<Vec<i32>> {
        let mut query = QuestionEntity::find()
            .select_only()
            .column(QuestionColumn::Id)
            .filter(QuestionColumn::IsDeleted.eq(false));

        if let Some(category) = category.filter(|c| !c.is_empty()) {
            query = query.filter(QuestionColumn::Category.eq(category));
        }

        query
            .into_tuple::<i32>()
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Insert imported questions in one transaction
    pub async fn insert_imported_questions(&self, questions: Vec<ImportedQuestion>) -> Result<usize> {
        let txn = self.conn().begin().await?;
        let now = Utc::now();
        let count = questions.len();

        for q in questions {
            imported_question_model(q, now).insert(&txn).await?;
        }

        txn.commit().await?;
        Ok(count)
    }

    // ========================================================================
    // Paper Operations
    // ========================================================================

    /// List papers with their item counts, newest first
    pub async fn list_papers(&self, page: u64, page_size: u64) -> Result<(Vec<(Paper, usize)>, u64)> {
        let paginator = PaperEntity::find()
            .order_by_desc(PaperColumn::CreatedAt)
            .order_by_desc(PaperColumn::Id)
            .paginate(self.conn(), page_size.max(1));

        let total = paginator.num_items().await?;
        let papers = paginator.fetch_page(page.saturating_sub(1)).await?;

        let ids: Vec<i32> = papers.iter().map(|p| p.id).collect();
        let mut counts: HashMap<i32, usize> = HashMap::new();
        if !ids.is_empty() {
            let items = PaperItemEntity::find()
                .filter(PaperItemColumn::PaperId.is_in(ids))
                .all(self.conn())
                .await?;
            for item in items {
                *counts.entry(item.paper_id).or_default() += 1;
            }
        }

        let rows = papers
            .into_iter()
            .map(|p| {
                let count = counts.get(&p.id).copied().unwrap_or(0);
                (p, count)
            })
            .collect();

        Ok((rows, total))
    }

    /// Find a paper by id
    pub async fn find_paper(&self, id: i32) -> Result<Option<Paper>> {
        PaperEntity::find_by_id(id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Paper with items in `sort_order`
    pub async fn find_paper_detail(&self, id: i32) -> Result<Option<PaperDetail>> {
        let Some(paper) = self.find_paper(id).await? else {
            return Ok(None);
        };

        let rows = PaperItemEntity::find()
            .filter(PaperItemColumn::PaperId.eq(id))
            .order_by_asc(PaperItemColumn::SortOrder)
            .find_also_related(QuestionEntity)
            .all(self.conn())
            .await?;

        let items = rows
            .into_iter()
            .map(|(item, question)| PaperItemDetail {
                id: item.id,
                question_id: item.question_id,
                sort_order: item.sort_order,
                question,
            })
            .collect();

        Ok(Some(PaperDetail { paper, items }))
    }

    /// Create a paper whose items follow `question_ids` order (1-based).
    /// Every id must name an existing question.
    pub async fn create_paper(
        &self,
        title: String,
        description: Option<String>,
        time_limit_seconds: Option<i32>,
        question_ids: &[i32],
    ) -> Result<Paper> {
        self.ensure_questions_exist(question_ids).await?;

        let txn = self.conn().begin().await?;
        let now = Utc::now();

        let paper = PaperActiveModel {
            title: Set(title),
            description: Set(description),
            time_limit_seconds: Set(time_limit_seconds),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        for (idx, question_id) in question_ids.iter().enumerate() {
            PaperItemActiveModel {
                paper_id: Set(paper.id),
                question_id: Set(*question_id),
                sort_order: Set(idx as i32 + 1),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await?;
        Ok(paper)
    }

    /// Create an imported paper and its questions atomically
    pub async fn create_imported_paper(
        &self,
        title: String,
        description: Option<String>,
        questions: Vec<ImportedQuestion>,
    ) -> Result<(Paper, usize)> {
        let txn = self.conn().begin().await?;
        let now = Utc::now();

        let paper = PaperActiveModel {
            title: Set(title),
            description: Set(description),
            time_limit_seconds: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let count = questions.len();
        for (idx, q) in questions.into_iter().enumerate() {
            let question = imported_question_model(q, now).insert(&txn).await?;
            PaperItemActiveModel {
                paper_id: Set(paper.id),
                question_id: Set(question.id),
                sort_order: Set(idx as i32 + 1),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await?;
        Ok((paper, count))
    }

    /// Update paper metadata
    pub async fn update_paper(
        &self,
        id: i32,
        title: Option<String>,
        description: Option<String>,
        time_limit_seconds: Option<i32>,
    ) -> Result<Paper> {
        let paper = self
            .find_paper(id)
            .await?
            .ok_or(AppError::PaperNotFound { id })?;

        let mut active = paper.into_active_model();
        if let Some(title) = title {
            active.title = Set(title);
        }
        if let Some(description) = description {
            active.description = Set(Some(description));
        }
        if let Some(limit) = time_limit_seconds {
            active.time_limit_seconds = Set(Some(limit));
        }
        active.updated_at = Set(Utc::now());

        active.update(self.conn()).await.map_err(Into::into)
    }

    /// Delete a paper and its items; answers keep their rows but lose the paper link
    pub async fn delete_paper(&self, id: i32) -> Result<bool> {
        let txn = self.conn().begin().await?;

        PaperItemEntity::delete_many()
            .filter(PaperItemColumn::PaperId.eq(id))
            .exec(&txn)
            .await?;

        AnswerEntity::update_many()
            .col_expr(AnswerColumn::PaperId, Expr::value(Value::Int(None)))
            .filter(AnswerColumn::PaperId.eq(id))
            .exec(&txn)
            .await?;

        let result = PaperEntity::delete_by_id(id).exec(&txn).await?;

        txn.commit().await?;
        Ok(result.rows_affected > 0)
    }

    /// Append a question at `max(sort_order) + 1`
    pub async fn add_paper_item(&self, paper_id: i32, question_id: i32) -> Result<PaperItem> {
        if self.find_paper(paper_id).await?.is_none() {
            return Err(AppError::PaperNotFound { id: paper_id });
        }
        if self.find_question(question_id).await?.is_none() {
            return Err(AppError::QuestionNotFound { id: question_id });
        }

        let last = PaperItemEntity::find()
            .filter(PaperItemColumn::PaperId.eq(paper_id))
            .order_by_desc(PaperItemColumn::SortOrder)
            .one(self.conn())
            .await?;
        let next = last.map(|i| i.sort_order).unwrap_or(0) + 1;

        PaperItemActiveModel {
            paper_id: Set(paper_id),
            question_id: Set(question_id),
            sort_order: Set(next),
            ..Default::default()
        }
        .insert(self.conn())
        .await
        .map_err(Into::into)
    }

    /// Remove one item from a paper
    pub async fn remove_paper_item(&self, paper_id: i32, item_id: i32) -> Result<bool> {
        let result = PaperItemEntity::delete_many()
            .filter(PaperItemColumn::Id.eq(item_id))
            .filter(PaperItemColumn::PaperId.eq(paper_id))
            .exec(self.conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    async fn ensure_questions_exist(&self, ids: &[i32]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let found: Vec<i32> = QuestionEntity::find()
            .select_only()
            .column(QuestionColumn::Id)
            .filter(QuestionColumn::Id.is_in(ids.to_vec()))
            .into_tuple::<i32>()
            .all(self.conn())
            .await?;

        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !found.contains(id))
            .map(|id| id.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation {
                message: format!("unknown question ids: {}", missing.join(", ")),
                field: Some("question_ids".to_string()),
            })
        }
    }

    // ========================================================================
    // Answer Operations
    // ========================================================================

    /// Record an answer; `practice_date` is taken from `started_at`
    pub async fn create_answer(&self, input: NewAnswer) -> Result<Answer> {
        AnswerActiveModel {
            mode: Set(input.mode.as_str().to_string()),
            question_id: Set(input.question_id),
            paper_id: Set(input.paper_id),
            paper_session_id: Set(input.paper_session_id),
            transcript: Set(input.transcript),
            audio_url: Set(input.audio_url),
            duration_seconds: Set(input.duration_seconds),
            started_at: Set(input.started_at),
            finished_at: Set(input.finished_at),
            practice_date: Set(input.started_at.format("%Y-%m-%d").to_string()),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(self.conn())
        .await
        .map_err(Into::into)
    }

    /// Find an answer by id
    pub async fn find_answer(&self, id: i32) -> Result<Option<Answer>> {
        AnswerEntity::find_by_id(id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Answer with question and analysis
    pub async fn find_answer_detail(&self, id: i32) -> Result<Option<AnswerDetail>> {
        let Some(answer) = self.find_answer(id).await? else {
            return Ok(None);
        };
        Ok(self.hydrate_answers(vec![answer]).await?.pop())
    }

    /// Answers by id in creation order
    pub async fn answers_by_ids(&self, ids: &[i32]) -> Result<Vec<AnswerDetail>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let answers = AnswerEntity::find()
            .filter(AnswerColumn::Id.is_in(ids.to_vec()))
            .order_by_asc(AnswerColumn::CreatedAt)
            .order_by_asc(AnswerColumn::Id)
            .all(self.conn())
            .await?;

        self.hydrate_answers(answers).await
    }

    /// All answers of one paper attempt in creation order
    pub async fn answers_by_session(&self, paper_session_id: &str) -> Result<Vec<AnswerDetail>> {
        let answers = AnswerEntity::find()
            .filter(AnswerColumn::PaperSessionId.eq(paper_session_id))
            .order_by_asc(AnswerColumn::CreatedAt)
            .order_by_asc(AnswerColumn::Id)
            .all(self.conn())
            .await?;

        self.hydrate_answers(answers).await
    }

    /// Page through answers of one mode, most recent first
    pub async fn list_answers(
        &self,
        mode: AnswerMode,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<AnswerDetail>, u64)> {
        let paginator = AnswerEntity::find()
            .filter(AnswerColumn::Mode.eq(mode.as_str()))
            .order_by_desc(AnswerColumn::StartedAt)
            .order_by_desc(AnswerColumn::Id)
            .paginate(self.conn(), page_size.max(1));

        let total = paginator.num_items().await?;
        let answers = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((self.hydrate_answers(answers).await?, total))
    }

    /// Daily average of stored scores since `since` (inclusive, `YYYY-MM-DD`)
    pub async fn score_trends(&self, mode: AnswerMode, since: &str) -> Result<Vec<TrendPoint>> {
        let rows = AnswerEntity::find()
            .filter(AnswerColumn::Mode.eq(mode.as_str()))
            .filter(AnswerColumn::PracticeDate.gte(since))
            .find_also_related(AnalysisResultEntity)
            .all(self.conn())
            .await?;

        let mut by_date: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for (answer, analysis) in rows {
            if let Some(score) = analysis.and_then(|a| a.score) {
                by_date.entry(answer.practice_date).or_default().push(score);
            }
        }

        Ok(by_date
            .into_iter()
            .map(|(date, scores)| {
                let avg = scores.iter().sum::<f64>() / scores.len() as f64;
                TrendPoint {
                    date,
                    avg_score: (avg * 10.0).round() / 10.0,
                    count: scores.len(),
                }
            })
            .collect())
    }

    async fn hydrate_answers(&self, answers: Vec<Answer>) -> Result<Vec<AnswerDetail>> {
        if answers.is_empty() {
            return Ok(Vec::new());
        }

        let question_ids: Vec<i32> = answers.iter().map(|a| a.question_id).collect();
        let answer_ids: Vec<i32> = answers.iter().map(|a| a.id).collect();

        let questions: HashMap<i32, Question> = QuestionEntity::find()
            .filter(QuestionColumn::Id.is_in(question_ids))
            .all(self.conn())
            .await?
            .into_iter()
            .map(|q| (q.id, q))
            .collect();

        let mut analyses: HashMap<i32, AnalysisResult> = AnalysisResultEntity::find()
            .filter(AnalysisResultColumn::AnswerId.is_in(answer_ids))
            .all(self.conn())
            .await?
            .into_iter()
            .map(|a| (a.answer_id, a))
            .collect();

        Ok(answers
            .into_iter()
            .map(|answer| AnswerDetail {
                question: questions.get(&answer.question_id).cloned(),
                analysis: analyses.remove(&answer.id),
                answer,
            })
            .collect())
    }

    // ========================================================================
    // Analysis Operations
    // ========================================================================

    /// Stored analysis for an answer
    pub async fn find_analysis(&self, answer_id: i32) -> Result<Option<AnalysisResult>> {
        AnalysisResultEntity::find()
            .filter(AnalysisResultColumn::AnswerId.eq(answer_id))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Insert the analysis for an answer. A second insert for the same
    /// answer violates the unique index and surfaces as `AlreadyAnalyzed`.
    pub async fn insert_analysis(
        &self,
        answer: &Answer,
        feedback: String,
        score: Option<f64>,
        model_name: String,
    ) -> Result<AnalysisResult> {
        AnalysisResultActiveModel {
            answer_id: Set(answer.id),
            paper_session_id: Set(answer.paper_session_id.clone()),
            analysis_type: Set(ANALYSIS_TYPE_SINGLE.to_string()),
            score: Set(score),
            score_details: Set(None),
            feedback: Set(Some(feedback)),
            model_answer: Set(None),
            model_name: Set(model_name),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(self.conn())
        .await
        .map_err(|e| map_unique_violation(e, answer.id))
    }

    // ========================================================================
    // Model Config Operations
    // ========================================================================

    /// List model configs, optionally for one role
    pub async fn list_model_configs(&self, role: Option<ModelRole>) -> Result<Vec<ModelConfig>> {
        let mut query = ModelConfigEntity::find();
        if let Some(role) = role {
            query = query.filter(ModelConfigColumn::Role.eq(role.as_str()));
        }
        query
            .order_by_asc(ModelConfigColumn::Id)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Find a model config by id
    pub async fn find_model_config(&self, id: i32) -> Result<Option<ModelConfig>> {
        ModelConfigEntity::find_by_id(id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// The single active config for a role
    pub async fn find_active_model(&self, role: ModelRole) -> Result<Option<ModelConfig>> {
        ModelConfigEntity::find()
            .filter(ModelConfigColumn::Role.eq(role.as_str()))
            .filter(ModelConfigColumn::IsActive.eq(true))
            .order_by_desc(ModelConfigColumn::UpdatedAt)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Create an inactive model config. All fields except `is_active` are required.
    pub async fn create_model_config(&self, input: ModelConfigInput) -> Result<ModelConfig> {
        let now = Utc::now();
        let require = |v: Option<String>, field: &str| {
            v.filter(|s| !s.trim().is_empty())
                .ok_or_else(|| AppError::MissingField { field: field.to_string() })
        };

        let role = input.role.ok_or_else(|| AppError::MissingField {
            field: "role".to_string(),
        })?;

        let created = ModelConfigActiveModel {
            name: Set(require(input.name, "name")?),
            base_url: Set(require(input.base_url, "base_url")?),
            api_key: Set(require(input.api_key, "api_key")?),
            model_name: Set(require(input.model_name, "model_name")?),
            role: Set(role.as_str().to_string()),
            is_active: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.conn())
        .await?;

        if input.is_active == Some(true) {
            return self.activate_model_config(created.id).await;
        }
        Ok(created)
    }

    /// Partial update. A config that ends up active, whether newly activated
    /// or moved to another role, becomes the only active one of its role.
    pub async fn update_model_config(&self, id: i32, input: ModelConfigInput) -> Result<ModelConfig> {
        let txn = self.conn().begin().await?;

        let existing = ModelConfigEntity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or(AppError::ModelNotFound { id })?;

        let stays_active = input.is_active.unwrap_or(existing.is_active);
        let role = input
            .role
            .map(|r| r.as_str().to_string())
            .unwrap_or_else(|| existing.role.clone());

        let mut active = existing.into_active_model();
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(base_url) = input.base_url {
            active.base_url = Set(base_url);
        }
        if let Some(api_key) = input.api_key.filter(|k| !k.is_empty()) {
            active.api_key = Set(api_key);
        }
        if let Some(model_name) = input.model_name {
            active.model_name = Set(model_name);
        }
        if stays_active {
            ModelConfigEntity::update_many()
                .col_expr(ModelConfigColumn::IsActive, Expr::value(false))
                .filter(ModelConfigColumn::Role.eq(role.clone()))
                .filter(ModelConfigColumn::Id.ne(id))
                .exec(&txn)
                .await?;
        }
        active.role = Set(role);
        active.is_active = Set(stays_active);
        active.updated_at = Set(Utc::now());

        let updated = active.update(&txn).await?;
        txn.commit().await?;
        Ok(updated)
    }

    /// Delete a model config
    pub async fn delete_model_config(&self, id: i32) -> Result<bool> {
        let result = ModelConfigEntity::delete_by_id(id).exec(self.conn()).await?;
        Ok(result.rows_affected > 0)
    }

    /// Make this config the only active one for its role
    pub async fn activate_model_config(&self, id: i32) -> Result<ModelConfig> {
        let txn = self.conn().begin().await?;

        let config = ModelConfigEntity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or(AppError::ModelNotFound { id })?;

        ModelConfigEntity::update_many()
            .col_expr(ModelConfigColumn::IsActive, Expr::value(false))
            .filter(ModelConfigColumn::Role.eq(config.role.clone()))
            .filter(ModelConfigColumn::Id.ne(id))
            .exec(&txn)
            .await?;

        let mut active = config.into_active_model();
        active.is_active = Set(true);
        active.updated_at = Set(Utc::now());
        let activated = active.update(&txn).await?;

        txn.commit().await?;
        Ok(activated)
    }

    // ========================================================================
    // Prompt Operations
    // ========================================================================

    /// List all prompt templates
    pub async fn list_prompts(&self) -> Result<Vec<Prompt>> {
        PromptEntity::find()
            .order_by_asc(PromptColumn::Id)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Find a prompt by id
    pub async fn find_prompt(&self, id: i32) -> Result<Option<Prompt>> {
        PromptEntity::find_by_id(id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Find the template for a prompt kind
    pub async fn find_prompt_by_kind(&self, kind: PromptKind) -> Result<Option<Prompt>> {
        PromptEntity::find()
            .filter(PromptColumn::PromptType.eq(kind.as_str()))
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Replace a prompt's body and optionally its title
    pub async fn update_prompt(&self, id: i32, title: Option<String>, content: String) -> Result<Prompt> {
        let prompt = self
            .find_prompt(id)
            .await?
            .ok_or(AppError::PromptNotFound { id })?;

        let mut active = prompt.into_active_model();
        if let Some(title) = title {
            active.title = Set(title);
        }
        active.content = Set(content);
        active.updated_at = Set(Utc::now());

        active.update(self.conn()).await.map_err(Into::into)
    }

    // ========================================================================
    // Speech Config Operations
    // ========================================================================

    /// The speech config row, if any
    pub async fn find_speech_config(&self) -> Result<Option<SpeechConfig>> {
        SpeechConfigEntity::find()
            .order_by_asc(SpeechConfigColumn::Id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Create or update the singleton speech config
    pub async fn save_speech_config(
        &self,
        provider: Option<String>,
        whisper_api_url: Option<String>,
        whisper_api_key: Option<String>,
        whisper_model: Option<String>,
    ) -> Result<SpeechConfig> {
        let now = Utc::now();

        match self.find_speech_config().await? {
            Some(existing) => {
                let mut active = existing.into_active_model();
                if let Some(provider) = provider {
                    active.provider = Set(provider);
                }
                if let Some(url) = whisper_api_url {
                    active.whisper_api_url = Set(Some(url));
                }
                if let Some(key) = whisper_api_key {
                    active.whisper_api_key = Set(Some(key));
                }
                if let Some(model) = whisper_model {
                    active.whisper_model = Set(model);
                }
                active.updated_at = Set(now);
                active.update(self.conn()).await.map_err(Into::into)
            }
            None => SpeechConfigActiveModel {
                provider: Set(provider.unwrap_or_else(|| PROVIDER_WEB_SPEECH.to_string())),
                whisper_api_url: Set(whisper_api_url),
                whisper_api_key: Set(whisper_api_key),
                whisper_model: Set(whisper_model.unwrap_or_else(|| "whisper-1".to_string())),
                is_active: Set(true),
                updated_at: Set(now),
                ..Default::default()
            }
            .insert(self.conn())
            .await
            .map_err(Into::into),
        }
    }

    // ========================================================================
    // System Setting Operations
    // ========================================================================

    /// Read a setting value
    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        Ok(SystemSettingEntity::find_by_id(key.to_string())
            .one(self.conn())
            .await?
            .map(|s| s.value))
    }

    /// Insert or overwrite a setting
    pub async fn set_setting(&self, key: &str, value: String) -> Result<()> {
        let now = Utc::now();

        match SystemSettingEntity::find_by_id(key.to_string())
            .one(self.conn())
            .await?
        {
            Some(existing) => {
                let mut active = existing.into_active_model();
                active.value = Set(value);
                active.updated_at = Set(now);
                active.update(self.conn()).await?;
            }
            None => {
                SystemSettingActiveModel {
                    key: Set(key.to_string()),
                    value: Set(value),
                    updated_at: Set(now),
                }
                .insert(self.conn())
                .await?;
            }
        }

        Ok(())
    }

    // ========================================================================
    // Import Task Operations
    // ========================================================================

    /// Create a pending import task
    pub async fn create_import_task(
        &self,
        file_name: String,
        file_type: &str,
        kind: ImportKind,
        raw_text: String,
    ) -> Result<ImportTask> {
        let now = Utc::now();

        ImportTaskActiveModel {
            file_name: Set(file_name),
            file_type: Set(file_type.to_string()),
            import_type: Set(kind.as_str().to_string()),
            status: Set(ImportStatus::Pending.as_str().to_string()),
            raw_text: Set(Some(raw_text)),
            result_summary: Set(None),
            error_message: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.conn())
        .await
        .map_err(Into::into)
    }

    /// Find an import task by id
    pub async fn find_import_task(&self, id: i32) -> Result<Option<ImportTask>> {
        ImportTaskEntity::find_by_id(id)
            .one(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Most recent import tasks
    pub async fn list_import_tasks(&self, limit: u64) -> Result<Vec<ImportTask>> {
        ImportTaskEntity::find()
            .order_by_desc(ImportTaskColumn::CreatedAt)
            .order_by_desc(ImportTaskColumn::Id)
            .limit(limit)
            .all(self.conn())
            .await
            .map_err(Into::into)
    }

    /// Move a task to its next status; illegal transitions are rejected
    pub async fn transition_import_task(
        &self,
        id: i32,
        next: ImportStatus,
        result_summary: Option<String>,
        error_message: Option<String>,
    ) -> Result<ImportTask> {
        let task = self
            .find_import_task(id)
            .await?
            .ok_or(AppError::ImportTaskNotFound { id })?;

        let current = task.import_status();
        if !current.can_transition_to(next) {
            return Err(AppError::Internal {
                message: format!(
                    "import task {} cannot move from {} to {}",
                    id,
                    current.as_str(),
                    next.as_str()
                ),
            });
        }

        let mut active = task.into_active_model();
        active.status = Set(next.as_str().to_string());
        if result_summary.is_some() {
            active.result_summary = Set(result_summary);
        }
        if error_message.is_some() {
            active.error_message = Set(error_message);
        }
        active.updated_at = Set(Utc::now());

        active.update(self.conn()).await.map_err(Into::into)
    }
}

fn imported_question_model(q: ImportedQuestion, now: DateTime<Utc>) -> QuestionActiveModel {
    QuestionActiveModel {
        category: Set(q.category),
        content: Set(q.content),
        analysis: Set(q.analysis),
        reference_answer: Set(q.reference_answer),
        image_url: Set(None),
        tags: Set(None),
        source: Set(Some(SOURCE_IMPORT.to_string())),
        is_deleted: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
}

fn map_unique_violation(err: DbErr, answer_id: i32) -> AppError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => AppError::AlreadyAnalyzed { answer_id },
        _ => AppError::Database(err),
    }
}
