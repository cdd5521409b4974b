//! SeaORM entity models
//!
//! Database entities for the interview practice store

pub(crate) mod question;
pub(crate) mod paper;
pub(crate) mod paper_item;
pub(crate) mod answer;
pub(crate) mod analysis_result;
pub(crate) mod model_config;
pub(crate) mod prompt;
pub(crate) mod speech_config;
pub(crate) mod system_setting;
pub(crate) mod import_task;

pub use question::{
    Entity as QuestionEntity,
    Model as Question,
    ActiveModel as QuestionActiveModel,
    Column as QuestionColumn,
    DEFAULT_CATEGORY, SOURCE_IMPORT, SOURCE_MANUAL,
};

pub use paper::{
    Entity as PaperEntity,
    Model as Paper,
    ActiveModel as PaperActiveModel,
    Column as PaperColumn,
    DEFAULT_IMPORTED_TITLE,
};

pub use paper_item::{
    Entity as PaperItemEntity,
    Model as PaperItem,
    ActiveModel as PaperItemActiveModel,
    Column as PaperItemColumn,
};

pub use answer::{
    Entity as AnswerEntity,
    Model as Answer,
    ActiveModel as AnswerActiveModel,
    Column as AnswerColumn,
    AnswerMode,
};

pub use analysis_result::{
    Entity as AnalysisResultEntity,
    Model as AnalysisResult,
    ActiveModel as AnalysisResultActiveModel,
    Column as AnalysisResultColumn,
    ANALYSIS_TYPE_SINGLE,
};

pub use model_config::{
    Entity as ModelConfigEntity,
    Model as ModelConfig,
    ActiveModel as ModelConfigActiveModel,
    Column as ModelConfigColumn,
    mask_api_key, ModelRole,
};

pub use prompt::{
    Entity as PromptEntity,
    Model as Prompt,
    ActiveModel as PromptActiveModel,
    Column as PromptColumn,
    PromptKind,
};

pub use speech_config::{
    Entity as SpeechConfigEntity,
    Model as SpeechConfig,
    ActiveModel as SpeechConfigActiveModel,
    Column as SpeechConfigColumn,
    PROVIDER_WEB_SPEECH, PROVIDER_WHISPER,
};

pub use system_setting::{
    Entity as SystemSettingEntity,
    Model as SystemSetting,
    ActiveModel as SystemSettingActiveModel,
    Column as SystemSettingColumn,
    MAX_IMPORT_CHARS,
};

pub use import_task::{
    Entity as ImportTaskEntity,
    Model as ImportTask,
    ActiveModel as ImportTaskActiveModel,
    Column as ImportTaskColumn,
    ImportKind, ImportStatus,
};
