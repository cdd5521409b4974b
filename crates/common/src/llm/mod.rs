//! Chat completion client abstraction
//!
//! Speaks the OpenAI-compatible `/chat/completions` protocol, buffered or
//! streamed. Clients are built per request from the active `ModelConfig`
//! through a `ChatClientFactory`, so tests can swap in a scripted provider.

use crate::db::models::ModelConfig;
use crate::errors::{AppError, Result};
use async_stream::stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Stream of text fragments from a streamed completion
pub type ChunkStream = BoxStream<'static, Result<String>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

/// One completion request
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ChatRequest {
    /// System + user message pair
    pub fn new(system: &str, user: String, temperature: f32, max_tokens: u32) -> Self {
        Self {
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            temperature,
            max_tokens,
        }
    }
}

/// Trait for chat completion providers
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Run a completion and return the full text
    async fn chat(&self, request: ChatRequest) -> Result<String>;

    /// Run a completion and yield text fragments as they arrive
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChunkStream>;

    /// Model identifier sent to the provider
    fn model_name(&self) -> &str;
}

/// Builds chat clients from stored model configs
pub trait ChatClientFactory: Send + Sync {
    fn create(&self, config: &ModelConfig) -> Result<Arc<dyn ChatClient>>;
}

// ============================================================================
// OpenAI-compatible client
// ============================================================================

/// Client for any endpoint implementing the OpenAI chat completions API
pub struct OpenAiChatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

/// What one `data:` line of a completion stream carries
#[derive(Debug, PartialEq)]
pub(crate) enum SseLine {
    Content(String),
    Done,
    Skip,
}

/// Interpret a single line of an OpenAI-style event stream
pub(crate) fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();

    if data == "[DONE]" {
        return SseLine::Done;
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => {
            let text: String = chunk
                .choices
                .into_iter()
                .filter_map(|c| c.delta.content)
                .collect();
            if text.is_empty() {
                SseLine::Skip
            } else {
                SseLine::Content(text)
            }
        }
        Err(e) => {
            debug!(error = %e, "Ignoring undecodable stream line");
            SseLine::Skip
        }
    }
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Internal {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), body = %body.chars().take(500).collect::<String>(), "AI service error");
    Err(AppError::Upstream {
        message: format!("AI service returned status {}", status.as_u16()),
    })
}

impl OpenAiChatClient {
    /// Create a client for one endpoint and model
    pub fn new(base_url: &str, api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    async fn send(&self, request: &ChatRequest, stream: bool) -> Result<reqwest::Response> {
        let body = CompletionRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream,
        };

        let response = self
            .client
            .post(endpoint(&self.base_url, "chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        ensure_success(response).await
    }
}

#[async_trait]
impl ChatClient for OpenAiChatClient {
    async fn chat(&self, request: ChatRequest) -> Result<String> {
        let response = self.send(&request, false).await?;

        let parsed: CompletionResponse = response.json().await.map_err(|e| AppError::Upstream {
            message: format!("Failed to parse AI response: {}", e),
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AppError::Upstream {
                message: "AI service returned no choices".to_string(),
            })
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<ChunkStream> {
        let response = self.send(&request, true).await?;
        let mut bytes = response.bytes_stream();

        let stream = stream! {
            // Raw bytes until a full line arrives; a multi-byte character
            // may be split across network chunks.
            let mut buf: Vec<u8> = Vec::new();

            'read: while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(AppError::from(e));
                        return;
                    }
                };
                buf.extend_from_slice(&chunk);

                while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=pos).collect();
                    match parse_sse_line(&String::from_utf8_lossy(&line)) {
                        SseLine::Content(text) => yield Ok(text),
                        SseLine::Done => break 'read,
                        SseLine::Skip => {}
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Fetch the model ids an endpoint advertises
pub async fn list_models(base_url: &str, api_key: &str, timeout: Duration) -> Result<Vec<String>> {
    let response = http_client(timeout)?
        .get(endpoint(base_url, "models"))
        .bearer_auth(api_key)
        .send()
        .await?;

    let list: ModelList = ensure_success(response)
        .await?
        .json()
        .await
        .map_err(|e| AppError::Upstream {
            message: format!("Failed to parse model list: {}", e),
        })?;

    Ok(list.data.into_iter().map(|m| m.id).collect())
}

/// Factory producing `OpenAiChatClient`s
pub struct OpenAiChatFactory {
    timeout: Duration,
}

impl OpenAiChatFactory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ChatClientFactory for OpenAiChatFactory {
    fn create(&self, config: &ModelConfig) -> Result<Arc<dyn ChatClient>> {
        let client = OpenAiChatClient::new(
            &config.base_url,
            &config.api_key,
            &config.model_name,
            self.timeout,
        )?;
        Ok(Arc::new(client))
    }
}

// ============================================================================
// Scripted provider
// ============================================================================

/// Canned behaviour for the scripted provider
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Fragments returned in order; `chat` returns them joined
    pub chunks: Vec<String>,
    /// Fail with this upstream message after the chunks
    pub error: Option<String>,
    /// Hang forever after this many fragments have been yielded
    pub stall_after: Option<usize>,
}

impl Script {
    pub fn reply(text: &str) -> Self {
        Self { chunks: vec![text.to_string()], ..Default::default() }
    }

    pub fn chunks(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self { error: Some(message.to_string()), ..Default::default() }
    }

    pub fn stalling_after(mut self, n: usize) -> Self {
        self.stall_after = Some(n);
        self
    }
}

/// Offline provider replaying a `Script`, recording every request
pub struct ScriptedChatClient {
    model: String,
    script: Script,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl ScriptedChatClient {
    pub fn new(model: &str, script: Script) -> Self {
        Self {
            model: model.to_string(),
            script,
            requests: Arc::default(),
        }
    }

    fn record(&self, request: ChatRequest) {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);
    }
}

#[async_trait]
impl ChatClient for ScriptedChatClient {
    async fn chat(&self, request: ChatRequest) -> Result<String> {
        self.record(request);
        match &self.script.error {
            Some(message) => Err(AppError::Upstream { message: message.clone() }),
            None => Ok(self.script.chunks.concat()),
        }
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<ChunkStream> {
        self.record(request);
        let script = self.script.clone();

        let stream = stream! {
            for (idx, chunk) in script.chunks.into_iter().enumerate() {
                if script.stall_after == Some(idx) {
                    futures::future::pending::<()>().await;
                }
                yield Ok(chunk);
            }
            if let Some(message) = script.error {
                yield Err(AppError::Upstream { message });
            }
        };

        Ok(Box::pin(stream))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Factory handing out `ScriptedChatClient`s that share one request log
#[derive(Default)]
pub struct ScriptedChatFactory {
    script: Mutex<Script>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl ScriptedChatFactory {
    pub fn new(script: Script) -> Self {
        Self {
            script: Mutex::new(script),
            requests: Arc::default(),
        }
    }

    /// Replace the script used by clients created from now on
    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap_or_else(|e| e.into_inner()) = script;
    }

    /// Every request seen so far
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl ChatClientFactory for ScriptedChatFactory {
    fn create(&self, config: &ModelConfig) -> Result<Arc<dyn ChatClient>> {
        let script = self.script.lock().unwrap_or_else(|e| e.into_inner()).clone();
        Ok(Arc::new(ScriptedChatClient {
            model: config.model_name.clone(),
            script,
            requests: self.requests.clone(),
        }))
    }
}
