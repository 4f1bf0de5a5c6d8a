//! Text-completion backend client (OpenAI-compatible chat completions).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::foundation::error::{TalkreelError, TalkreelResult};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::session::{ConversationTurn, Role};

/// Opaque text-completion service.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Produce the assistant reply for `history` (oldest turn first).
    async fn complete(
        &self,
        history: &[ConversationTurn],
        max_tokens: u32,
    ) -> TalkreelResult<String>;
}

#[derive(Clone, Debug)]
pub struct CompletionConfig {
    /// API root, e.g. `https://openrouter.ai/api/v1`. `/chat/completions` is appended.
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl CompletionConfig {
    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Failure of a single HTTP attempt.
#[derive(Debug)]
enum AttemptError {
    Status { status: StatusCode, body: String },
    Transport(String),
    Malformed(String),
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Status { status, body } => write!(f, "HTTP {status}: {body}"),
            Self::Transport(e) => write!(f, "transport failure: {e}"),
            Self::Malformed(e) => write!(f, "malformed response: {e}"),
        }
    }
}

impl AttemptError {
    fn into_backend_error(self) -> TalkreelError {
        match self {
            Self::Status { status, body } => TalkreelError::backend(Some(status.as_u16()), body),
            Self::Transport(e) => TalkreelError::backend(None, e),
            Self::Malformed(e) => TalkreelError::backend(Some(200), e),
        }
    }
}

/// Retry classification: rate limits, upstream 5xx and network failures are transient.
fn classify(err: &AttemptError) -> RetryDecision {
    match err {
        AttemptError::Status { status, .. } => retry_decision_for_status(*status),
        AttemptError::Transport(_) => RetryDecision::Retry,
        AttemptError::Malformed(_) => RetryDecision::Stop,
    }
}

pub(crate) fn retry_decision_for_status(status: StatusCode) -> RetryDecision {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        RetryDecision::Retry
    } else {
        RetryDecision::Stop
    }
}

/// HTTP client for OpenAI/OpenRouter-style `chat/completions` endpoints.
#[derive(Clone)]
pub struct OpenAiCompletionClient {
    http: reqwest::Client,
    cfg: CompletionConfig,
    retry: RetryPolicy,
}

impl OpenAiCompletionClient {
    pub fn new(cfg: CompletionConfig, retry: RetryPolicy) -> TalkreelResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| TalkreelError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, cfg, retry })
    }

    pub fn model(&self) -> &str {
        &self.cfg.model
    }

    async fn attempt(&self, body: &ChatRequest<'_>) -> Result<String, AttemptError> {
        let resp = self
            .http
            .post(self.cfg.endpoint())
            .bearer_auth(&self.cfg.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AttemptError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AttemptError::Status { status, body });
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| AttemptError::Malformed(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(AttemptError::Malformed(
                "choices[0].message.content is missing or empty".to_string(),
            ));
        }
        Ok(content)
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    #[instrument(skip_all, fields(model = %self.cfg.model, turns = history.len()))]
    async fn complete(
        &self,
        history: &[ConversationTurn],
        max_tokens: u32,
    ) -> TalkreelResult<String> {
        let body = ChatRequest {
            model: &self.cfg.model,
            messages: history
                .iter()
                .map(|t| ChatMessage {
                    role: t.role,
                    content: &t.content,
                })
                .collect(),
            max_tokens,
            temperature: self.cfg.temperature,
        };

        let reply = self
            .retry
            .run("chat_completion", |_| self.attempt(&body), classify)
            .await
            .map_err(AttemptError::into_backend_error)?;

        debug!(reply_chars = reply.chars().count(), "completion received");
        Ok(reply)
    }
}
