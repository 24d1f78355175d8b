use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{Config, HTTP_TIMEOUT_SECS, LLM_INLINE_ERROR_RETRY_SECS};
use crate::error::{AppError, Result};
use crate::types::TokenUsage;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
    pub json_schema: JsonSchemaFormat,
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonSchemaFormat {
    pub name: String,
    pub strict: bool,
    pub schema: Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<UsageBody>,
    #[serde(default)]
    error: Option<InlineError>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct UsageBody {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct InlineError {
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    message: String,
}

/// Answer of one completion call. `content` is whatever the model returned:
/// usually a JSON document encoded as a string, sometimes an object.
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub content: Value,
    pub usage: TokenUsage,
}

// ---------------------------------------------------------------------------
// Service seam
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion>;
}

/// OpenAI-compatible chat completions over OpenRouter.
pub struct OpenRouterClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    inline_error_delay: Duration,
}

impl OpenRouterClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            base_url: cfg.openrouter_api_url.trim_end_matches('/').to_string(),
            api_key: cfg.openrouter_api_key.clone(),
            inline_error_delay: Duration::from_secs(LLM_INLINE_ERROR_RETRY_SECS),
        })
    }

    async fn send_once(&self, request: &ChatRequest) -> Result<ChatCompletion> {
        debug!(model = %request.model, "Sending chat completion request");

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(AppError::Status {
                endpoint: "chat/completions".to_string(),
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        parse_chat_response(&body)
    }
}

#[async_trait]
impl ReasoningService for OpenRouterClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion> {
        retry_inline_error(self.inline_error_delay, move || self.send_once(request)).await
    }
}

/// Run `op`, and run it once more after `delay` if the service reported an
/// in-band error. Every other outcome is returned as is.
pub async fn retry_inline_error<T, F, Fut>(delay: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match op().await {
        Err(AppError::RateLimited(msg)) => {
            warn!("Reasoning service reported an error ({msg}), retrying in {}s", delay.as_secs());
            tokio::time::sleep(delay).await;
            op().await
        }
        other => other,
    }
}

/// Decode a 200 response body. An `error` object in the body is reported as
/// `RateLimited` even though the transport succeeded.
pub fn parse_chat_response(body: &str) -> Result<ChatCompletion> {
    let parsed: ChatResponse = serde_json::from_str(body)?;

    if let Some(err) = parsed.error {
        let code = err.code.map(|c| c.to_string()).unwrap_or_else(|| "?".to_string());
        return Err(AppError::RateLimited(format!("{code}: {}", err.message)));
    }

    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| AppError::InvalidResponse("completion has no message content".to_string()))?;

    let usage = parsed
        .usage
        .map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        })
        .unwrap_or_default();

    Ok(ChatCompletion { content, usage })
}
