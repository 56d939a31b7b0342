//! OpenAI-compatible chat completions client.
//!
//! Works against any `/chat/completions` endpoint (OpenRouter by default).
//! Reasoning traces and the `cost` usage field are passed through when the
//! provider supplies them; `cost` in particular is optional on most backends.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use rlm_core::error::{Result, RlmError};
use rlm_core::usage::UsageRecord;

use crate::{ChatMessage, Completion, LlmClient};

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, base_url: Option<&str>) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Resolve credentials from the environment: `RLM_API_KEY` (fallback
    /// `OPENROUTER_API_KEY`) and `RLM_BASE_URL`. A missing key is fatal.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("RLM_API_KEY")
            .or_else(|_| std::env::var("OPENROUTER_API_KEY"))
            .map_err(|_| {
                RlmError::Config(
                    "RLM_API_KEY environment variable is missing or empty; \
                     set it to your API key, e.g. export RLM_API_KEY='sk-...'"
                        .into(),
                )
            })?;
        let base_url = std::env::var("RLM_BASE_URL").ok();
        Ok(Self::new(api_key, base_url.as_deref()))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

// --- wire types ---

#[derive(Debug, serde::Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
    #[serde(default)]
    prompt_tokens_details: Option<PromptTokensDetails>,
    #[serde(default)]
    completion_tokens_details: Option<CompletionTokensDetails>,
    #[serde(default)]
    cost: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct PromptTokensDetails {
    #[serde(default)]
    cached_tokens: u64,
}

#[derive(Debug, Default, Deserialize)]
struct CompletionTokensDetails {
    #[serde(default)]
    reasoning_tokens: u64,
}

impl From<ApiUsage> for UsageRecord {
    fn from(usage: ApiUsage) -> Self {
        UsageRecord {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            cached_tokens: usage
                .prompt_tokens_details
                .map(|d| d.cached_tokens)
                .unwrap_or(0),
            reasoning_tokens: usage
                .completion_tokens_details
                .map(|d| d.reasoning_tokens)
                .unwrap_or(0),
            cost: usage.cost,
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(&self, messages: &[ChatMessage], model: &str) -> Result<Completion> {
        let body = ChatRequest { model, messages };

        debug!(model, base_url = %self.base_url, messages = messages.len(), "chat completion request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| RlmError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RlmError::Transport(format!(
                "chat completions returned {status}: {body}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| RlmError::Transport(format!("invalid completion body: {e}")))?;

        let message = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .unwrap_or_default();

        // A reasoning trace with empty content still counts as empty.
        let content = match message.content {
            Some(content) if !content.is_empty() => content,
            _ => return Err(RlmError::EmptyResponse),
        };

        Ok(Completion {
            content,
            reasoning: message.reasoning.filter(|r| !r.is_empty()),
            usage: parsed.usage.map(UsageRecord::from).unwrap_or_default(),
        })
    }
}
