//! LLM transport abstraction.
//!
//! The engine depends only on [`LlmClient::generate`]: ordered chat messages
//! in, whole completion (content + optional reasoning + usage) out. Retries
//! are a policy decision left to callers; the engine does not retry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use rlm_core::error::Result;
use rlm_core::usage::UsageRecord;

pub mod openai;

pub use openai::OpenAiClient;

/// Chat roles accepted by the completions API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A whole (non-streamed) completion.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub reasoning: Option<String>,
    pub usage: UsageRecord,
}

/// The LLM transport contract the engine consumes.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, messages: &[ChatMessage], model: &str) -> Result<Completion>;
}
