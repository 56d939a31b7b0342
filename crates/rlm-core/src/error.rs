use std::fmt;

use thiserror::Error;

/// Which global budget ceiling was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetKind {
    Cost,
    PromptTokens,
    CompletionTokens,
}

impl fmt::Display for BudgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetKind::Cost => write!(f, "cost"),
            BudgetKind::PromptTokens => write!(f, "prompt"),
            BudgetKind::CompletionTokens => write!(f, "completion"),
        }
    }
}

/// Error taxonomy for the engine.
///
/// Display strings for the agent-level kinds embed the kind name: a child
/// failure is re-raised as a plain exception inside the parent's REPL, and the
/// captured output must stay greppable for the original condition.
#[derive(Debug, Error)]
pub enum RlmError {
    #[error("TransportError: {0}")]
    Transport(String),

    #[error("EmptyResponse: provider returned a completion with no content")]
    EmptyResponse,

    #[error("BudgetExceeded({kind}): {detail}")]
    BudgetExceeded { kind: BudgetKind, detail: String },

    #[error("CallLimitExceeded: agent used all {limit} steps without producing a final result")]
    CallLimitExceeded { limit: u32 },

    #[error("MaxDepthExceeded: llm_query at depth {depth} exceeds max_depth {max_depth}; solve this task without delegating")]
    MaxDepthExceeded { depth: u32, max_depth: u32 },

    #[error("REPL error: {0}")]
    Repl(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RlmError>;
