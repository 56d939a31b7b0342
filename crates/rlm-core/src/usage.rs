//! Token and cost accounting shared across every agent in a run tree.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{BudgetKind, Result, RlmError};

/// Per-response token counts and cost. Additive: the all-zeros record is the
/// identity. `cost` is optional because not all providers report it; an absent
/// cost contributes nothing to the total.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub cached_tokens: u64,
    #[serde(default)]
    pub reasoning_tokens: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

impl UsageRecord {
    pub fn accumulate(&mut self, other: &UsageRecord) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
        self.cached_tokens += other.cached_tokens;
        self.reasoning_tokens += other.reasoning_tokens;
        self.cost = match (self.cost, other.cost) {
            (None, None) => None,
            (a, b) => Some(a.unwrap_or(0.0) + b.unwrap_or(0.0)),
        };
    }
}

impl std::ops::Add for UsageRecord {
    type Output = UsageRecord;

    fn add(mut self, rhs: UsageRecord) -> UsageRecord {
        self.accumulate(&rhs);
        self
    }
}

/// Process-wide usage aggregation and budget enforcement.
///
/// One tracker is shared by the whole agent tree. Children report usage from
/// the REPL worker thread while the parent awaits, so the total sits behind a
/// mutex.
#[derive(Debug, Default)]
pub struct UsageTracker {
    total: Mutex<UsageRecord>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, usage: &UsageRecord) {
        self.lock().accumulate(usage);
    }

    /// Snapshot of the running total.
    pub fn total(&self) -> UsageRecord {
        self.lock().clone()
    }

    pub fn total_prompt_tokens(&self) -> u64 {
        self.lock().prompt_tokens
    }

    pub fn total_completion_tokens(&self) -> u64 {
        self.lock().completion_tokens
    }

    pub fn total_cost(&self) -> Option<f64> {
        self.lock().cost
    }

    /// Fail once any global ceiling is crossed. Invoked after every LLM
    /// response has been recorded, so totals may overshoot a cap by at most
    /// one response. A provider that never reports cost leaves the cost cap
    /// advisory.
    pub fn check_budgets(&self, config: &Config) -> Result<()> {
        let total = self.total();

        if let Some(cost) = total.cost {
            if cost > config.max_money_spent {
                return Err(RlmError::BudgetExceeded {
                    kind: BudgetKind::Cost,
                    detail: format!(
                        "${cost:.4} spent, limit is ${}",
                        config.max_money_spent
                    ),
                });
            }
        }
        if total.completion_tokens > config.max_completion_tokens {
            return Err(RlmError::BudgetExceeded {
                kind: BudgetKind::CompletionTokens,
                detail: format!(
                    "{} completion tokens used, limit is {}",
                    total.completion_tokens, config.max_completion_tokens
                ),
            });
        }
        if total.prompt_tokens > config.max_prompt_tokens {
            return Err(RlmError::BudgetExceeded {
                kind: BudgetKind::PromptTokens,
                detail: format!(
                    "{} prompt tokens used, limit is {}",
                    total.prompt_tokens, config.max_prompt_tokens
                ),
            });
        }

        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, UsageRecord> {
        self.total.lock().unwrap_or_else(|e| e.into_inner())
    }
}
