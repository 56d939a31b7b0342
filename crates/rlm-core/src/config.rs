//! Engine configuration.
//!
//! A passive record the host loads and hands to the engine. `load` reads a
//! JSON5 file with `${ENV_VAR}` substitution; a missing file yields defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RlmError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model ID used by the root agent.
    pub primary_agent: String,
    /// Model ID used by every descendant agent.
    pub sub_agent: String,
    /// Maximum recursion depth; the root is depth 0.
    pub max_depth: u32,
    /// Maximum LLM calls per agent before `CallLimitExceeded`.
    pub max_calls_per_subagent: u32,
    /// Character budget for REPL output echoed into the transcript.
    pub truncate_len: usize,
    /// Global cost ceiling in dollars (advisory when the provider omits cost).
    pub max_money_spent: f64,
    /// Global completion-token ceiling across the whole agent tree.
    pub max_completion_tokens: u64,
    /// Global prompt-token ceiling across the whole agent tree.
    pub max_prompt_tokens: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            primary_agent: "z-ai/glm-5".to_string(),
            sub_agent: "minimax/minimax-m2.5".to_string(),
            max_depth: 3,
            max_calls_per_subagent: 20,
            truncate_len: 2000,
            max_money_spent: 1.0,
            max_completion_tokens: 50_000,
            max_prompt_tokens: 200_000,
        }
    }
}

/// Substitute `${ENV_VAR}` references with environment values (empty when unset).
fn substitute_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").unwrap();
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(RlmError::Io)?;
        let substituted = substitute_env_vars(&raw);

        let config: Config =
            json5::from_str(&substituted).map_err(|e| RlmError::Config(e.to_string()))?;
        config.validate()?;

        Ok(config)
    }

    /// Default config file location, relative to the working directory.
    pub fn default_path() -> PathBuf {
        PathBuf::from("rlm.config.json5")
    }

    /// Reject empty model IDs and negative numeric bounds.
    pub fn validate(&self) -> Result<()> {
        if self.primary_agent.is_empty() {
            return Err(RlmError::Config("primary_agent must not be empty".into()));
        }
        if self.sub_agent.is_empty() {
            return Err(RlmError::Config("sub_agent must not be empty".into()));
        }
        if self.max_money_spent < 0.0 {
            return Err(RlmError::Config(format!(
                "max_money_spent must be non-negative, got {}",
                self.max_money_spent
            )));
        }
        Ok(())
    }

    /// The root agent runs the primary model; every descendant runs the sub-agent model.
    pub fn model_for_depth(&self, depth: u32) -> &str {
        if depth == 0 {
            &self.primary_agent
        } else {
            &self.sub_agent
        }
    }
}
