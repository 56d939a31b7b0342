//! Recursive agent engine.
//!
//! `run()` starts a root agent for a query. Each agent owns a Python REPL
//! session; code it emits may call `llm_query`, which synchronously spawns a
//! child agent and returns the child's terminal value in-process. All agents
//! in the tree share one usage tracker (global budgets) and one JSONL log.

pub mod prompt;
pub mod runtime;
pub mod transcript;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use rlm_core::config::Config;
use rlm_core::error::Result;
use rlm_core::logging::LogSink;
use rlm_core::usage::{UsageRecord, UsageTracker};
use rlm_providers::{LlmClient, OpenAiClient};
use rlm_repl::RecursiveRunner;

use crate::runtime::AgentLoop;

const DEFAULT_LOG_DIR: &str = "./logs";

/// Outcome of a completed run: the root agent's terminal value, where the
/// JSONL trace went, and what the whole tree consumed.
#[derive(Debug)]
pub struct RunOutcome {
    pub results: Value,
    pub log_file: PathBuf,
    pub usage: UsageRecord,
}

/// Shared engine state handed down the agent tree. Children receive the same
/// tracker and sink; nothing points back up except `parent_run_id` in the log.
pub(crate) struct Engine {
    pub(crate) config: Config,
    pub(crate) tracker: UsageTracker,
    pub(crate) client: Arc<dyn LlmClient>,
    pub(crate) sink: Arc<LogSink>,
}

/// The recursion bridge: `llm_query` lands here and spawns a child loop.
pub(crate) struct SubagentRunner {
    pub(crate) engine: Arc<Engine>,
}

#[async_trait]
impl RecursiveRunner for SubagentRunner {
    async fn run_child(
        &self,
        query: String,
        depth: u32,
        parent_run_id: String,
    ) -> Result<Value> {
        AgentLoop::new(self.engine.clone(), query, depth, Some(parent_run_id))
            .run()
            .await
    }
}

/// Run a query through the engine with credentials from the environment.
///
/// `prefix` names the log file; `log_dir` defaults to `./logs`.
pub async fn run(
    query: &str,
    config: Option<Config>,
    prefix: Option<&str>,
    log_dir: Option<&Path>,
) -> Result<RunOutcome> {
    let config = config.unwrap_or_default();
    let client = Arc::new(OpenAiClient::from_env()?);
    run_with_client(query, config, client, prefix, log_dir).await
}

/// Same as [`run`], but with a caller-supplied transport. This is the
/// embedding seam: tests and hosts inject their own [`LlmClient`] here.
pub async fn run_with_client(
    query: &str,
    config: Config,
    client: Arc<dyn LlmClient>,
    prefix: Option<&str>,
    log_dir: Option<&Path>,
) -> Result<RunOutcome> {
    config.validate()?;

    let sink = LogSink::create(log_dir.unwrap_or(Path::new(DEFAULT_LOG_DIR)), prefix)?;
    info!(log_file = %sink.path().display(), "starting run");

    let engine = Arc::new(Engine {
        config,
        tracker: UsageTracker::new(),
        client,
        sink: sink.clone(),
    });

    let results = AgentLoop::new(engine.clone(), query.to_owned(), 0, None)
        .run()
        .await?;

    let usage = engine.tracker.total();
    info!(
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        "run finished"
    );

    Ok(RunOutcome {
        results,
        log_file: sink.path().to_owned(),
        usage,
    })
}
