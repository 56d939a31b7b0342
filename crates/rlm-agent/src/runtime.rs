//! The per-agent step loop.
//!
//! One iteration: call the LLM on the transcript, register usage and check
//! the global budgets, extract the last ```repl block, execute it against the
//! session, emit `code_generated` + `execution_result`, then either return
//! the terminal value or echo the truncated output back and go again.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use rlm_core::error::{Result, RlmError};
use rlm_core::logging::{timestamp, RunLogger, StepTimestamps};
use rlm_repl::{ReplHandle, SessionSpec};

use crate::prompt;
use crate::transcript::{extract_repl_block, truncate_output, Transcript};
use crate::{Engine, SubagentRunner};

const NO_CODE_BLOCK_REMINDER: &str =
    "No code block detected; please produce one fenced ```repl code block.";

pub(crate) struct AgentLoop {
    engine: Arc<Engine>,
    query: String,
    depth: u32,
    model: String,
    logger: RunLogger,
}

impl AgentLoop {
    pub fn new(
        engine: Arc<Engine>,
        query: String,
        depth: u32,
        parent_run_id: Option<String>,
    ) -> Self {
        let logger = RunLogger::new(engine.sink.clone(), parent_run_id, depth);
        let model = engine.config.model_for_depth(depth).to_owned();
        Self {
            engine,
            query,
            depth,
            model,
            logger,
        }
    }

    /// Drive the loop to a terminal state. `agent_end` is emitted on every
    /// terminal state, success or not.
    pub async fn run(self) -> Result<Value> {
        self.logger.agent_start()?;
        debug!(run_id = %self.logger.run_id(), depth = self.depth, model = %self.model, "agent start");

        let outcome = self.step_loop().await;

        if let Err(e) = self.logger.agent_end() {
            warn!(run_id = %self.logger.run_id(), error = %e, "failed to log agent_end");
        }
        outcome
    }

    async fn step_loop(&self) -> Result<Value> {
        let config = &self.engine.config;
        let is_leaf = self.depth >= config.max_depth;

        let repl = ReplHandle::spawn(SessionSpec {
            context: Value::String(self.query.clone()),
            depth: self.depth,
            max_depth: config.max_depth,
            run_id: self.logger.run_id().to_owned(),
            runner: Arc::new(SubagentRunner {
                engine: self.engine.clone(),
            }),
            setup_code: None,
        })
        .await?;

        let mut transcript = Transcript::new(
            prompt::system_prompt(is_leaf, config.truncate_len),
            &self.query,
        );

        for step in 0..config.max_calls_per_subagent {
            let llm_call_start = timestamp();
            let completion = self
                .engine
                .client
                .generate(transcript.messages(), &self.model)
                .await?;
            let llm_call_end = timestamp();

            self.engine.tracker.add(&completion.usage);
            self.engine.tracker.check_budgets(config)?;

            transcript.push_assistant(&completion.content);

            let Some(code) = extract_repl_block(&completion.content) else {
                // still a step: it consumed an LLM call and counts toward the limit
                self.logger.code_generated(
                    step,
                    "",
                    completion.reasoning.as_deref(),
                    &completion.usage,
                    &StepTimestamps {
                        llm_call_start: Some(llm_call_start),
                        llm_call_end: Some(llm_call_end),
                        ..StepTimestamps::default()
                    },
                )?;
                transcript.push_user(NO_CODE_BLOCK_REMINDER);
                continue;
            };

            let execution_start = timestamp();
            let outcome = repl.execute(&code).await?;
            let execution_end = timestamp();

            let timestamps = StepTimestamps {
                llm_call_start: Some(llm_call_start),
                llm_call_end: Some(llm_call_end),
                execution_start: Some(execution_start),
                execution_end: Some(execution_end),
            };
            self.logger.code_generated(
                step,
                &code,
                completion.reasoning.as_deref(),
                &completion.usage,
                &timestamps,
            )?;
            self.logger
                .execution_result(step, &outcome.output, outcome.has_error, &timestamps)?;

            if let Some(value) = outcome.terminal {
                self.logger.final_result(&value)?;
                debug!(run_id = %self.logger.run_id(), step, "final result produced");
                return Ok(value);
            }

            transcript.push_user(&format!(
                "Output:\n{}",
                truncate_output(&outcome.output, config.truncate_len)
            ));
        }

        Err(RlmError::CallLimitExceeded {
            limit: config.max_calls_per_subagent,
        })
    }
}
