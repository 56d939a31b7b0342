//! Per-agent Python REPL substrate.
//!
//! Each agent owns one [`ReplHandle`]. The interpreter lives on a dedicated
//! worker thread; commands travel over an mpsc channel and answers return
//! over oneshot channels, so `execute()` is awaitable and Python execution
//! never blocks the async runtime. Globals persist across executions for the
//! lifetime of the session.

pub mod convert;
mod session;

pub use session::ExecOutcome;

use std::sync::Arc;
use std::thread;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use rlm_core::error::{Result, RlmError};

use crate::session::ReplEnv;

/// Spawns a child agent on behalf of `llm_query` and returns its terminal
/// value. Implemented by the engine; kept as a trait object here so the REPL
/// layer needs no knowledge of the agent loop.
#[async_trait]
pub trait RecursiveRunner: Send + Sync {
    async fn run_child(
        &self,
        query: String,
        depth: u32,
        parent_run_id: String,
    ) -> Result<serde_json::Value>;
}

/// Everything needed to seed a session's globals.
pub struct SessionSpec {
    /// Bound to the `context` variable inside the REPL.
    pub context: serde_json::Value,
    /// Depth of the agent owning this session; children spawn at `depth + 1`.
    pub depth: u32,
    pub max_depth: u32,
    /// Run id of the owning agent, recorded as the parent of spawned children.
    pub run_id: String,
    pub runner: Arc<dyn RecursiveRunner>,
    /// Optional host-provided Python run once at session start, after the
    /// engine builtins; the place to seed extra tool bindings.
    pub setup_code: Option<String>,
}

enum ReplCommand {
    Execute {
        code: String,
        response: oneshot::Sender<Result<ExecOutcome>>,
    },
    Shutdown,
}

/// Async handle to a session living on its own worker thread.
pub struct ReplHandle {
    sender: mpsc::UnboundedSender<ReplCommand>,
}

impl ReplHandle {
    /// Spawn the worker thread, build the interpreter, and seed the session.
    /// Resolves once the session is ready (or failed to initialize).
    pub async fn spawn(spec: SessionSpec) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| RlmError::Repl(format!("tokio runtime handle unavailable: {e}")))?;
        let run_id = spec.run_id.clone();

        let (sender, mut receiver) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        thread::Builder::new()
            .name("rlm-repl".to_owned())
            .spawn(move || {
                let mut env = match ReplEnv::new(spec, runtime) {
                    Ok(env) => {
                        let _ = ready_tx.send(Ok(()));
                        env
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                while let Some(command) = receiver.blocking_recv() {
                    match command {
                        ReplCommand::Execute { code, response } => {
                            let _ = response.send(env.execute(&code));
                        }
                        ReplCommand::Shutdown => break,
                    }
                }
                debug!(%run_id, "repl worker stopped");
            })
            .map_err(|e| RlmError::Repl(format!("failed to spawn repl worker: {e}")))?;

        ready_rx
            .await
            .map_err(|_| RlmError::Repl("repl worker died during init".into()))??;

        Ok(Self { sender })
    }

    /// Run one snippet against the session's persistent globals.
    pub async fn execute(&self, code: &str) -> Result<ExecOutcome> {
        let (response_tx, response_rx) = oneshot::channel();
        self.sender
            .send(ReplCommand::Execute {
                code: code.to_owned(),
                response: response_tx,
            })
            .map_err(|_| RlmError::Repl("repl worker is gone".into()))?;
        response_rx
            .await
            .map_err(|_| RlmError::Repl("repl worker dropped the execute response".into()))?
    }
}

impl Drop for ReplHandle {
    fn drop(&mut self) {
        let _ = self.sender.send(ReplCommand::Shutdown);
    }
}
