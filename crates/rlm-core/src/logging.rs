//! Append-only JSONL event log for agent runs.
//!
//! One file per `run()` invocation; every record carries the issuing run's
//! envelope (`run_id`, optional `parent_run_id`, `depth`) so post-hoc tooling
//! can rebuild the agent tree by bucketing on `run_id`. Records within a run
//! are ordered; records across runs interleave freely. Each write is flushed
//! on the event boundary.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::usage::UsageRecord;

/// ISO-8601 UTC timestamp with millisecond precision. Lexicographic order on
/// these strings matches chronological order, which the log contract relies on.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Fresh opaque run identifier.
pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// The four phase timestamps of a step. `code_generated` records carry the
/// LLM phase, `execution_result` records the execution phase; a step that
/// produced no runnable code has no execution phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepTimestamps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_call_start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_call_end: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_end: Option<String>,
}

/// Event payloads, tagged with `event_type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum LogEvent {
    AgentStart,
    CodeGenerated {
        step: u32,
        code: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reasoning: Option<String>,
        usage: UsageRecord,
        timestamps: StepTimestamps,
    },
    ExecutionResult {
        step: u32,
        output: String,
        has_error: bool,
        timestamps: StepTimestamps,
    },
    FinalResult {
        result: serde_json::Value,
    },
    AgentEnd,
}

/// One JSONL record: the run envelope plus the flattened event payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub level: String,
    pub time: String,
    pub run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_run_id: Option<String>,
    pub depth: u32,
    #[serde(flatten)]
    pub event: LogEvent,
}

/// Shared sink for one engine invocation: a line-buffered JSONL file behind a
/// mutex so parent and child runs can interleave records safely.
pub struct LogSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl LogSink {
    /// Create `<dir>/<prefix>_<timestamp>.jsonl` (prefix defaults to `run`).
    pub fn create(dir: &Path, prefix: Option<&str>) -> Result<Arc<Self>> {
        std::fs::create_dir_all(dir)?;

        let stamp = timestamp().replace(':', "-").replace('.', "-");
        let prefix = prefix.unwrap_or("run");
        let path = dir.join(format!("{prefix}_{stamp}.jsonl"));

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;

        debug!(path = %path.display(), "created run log");
        Ok(Arc::new(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, record: &LogRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        let mut writer = self.lock();
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, BufWriter<File>> {
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Per-run logging handle; stamps every record with the run envelope.
#[derive(Clone)]
pub struct RunLogger {
    sink: Arc<LogSink>,
    run_id: String,
    parent_run_id: Option<String>,
    depth: u32,
}

impl RunLogger {
    pub fn new(sink: Arc<LogSink>, parent_run_id: Option<String>, depth: u32) -> Self {
        Self {
            sink,
            run_id: new_run_id(),
            parent_run_id,
            depth,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn agent_start(&self) -> Result<()> {
        self.emit(LogEvent::AgentStart)
    }

    pub fn agent_end(&self) -> Result<()> {
        self.emit(LogEvent::AgentEnd)
    }

    pub fn code_generated(
        &self,
        step: u32,
        code: &str,
        reasoning: Option<&str>,
        usage: &UsageRecord,
        timestamps: &StepTimestamps,
    ) -> Result<()> {
        self.emit(LogEvent::CodeGenerated {
            step,
            code: code.to_owned(),
            reasoning: reasoning.map(str::to_owned),
            usage: usage.clone(),
            timestamps: timestamps.clone(),
        })
    }

    pub fn execution_result(
        &self,
        step: u32,
        output: &str,
        has_error: bool,
        timestamps: &StepTimestamps,
    ) -> Result<()> {
        self.emit(LogEvent::ExecutionResult {
            step,
            output: output.to_owned(),
            has_error,
            timestamps: timestamps.clone(),
        })
    }

    pub fn final_result(&self, result: &serde_json::Value) -> Result<()> {
        self.emit(LogEvent::FinalResult {
            result: result.clone(),
        })
    }

    fn emit(&self, event: LogEvent) -> Result<()> {
        self.sink.write(&LogRecord {
            level: "info".to_owned(),
            time: timestamp(),
            run_id: self.run_id.clone(),
            parent_run_id: self.parent_run_id.clone(),
            depth: self.depth,
            event,
        })
    }
}

/// Re-parse a JSONL log into the records that produced it. Blank lines are
/// skipped; anything else must parse.
pub fn read_log(path: &Path) -> Result<Vec<LogRecord>> {
    let file = File::open(path)?;
    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }
    Ok(records)
}
