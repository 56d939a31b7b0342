//! End-to-end engine scenarios driven by a scripted LLM.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;

use rlm_agent::{run_with_client, RunOutcome};
use rlm_core::config::Config;
use rlm_core::error::{BudgetKind, Result, RlmError};
use rlm_core::logging::{read_log, LogEvent, LogRecord};
use rlm_core::usage::UsageRecord;
use rlm_providers::{ChatMessage, Completion, LlmClient};

/// Replays canned completions in order, across the whole agent tree.
struct ScriptedClient {
    responses: Mutex<VecDeque<Completion>>,
}

impl ScriptedClient {
    fn new(responses: Vec<Completion>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
        })
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn generate(&self, _messages: &[ChatMessage], _model: &str) -> Result<Completion> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| RlmError::Transport("script exhausted".into()))
    }
}

fn reply(content: &str) -> Completion {
    Completion {
        content: content.to_owned(),
        reasoning: None,
        usage: UsageRecord {
            prompt_tokens: 100,
            completion_tokens: 10,
            total_tokens: 110,
            cached_tokens: 0,
            reasoning_tokens: 0,
            cost: Some(0.0001),
        },
    }
}

fn reply_with_cost(content: &str, cost: f64) -> Completion {
    Completion {
        usage: UsageRecord {
            cost: Some(cost),
            ..reply(content).usage
        },
        ..reply(content)
    }
}

async fn run_scripted(
    query: &str,
    config: Config,
    responses: Vec<Completion>,
) -> (Result<RunOutcome>, Vec<LogRecord>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let outcome = run_with_client(
        query,
        config,
        ScriptedClient::new(responses),
        None,
        Some(dir.path()),
    )
    .await;

    let log_path = std::fs::read_dir(dir.path())
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .path();
    let records = read_log(&log_path).unwrap();
    (outcome, records, dir)
}

fn code_generated<'a>(records: &'a [LogRecord]) -> Vec<&'a LogRecord> {
    records
        .iter()
        .filter(|r| matches!(r.event, LogEvent::CodeGenerated { .. }))
        .collect()
}

fn execution_results<'a>(records: &'a [LogRecord]) -> Vec<&'a LogRecord> {
    records
        .iter()
        .filter(|r| matches!(r.event, LogEvent::ExecutionResult { .. }))
        .collect()
}

fn run_ids(records: &[LogRecord]) -> Vec<String> {
    let mut ids: Vec<String> = records.iter().map(|r| r.run_id.clone()).collect();
    ids.sort();
    ids.dedup();
    ids
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn trivial_final_on_first_turn() {
    let (outcome, records, _dir) = run_scripted(
        "Just call FINAL(42).",
        Config::default(),
        vec![reply("```repl\nFINAL(42)\n```")],
    )
    .await;

    let outcome = outcome.unwrap();
    assert_eq!(outcome.results, json!(42));

    assert_eq!(code_generated(&records).len(), 1);
    assert_eq!(execution_results(&records).len(), 1);

    let finals: Vec<_> = records
        .iter()
        .filter_map(|r| match &r.event {
            LogEvent::FinalResult { result } => Some(result.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(finals, vec![json!(42)]);

    // agent_start ≤ step events ≤ final_result ≤ agent_end, one run only
    assert_eq!(run_ids(&records).len(), 1);
    assert!(matches!(records.first().unwrap().event, LogEvent::AgentStart));
    assert!(matches!(records.last().unwrap().event, LogEvent::AgentEnd));
    for pair in records.windows(2) {
        assert!(pair[0].time <= pair[1].time);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_step_compute() {
    let (outcome, records, _dir) = run_scripted(
        "What is 2+2?",
        Config::default(),
        vec![
            reply("```repl\nx = 2 + 2\nprint(x)\n```"),
            reply("```repl\nFINAL(4)\n```"),
        ],
    )
    .await;

    let outcome = outcome.unwrap();
    assert_eq!(outcome.results, json!(4));
    assert_eq!(code_generated(&records).len(), 2);

    match &execution_results(&records)[0].event {
        LogEvent::ExecutionResult {
            step,
            output,
            has_error,
            ..
        } => {
            assert_eq!(*step, 0);
            assert!(output.contains('4'), "output: {output}");
            assert!(!has_error);
        }
        _ => unreachable!(),
    }

    // usage sums across steps
    assert_eq!(outcome.usage.prompt_tokens, 200);
    assert_eq!(outcome.usage.completion_tokens, 20);
    let logged: u64 = records
        .iter()
        .filter_map(|r| match &r.event {
            LogEvent::CodeGenerated { usage, .. } => Some(usage.prompt_tokens),
            _ => None,
        })
        .sum();
    assert_eq!(logged, outcome.usage.prompt_tokens);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn recursion_spawns_child_within_parent_step() {
    let (outcome, records, _dir) = run_scripted(
        "Delegate this: count letters in 'hello'.",
        Config::default(),
        vec![
            reply("```repl\nsub = llm_query(\"count letters in 'hello'\")\nFINAL(sub)\n```"),
            reply("```repl\nFINAL(5)\n```"),
        ],
    )
    .await;

    assert_eq!(outcome.unwrap().results, json!(5));
    assert_eq!(run_ids(&records).len(), 2);

    let root_id = records
        .iter()
        .find(|r| r.depth == 0)
        .map(|r| r.run_id.clone())
        .unwrap();
    let child_records: Vec<_> = records.iter().filter(|r| r.depth == 1).collect();
    assert!(!child_records.is_empty());
    for record in &child_records {
        assert_eq!(record.parent_run_id.as_deref(), Some(root_id.as_str()));
    }

    // the child's whole lifetime falls inside the parent's step 0 execution window
    let (exec_start, exec_end) = records
        .iter()
        .find_map(|r| match &r.event {
            LogEvent::ExecutionResult { timestamps, .. } if r.depth == 0 => Some((
                timestamps.execution_start.clone().unwrap(),
                timestamps.execution_end.clone().unwrap(),
            )),
            _ => None,
        })
        .unwrap();
    let child_start = child_records
        .iter()
        .find(|r| matches!(r.event, LogEvent::AgentStart))
        .map(|r| r.time.clone())
        .unwrap();
    let child_end = child_records
        .iter()
        .find(|r| matches!(r.event, LogEvent::AgentEnd))
        .map(|r| r.time.clone())
        .unwrap();
    assert!(exec_start <= child_start && child_start <= exec_end);
    assert!(exec_start <= child_end && child_end <= exec_end);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn budget_trip_aborts_after_first_call() {
    let config = Config {
        max_money_spent: 0.001,
        ..Config::default()
    };
    let (outcome, records, _dir) = run_scripted(
        "Anything.",
        config,
        vec![reply_with_cost("```repl\nFINAL('never runs')\n```", 0.01)],
    )
    .await;

    match outcome {
        Err(RlmError::BudgetExceeded { kind, .. }) => assert_eq!(kind, BudgetKind::Cost),
        other => panic!("expected BudgetExceeded, got {other:?}"),
    }

    // no final_result, but the run was closed out
    assert!(!records
        .iter()
        .any(|r| matches!(r.event, LogEvent::FinalResult { .. })));
    assert!(records
        .iter()
        .any(|r| matches!(r.event, LogEvent::AgentEnd)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn call_limit_after_exactly_two_steps() {
    let config = Config {
        max_calls_per_subagent: 2,
        ..Config::default()
    };
    let (outcome, records, _dir) = run_scripted(
        "Never finish.",
        config,
        vec![
            reply("```repl\nprint('step one')\n```"),
            reply("```repl\nprint('step two')\n```"),
        ],
    )
    .await;

    match outcome {
        Err(RlmError::CallLimitExceeded { limit }) => assert_eq!(limit, 2),
        other => panic!("expected CallLimitExceeded, got {other:?}"),
    }
    assert_eq!(code_generated(&records).len(), 2);

    // step indices are contiguous from 0
    let steps: Vec<u32> = records
        .iter()
        .filter_map(|r| match &r.event {
            LogEvent::CodeGenerated { step, .. } => Some(*step),
            _ => None,
        })
        .collect();
    assert_eq!(steps, vec![0, 1]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn depth_limit_raises_inside_parent_repl() {
    let config = Config {
        max_depth: 0,
        ..Config::default()
    };
    let (outcome, records, _dir) = run_scripted(
        "Try to delegate anyway.",
        config,
        vec![
            reply("```repl\nllm_query('should fail')\n```"),
            reply("```repl\nFINAL('recovered')\n```"),
        ],
    )
    .await;

    assert_eq!(outcome.unwrap().results, json!("recovered"));

    // no child run was created
    assert_eq!(run_ids(&records).len(), 1);

    match &execution_results(&records)[0].event {
        LogEvent::ExecutionResult {
            output, has_error, ..
        } => {
            assert!(*has_error);
            assert!(
                output.contains("MaxDepthExceeded"),
                "output: {output}"
            );
        }
        _ => unreachable!(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn repl_error_then_recovery() {
    let (outcome, records, _dir) = run_scripted(
        "Divide by zero, then recover.",
        Config::default(),
        vec![
            reply("```repl\n1 / 0\n```"),
            reply("```repl\nFINAL('recovered')\n```"),
        ],
    )
    .await;

    assert_eq!(outcome.unwrap().results, json!("recovered"));

    let results = execution_results(&records);
    match (&results[0].event, &results[1].event) {
        (
            LogEvent::ExecutionResult {
                output, has_error, ..
            },
            LogEvent::ExecutionResult {
                has_error: second_error,
                ..
            },
        ) => {
            assert!(*has_error);
            assert!(output.contains("ZeroDivisionError"), "output: {output}");
            assert!(!*second_error);
        }
        _ => unreachable!(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_code_block_gets_reminder_and_continues() {
    let (outcome, records, _dir) = run_scripted(
        "Answer 1.",
        Config::default(),
        vec![
            reply("I will think about this first, without any code."),
            reply("```repl\nFINAL(1)\n```"),
        ],
    )
    .await;

    assert_eq!(outcome.unwrap().results, json!(1));

    // the code-less turn still counts as a step, with no execution
    let generated = code_generated(&records);
    assert_eq!(generated.len(), 2);
    match &generated[0].event {
        LogEvent::CodeGenerated { step, code, .. } => {
            assert_eq!(*step, 0);
            assert!(code.is_empty());
        }
        _ => unreachable!(),
    }
    assert_eq!(execution_results(&records).len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn final_none_returns_null() {
    let (outcome, records, _dir) = run_scripted(
        "Return nothing.",
        Config::default(),
        vec![reply("```repl\nFINAL(None)\n```")],
    )
    .await;

    assert_eq!(outcome.unwrap().results, Value::Null);
    assert!(records
        .iter()
        .any(|r| matches!(&r.event, LogEvent::FinalResult { result } if result.is_null())));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn transport_error_aborts_with_agent_end() {
    let (outcome, records, _dir) =
        run_scripted("No responses scripted.", Config::default(), vec![]).await;

    match outcome {
        Err(RlmError::Transport(_)) => {}
        other => panic!("expected TransportError, got {other:?}"),
    }
    assert!(records
        .iter()
        .any(|r| matches!(r.event, LogEvent::AgentEnd)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn multiple_blocks_last_one_wins() {
    let (outcome, _records, _dir) = run_scripted(
        "Two blocks.",
        Config::default(),
        vec![reply(
            "First attempt:\n```repl\nFINAL('first')\n```\nNo wait:\n```repl\nFINAL('second')\n```",
        )],
    )
    .await;

    assert_eq!(outcome.unwrap().results, json!("second"));
}
