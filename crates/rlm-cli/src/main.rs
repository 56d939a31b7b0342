use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::json;

use rlm_core::config::Config;
use rlm_core::logging::{read_log, LogEvent};

#[derive(Parser)]
#[command(
    name = "rlm",
    about = "Recursive language model engine — answer long-context queries through a REPL-driven agent tree",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (JSON5)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a query through the engine
    Run {
        /// The query (and context) for the root agent
        query: String,

        /// Log filename prefix (default: run)
        #[arg(long)]
        prefix: Option<String>,

        /// Log directory (default: ./logs)
        #[arg(long)]
        log_dir: Option<PathBuf>,

        /// Override the primary agent model
        #[arg(long)]
        model: Option<String>,
    },

    /// Print aggregate stats for a JSONL run log
    Log {
        /// Path to the .jsonl log file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    match cli.command {
        Commands::Run {
            query,
            prefix,
            log_dir,
            model,
        } => {
            let config_path = cli.config.unwrap_or_else(Config::default_path);
            let mut config = Config::load(&config_path)?;
            if let Some(model) = model {
                config.primary_agent = model;
            }

            let outcome = rlm_agent::run(
                &query,
                Some(config),
                prefix.as_deref(),
                log_dir.as_deref(),
            )
            .await?;

            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "results": outcome.results,
                    "usage": outcome.usage,
                }))?
            );
            tracing::info!(log_file = %outcome.log_file.display(), "log saved");
        }

        Commands::Log { file } => {
            print_stats(&file)?;
        }
    }

    Ok(())
}

/// Aggregate a run log: runs, depth, steps, tokens, cost.
fn print_stats(path: &std::path::Path) -> anyhow::Result<()> {
    let records = read_log(path)?;
    if records.is_empty() {
        println!("No log entries found.");
        return Ok(());
    }

    #[derive(Default)]
    struct RunStats {
        depth: u32,
        steps: usize,
    }

    let mut runs: BTreeMap<String, RunStats> = BTreeMap::new();
    let mut total_tokens: u64 = 0;
    let mut total_cost: f64 = 0.0;

    for record in &records {
        let entry = runs.entry(record.run_id.clone()).or_default();
        entry.depth = record.depth;
        if let LogEvent::CodeGenerated { usage, .. } = &record.event {
            entry.steps += 1;
            total_tokens += usage.total_tokens;
            total_cost += usage.cost.unwrap_or(0.0);
        }
    }

    let max_depth = records.iter().map(|r| r.depth).max().unwrap_or(0);
    let roots = runs.values().filter(|r| r.depth == 0).count();

    println!("Log entries:  {}", records.len());
    println!("Total runs:   {}", runs.len());
    println!("Root runs:    {roots}");
    println!("Max depth:    {max_depth}");
    println!("Total tokens: {total_tokens}");
    println!("Total cost:   ${total_cost:.6}");

    Ok(())
}
