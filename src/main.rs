//! ReasonBank - CLI entry point.
//!
//! Solves one task per invocation and prints the final answer and judgment.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reasonbank::agent::Agent;
use reasonbank::config::AgentConfig;

const DEFAULT_QUESTION: &str = "Which city had the greater total sales: Wharvton or Algrimand?";

/// Self-improving ReAct task solver backed by a persistent reasoning bank.
#[derive(Parser)]
#[command(name = "reasonbank", version, about)]
struct Cli {
    /// Question to answer
    #[arg(long, default_value = DEFAULT_QUESTION)]
    question: String,

    /// Data file associated with the question, relative to --base-dir
    #[arg(long)]
    file_name: String,

    /// Directory containing task data files
    #[arg(long, default_value = ".")]
    base_dir: PathBuf,

    /// Task identifier (names the run-log directory)
    #[arg(long, default_value_t = 1)]
    task_id: u64,

    /// Run identifier within the task
    #[arg(long, default_value_t = 0)]
    run_id: u32,

    /// Reasoning model identifier
    #[arg(long, default_value = "gpt-4o-mini")]
    model: String,

    /// Run offline with the deterministic simulated model
    #[arg(long)]
    simulate: bool,

    /// Path of the persistent rule store
    #[arg(long, default_value = "memory/bank.json")]
    bank_path: PathBuf,

    /// API key for the live model
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reasonbank=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = AgentConfig::new(cli.model, cli.simulate, cli.bank_path);
    config.api_key = cli.api_key;
    config.base_dir = cli.base_dir;

    let mut agent = Agent::new(config)?;
    let record = agent.run_single(cli.task_id, &cli.question, &cli.file_name, cli.run_id)?;

    println!(
        "final_answer: {}",
        record.final_answer.as_deref().unwrap_or("(none)")
    );
    println!("judgment: {}", record.judgment);
    Ok(())
}
