//! CLI module for clawroute
//!
//! Provides commands:
//! - `route`: Route a prompt and print the completion
//! - `classify`: Show the task category a prompt would get
//! - `endpoints`: List configured endpoints and candidates

use clap::{Args, Parser, Subcommand};
use clawroute_core::RequestedCategory;
use std::path::PathBuf;

pub mod inspect;
pub mod route;

/// Task-aware LLM request router
#[derive(Parser, Debug)]
#[command(name = "clawroute")]
#[command(about = "Route prompts to LLM endpoints by task type, with failover")]
#[command(version)]
pub struct Cli {
    /// Extra configuration file layered over the defaults
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Route a prompt and print the completion
    Route(RouteArgs),
    /// Show the task category for a prompt
    Classify {
        /// Prompt text
        prompt: String,
        /// Also print per-category scores
        #[arg(long)]
        scores: bool,
    },
    /// List configured endpoints and candidates
    Endpoints,
}

/// Arguments of `clawroute route`
#[derive(Args, Debug)]
pub struct RouteArgs {
    /// Prompt text
    #[arg(short, long)]
    pub prompt: String,

    /// Task type: auto, chat, reason, reason_strict or tool
    #[arg(short = 't', long = "type", default_value = "auto")]
    pub task: RequestedCategory,

    /// Context summary for reasoning tasks
    #[arg(long)]
    pub context: Option<String>,

    /// JSON schema for tool tasks
    #[arg(long)]
    pub schema: Option<String>,

    /// System prompt replacing the chat persona
    #[arg(long)]
    pub system: Option<String>,

    /// Per-call timeout in milliseconds
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Print chunks as they arrive
    #[arg(long)]
    pub stream: bool,
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Some(Commands::Route(args)) => route::run(config_path, args).await,
        Some(Commands::Classify { prompt, scores }) => inspect::classify(config_path, &prompt, scores),
        Some(Commands::Endpoints) => inspect::endpoints(config_path),
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}
