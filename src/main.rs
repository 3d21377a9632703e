//! clawroute - task-aware LLM request router
//!
//! CLI entry point. Completion text goes to stdout; logs and the
//! cost/latency summary go to stderr.

#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod loader;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clawroute=info,clawroute_core=info,clawroute_llm=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = cli::Cli::parse();
    debug!("clawroute v{}", env!("CARGO_PKG_VERSION"));

    cli::run(cli).await
}
