//! Gryt Agent CLI
//!
//! Command-line interface for submitting pipelines to a Gryt CI agent.

mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "gryt-agent-cli")]
#[command(about = "Gryt CI agent command-line client", long_about = None)]
struct Cli {
    /// Agent URL
    #[arg(long, env = "GRYT_AGENT_URL", default_value = "http://localhost:8080")]
    agent_url: String,

    /// Shared secret sent as X-API-Key
    #[arg(long, env = "AGENT_API_KEY", hide_env_values = true, default_value = "")]
    api_key: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        agent_url: cli.agent_url,
        api_key: cli.api_key,
    };

    handle_command(cli.command, &config).await
}
