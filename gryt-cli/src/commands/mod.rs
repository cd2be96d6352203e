//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod health;
mod job;

pub use job::JobCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Job submission
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// Show agent health
    Health,
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Job { command } => job::handle_job_command(command, config).await,
        Commands::Health => health::show_health(config).await,
    }
}
