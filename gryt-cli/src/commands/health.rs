//! Health command handler

use anyhow::{Context, Result};
use colored::*;

use crate::config::Config;

/// Print agent identity and runtime availability
pub async fn show_health(config: &Config) -> Result<()> {
    let client = config.client();

    let info = client
        .info()
        .await
        .with_context(|| format!("Failed to reach agent at {}", client.base_url()))?;
    let health = client.health().await?;

    println!("{} {}", info.service.bold(), info.version.dimmed());
    println!("  URL:       {}", client.base_url());

    let status = if health.is_healthy() {
        health.status.green()
    } else {
        health.status.yellow()
    };
    println!("  Status:    {}", status);

    let runtime = if health.docker_available {
        "available".green()
    } else {
        "unavailable".red()
    };
    println!("  Container: {}", runtime);

    Ok(())
}
