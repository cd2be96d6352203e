//! Job command handlers
//!
//! Submits a local pipeline file to the agent and prints the result.

use anyhow::{Context, Result, bail};
use base64::{Engine as _, engine::general_purpose};
use clap::Subcommand;
use colored::*;
use gryt_core::dto::job::{ExecuteJobRequest, ExecuteJobResponse};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::config::Config;

/// Job subcommands
#[derive(Subcommand)]
pub enum JobCommands {
    /// Run a pipeline file on the agent and wait for the result
    Run {
        /// Path to the pipeline file
        file: PathBuf,

        /// Job identifier reported back by the agent
        #[arg(long, default_value_t = 1)]
        job_id: i64,

        /// Repository to check out before running
        #[arg(long)]
        git_url: Option<String>,

        /// Branch to check out
        #[arg(long)]
        branch: Option<String>,

        /// Fernet-encrypted token for the checkout
        #[arg(long)]
        token_encrypted: Option<String>,

        /// Container image overriding the agent default
        #[arg(long)]
        image: Option<String>,

        /// Environment variable for the pipeline (KEY=VALUE, repeatable)
        #[arg(short, long = "env", value_parser = parse_key_val)]
        env: Vec<(String, String)>,

        /// CPU limit, e.g. "1.5"
        #[arg(long)]
        cpus: Option<String>,

        /// Memory limit, e.g. "512m"
        #[arg(long)]
        memory: Option<String>,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },
}

/// Handle job commands
pub async fn handle_job_command(command: JobCommands, config: &Config) -> Result<()> {
    match command {
        JobCommands::Run {
            file,
            job_id,
            git_url,
            branch,
            token_encrypted,
            image,
            env,
            cpus,
            memory,
            json,
        } => {
            let content = std::fs::read(&file)
                .with_context(|| format!("Failed to read pipeline file {}", file.display()))?;

            let mut req = ExecuteJobRequest::new(job_id, general_purpose::STANDARD.encode(content));
            req.git_url = git_url;
            req.git_branch = branch;
            req.github_token_encrypted = token_encrypted;
            req.docker_image = image;
            req.cpu_limit = cpus;
            req.memory_limit = memory;
            if !env.is_empty() {
                req.env_vars = Some(env.into_iter().collect::<HashMap<_, _>>());
            }

            run_job(config, &req, json).await
        }
    }
}

async fn run_job(config: &Config, req: &ExecuteJobRequest, json: bool) -> Result<()> {
    let client = config.client();

    if !json {
        println!(
            "{} job {} on {}",
            "▸".cyan(),
            req.job_id,
            client.base_url().dimmed()
        );
    }

    let result = client.execute_job(req).await.map_err(|e| {
        if e.is_unauthorized() {
            anyhow::anyhow!("{} (check --api-key / AGENT_API_KEY)", e)
        } else {
            anyhow::Error::new(e)
        }
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    if !result.success {
        bail!("Job {} failed with exit code {}", result.job_id, result.exit_code);
    }
    Ok(())
}

/// Print a job result
fn print_result(result: &ExecuteJobResponse) {
    println!("{}", "Job Result:".bold());
    println!("  ID:        {}", result.job_id.to_string().cyan());
    println!(
        "  Success:   {}",
        if result.success {
            "✓".green()
        } else {
            "✗".red()
        }
    );
    println!("  Exit Code: {}", result.exit_code);
    println!(
        "  Started:   {}",
        result.started_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!("  Duration:  {:.2}s", result.duration_seconds);

    if !result.stdout.is_empty() {
        println!("\n{}", "Output:".bold());
        println!("{}", result.stdout.trim_end());
    }

    if !result.success && !result.stderr.is_empty() && result.stderr != result.stdout {
        println!("\n{}", "Stderr:".bold());
        println!("{}", result.stderr.trim_end().red());
    }

    if let Some(error) = &result.error {
        println!("\n{}", "Error:".bold());
        println!("{}", error.red());
    }
}

/// Parse a single `KEY=VALUE` pair
fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    if key.is_empty() {
        return Err(format!("invalid KEY=VALUE: empty key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}
