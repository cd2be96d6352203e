//! Gryt CI Agent
//!
//! A stateless HTTP service that runs single pipeline jobs in throwaway
//! containers.
//!
//! Architecture:
//! - Configuration: process environment with `.envrc` fallback
//! - Services: workspace, source checkout, pipeline materialization, secrets
//! - Container: docker/podman CLI adapter
//! - API: axum router exposing the execute and health endpoints
//!
//! Each request gets its own workspace, which is removed once the job's
//! result has been captured.

mod api;
mod config;
mod container;
mod envrc;
mod error;
mod execution;
mod service;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::AppState;
use crate::config::Config;
use crate::container::ContainerCli;
use crate::service::{
    ChmodReclaimer, FernetSecretResolver, GitSourceFetcher, JobExecutor, WorkspaceManager,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gryt_agent=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Gryt CI Agent v{}", api::VERSION);

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    info!(
        "Loaded configuration: runtime={}, default_image={}, workspace_dir={}",
        config.container_runtime,
        config.default_image,
        config.workspace_dir.display()
    );
    if let Some(limit) = config.job_timeout {
        info!("Container runs are limited to {}s", limit.as_secs());
    }

    let secrets = FernetSecretResolver::new(&config.encryption_key)
        .context("Failed to initialize token decryption")?;

    let runtime = Arc::new(ContainerCli::new(
        config.container_runtime.clone(),
        config.job_timeout,
    ));
    info!("Using container runtime: {}", runtime.binary());

    let executor = JobExecutor::new(
        config.default_image.clone(),
        WorkspaceManager::new(config.workspace_dir.clone(), Arc::new(ChmodReclaimer::new())),
        Arc::new(secrets),
        Arc::new(GitSourceFetcher::new()),
        runtime.clone(),
        runtime,
    );

    if executor.runtime_available().await {
        info!("Container runtime is available");
    } else {
        warn!(
            "Container runtime '{}' is not reachable; jobs will fail until it is",
            config.container_runtime
        );
    }

    let addr = config.bind_addr();
    let state = AppState {
        executor: Arc::new(executor),
        api_key: Arc::new(config.api_key),
    };
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Agent stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
