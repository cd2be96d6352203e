//! API Module
//!
//! HTTP surface of the agent. Each submodule handles endpoints for one
//! concern.

pub mod error;
pub mod health;
pub mod job;

use axum::{
    Router,
    routing::{get, post},
};
use secrecy::SecretString;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::service::JobExecutor;

pub const SERVICE_NAME: &str = "Gryt CI Agent";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<JobExecutor>,
    pub api_key: Arc<SecretString>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health::service_info))
        .route("/health", get(health::health_check))
        .route("/jobs/execute", post(job::execute_job))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
