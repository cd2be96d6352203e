//! Service status handlers

use axum::{Json, extract::State};
use gryt_core::dto::health::{HealthResponse, ServiceInfo};

use crate::api::{AppState, SERVICE_NAME, VERSION};

/// GET /
pub async fn service_info() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: SERVICE_NAME.to_string(),
        version: VERSION.to_string(),
        status: "running".to_string(),
    })
}

/// GET /health
/// Unauthenticated; reports whether the container runtime answers
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let available = state.executor.runtime_available().await;
    if !available {
        tracing::warn!("Health check: container runtime not available");
    }
    Json(HealthResponse::new(VERSION, available))
}
