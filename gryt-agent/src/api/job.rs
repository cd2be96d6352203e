//! Job API Handlers

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
};
use gryt_core::domain::job::JobRequest;
use gryt_core::dto::job::{ExecuteJobRequest, ExecuteJobResponse};
use secrecy::ExposeSecret;
use subtle::ConstantTimeEq;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

/// Header carrying the shared secret
pub const API_KEY_HEADER: &str = "x-api-key";

/// POST /jobs/execute
/// Runs a job to completion and returns its result
pub async fn execute_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ExecuteJobRequest>, JsonRejection>,
) -> ApiResult<Json<ExecuteJobResponse>> {
    authorize(&state, &headers)?;
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let job_id = req.job_id;
    tracing::info!("[Job {}] Received execution request", job_id);
    if let Some(url) = req.callback_url.as_deref().filter(|u| !u.is_empty()) {
        tracing::info!(
            "[Job {}] Callback URL {} accepted but results are not delivered to it",
            job_id,
            url
        );
    }

    let request = JobRequest::from(req);
    let executor = state.executor.clone();

    // Detached so a dropped connection cannot interrupt workspace cleanup
    let result = tokio::spawn(async move { executor.execute(&request).await })
        .await
        .map_err(|e| ApiError::InternalError(format!("Job {} task failed: {}", job_id, e)))?;

    Ok(Json(ExecuteJobResponse::from_result(job_id, result)))
}

/// Compares without short-circuiting on the first differing byte
fn keys_match(provided: &str, expected: &str) -> bool {
    if provided.len() != expected.len() {
        return false;
    }
    bool::from(provided.as_bytes().ct_eq(expected.as_bytes()))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let provided = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    match provided {
        Some(key) if keys_match(key, state.api_key.expose_secret()) => Ok(()),
        Some(_) => {
            tracing::warn!("Rejected request with invalid API key");
            Err(ApiError::Unauthorized)
        }
        None => {
            tracing::warn!("Rejected request without API key");
            Err(ApiError::Unauthorized)
        }
    }
}
