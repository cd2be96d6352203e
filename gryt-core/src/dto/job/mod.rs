//! Job DTOs exchanged with the CI control plane

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::job::{
    DEFAULT_BRANCH, ExecutionResult, JobId, JobRequest, ResourceLimits, SourceSpec,
};

/// Body of `POST /jobs/execute`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteJobRequest {
    pub job_id: JobId,
    pub pipeline_b64: String,
    #[serde(default)]
    pub git_url: Option<String>,
    #[serde(default)]
    pub git_branch: Option<String>,
    #[serde(default)]
    pub github_token_encrypted: Option<String>,
    #[serde(default)]
    pub docker_image: Option<String>,
    #[serde(default)]
    pub env_vars: Option<HashMap<String, String>>,
    #[serde(default)]
    pub cpu_limit: Option<String>,
    #[serde(default)]
    pub memory_limit: Option<String>,
    /// Accepted for compatibility; results are only returned synchronously
    #[serde(default)]
    pub callback_url: Option<String>,
}

impl ExecuteJobRequest {
    /// Creates a request for a pipeline with no source checkout
    pub fn new(job_id: JobId, pipeline_b64: impl Into<String>) -> Self {
        Self {
            job_id,
            pipeline_b64: pipeline_b64.into(),
            git_url: None,
            git_branch: None,
            github_token_encrypted: None,
            docker_image: None,
            env_vars: None,
            cpu_limit: None,
            memory_limit: None,
            callback_url: None,
        }
    }
}

impl From<ExecuteJobRequest> for JobRequest {
    fn from(req: ExecuteJobRequest) -> Self {
        let source = req
            .git_url
            .filter(|url| !url.trim().is_empty())
            .map(|url| SourceSpec {
                url,
                branch: req
                    .git_branch
                    .filter(|b| !b.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
                encrypted_token: req.github_token_encrypted.filter(|t| !t.is_empty()),
            });

        JobRequest {
            job_id: req.job_id,
            pipeline_b64: req.pipeline_b64,
            source,
            image: req.docker_image.filter(|i| !i.trim().is_empty()),
            env_vars: req.env_vars.unwrap_or_default(),
            limits: ResourceLimits::new(req.cpu_limit, req.memory_limit),
        }
    }
}

/// Response of `POST /jobs/execute`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteJobResponse {
    pub job_id: JobId,
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_seconds: f64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecuteJobResponse {
    pub fn from_result(job_id: JobId, result: ExecutionResult) -> Self {
        Self {
            job_id,
            success: result.success,
            exit_code: result.exit_code,
            stdout: result.stdout,
            stderr: result.stderr,
            duration_seconds: result.duration_seconds,
            started_at: result.started_at,
            completed_at: result.completed_at,
            error: result.error,
        }
    }
}
