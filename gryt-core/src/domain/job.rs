//! Job domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Caller-assigned job identifier
pub type JobId = i64;

/// Branch checked out when the request does not name one
pub const DEFAULT_BRANCH: &str = "main";

/// Exit code reported for failures that never reached container execution
pub const INFRASTRUCTURE_EXIT_CODE: i32 = -1;

/// One request to execute a pipeline
///
/// Received once and never mutated while the job runs. The job identifier only
/// namespaces the workspace directory and correlates log lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub job_id: JobId,
    /// Base64-encoded pipeline body
    pub pipeline_b64: String,
    /// Repository to check out before running, if any
    pub source: Option<SourceSpec>,
    /// Image override; the agent's default image is used when absent
    pub image: Option<String>,
    pub env_vars: HashMap<String, String>,
    pub limits: ResourceLimits,
}

/// Source repository to check out into the workspace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    pub url: String,
    pub branch: String,
    /// Encrypted access token, decrypted just before the checkout
    pub encrypted_token: Option<String>,
}

/// CPU and memory ceilings handed to the container runtime
///
/// Both values are pass-throughs; the agent does no enforcement of its own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Decimal CPU count, e.g. "1.5"
    pub cpu: Option<String>,
    /// Size string with unit suffix, e.g. "512m"
    pub memory: Option<String>,
}

/// A CPU limit that is not a positive decimal number
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid CPU limit '{0}': expected a positive decimal CPU count")]
pub struct InvalidCpuLimit(pub String);

impl ResourceLimits {
    /// Creates limits, treating blank strings as "no limit"
    pub fn new(cpu: Option<String>, memory: Option<String>) -> Self {
        Self {
            cpu: non_blank(cpu),
            memory: non_blank(memory),
        }
    }

    /// CPU limit as an absolute nano-CPU count (1 CPU = 10^9)
    pub fn nano_cpus(&self) -> Result<Option<i64>, InvalidCpuLimit> {
        let Some(raw) = self.cpu.as_deref() else {
            return Ok(None);
        };

        let cpus: f64 = raw
            .trim()
            .parse()
            .map_err(|_| InvalidCpuLimit(raw.to_string()))?;

        if !cpus.is_finite() || cpus <= 0.0 {
            return Err(InvalidCpuLimit(raw.to_string()));
        }

        Ok(Some((cpus * 1e9).round() as i64))
    }

    /// Memory ceiling exactly as supplied by the caller
    pub fn memory(&self) -> Option<&str> {
        self.memory.as_deref()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Final record of one job execution
///
/// Built once at the end of the job and returned to the caller unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub error: Option<String>,
}

impl ExecutionResult {
    /// Result for a job that failed before its container ever ran
    pub fn infrastructure_failure(
        message: impl Into<String>,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        let message = message.into();
        Self {
            success: false,
            exit_code: INFRASTRUCTURE_EXIT_CODE,
            stdout: String::new(),
            stderr: message.clone(),
            started_at,
            completed_at,
            duration_seconds: duration_seconds(started_at, completed_at),
            error: Some(message),
        }
    }
}

/// Wall-clock seconds between two instants, never negative
pub fn duration_seconds(started_at: DateTime<Utc>, completed_at: DateTime<Utc>) -> f64 {
    (completed_at - started_at)
        .to_std()
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
