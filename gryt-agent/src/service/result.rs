//! Result aggregation
//!
//! Turns a raw container outcome into the `ExecutionResult` returned to the
//! caller. Pipelines frequently print a JSON report; when stdout is exactly
//! one JSON document it is re-serialized compactly so the control plane gets
//! a stable representation regardless of how the tool formatted it. Key
//! order and number literals are kept as printed.

use chrono::{DateTime, Utc};
use gryt_core::domain::job::{ExecutionResult, duration_seconds};

use crate::execution::RawExecutionOutcome;

/// Compacts `output` if it holds a single JSON document, otherwise returns
/// it unchanged
pub fn compact_json_output(output: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(output.trim()) {
        Ok(value) => serde_json::to_string(&value).unwrap_or_else(|_| output.to_string()),
        Err(_) => output.to_string(),
    }
}

/// Builds the final result record for a job whose container ran
pub fn finalize(
    outcome: RawExecutionOutcome,
    started_at: DateTime<Utc>,
    completed_at: DateTime<Utc>,
) -> ExecutionResult {
    ExecutionResult {
        success: outcome.success(),
        exit_code: outcome.exit_code,
        stdout: compact_json_output(&outcome.stdout),
        stderr: outcome.stderr,
        started_at,
        completed_at,
        duration_seconds: duration_seconds(started_at, completed_at),
        error: None,
    }
}
