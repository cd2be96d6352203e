//! Execution types for the Gryt agent
//!
//! These types only exist at runtime during job execution.
//! They are not persisted or sent over the network.

use std::fmt;

/// Lifecycle phases of a single job
///
/// A job moves through these in order. `SourceFetched` is skipped when the
/// request carries no repository. Workspace cleanup runs after whichever
/// phase the job stopped in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Created,
    WorkspaceReady,
    SourceFetched,
    PipelineWritten,
    ImageReady,
    Executed,
    Finalized,
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobPhase::Created => "created",
            JobPhase::WorkspaceReady => "workspace_ready",
            JobPhase::SourceFetched => "source_fetched",
            JobPhase::PipelineWritten => "pipeline_written",
            JobPhase::ImageReady => "image_ready",
            JobPhase::Executed => "executed",
            JobPhase::Finalized => "finalized",
        };
        f.write_str(name)
    }
}

/// What the container produced, before output normalization
///
/// A nonzero exit is a normal outcome here, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawExecutionOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl RawExecutionOutcome {
    /// Outcome of a container that exited zero
    pub fn succeeded(output: String) -> Self {
        Self {
            exit_code: 0,
            stdout: output,
            stderr: String::new(),
        }
    }

    /// Outcome of a container that exited nonzero
    ///
    /// The runtime's error payload is reported on both streams.
    pub fn failed(exit_code: i32, payload: String) -> Self {
        Self {
            exit_code,
            stdout: payload.clone(),
            stderr: payload,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}
