//! Job error types
//!
//! One variant per failure category that can abort a job. All of them are
//! turned into a failed `ExecutionResult` by the executor; none reach the
//! HTTP caller as a transport fault. A container that exits nonzero is not an
//! error and never appears here.

use thiserror::Error;

use crate::execution::JobPhase;

pub type Result<T> = std::result::Result<T, JobError>;

#[derive(Debug, Error)]
pub enum JobError {
    /// The per-job working directory could not be allocated
    #[error("Failed to create workspace: {0}")]
    Workspace(String),

    /// The checkout failed or produced no repository
    #[error("Failed to clone repository: {0}")]
    SourceFetch(String),

    /// The pipeline could not be decoded or written
    #[error("Failed to write pipeline file: {0}")]
    Materialization(String),

    /// The image was absent locally and could not be pulled
    #[error("Failed to pull image {image}: {message}")]
    ImageProvision { image: String, message: String },

    /// The container runtime could not start or complete the run
    #[error("Container execution failed: {0}")]
    ContainerRuntime(String),
}

impl JobError {
    /// The phase the job failed to reach
    pub fn phase(&self) -> JobPhase {
        match self {
            JobError::Workspace(_) => JobPhase::WorkspaceReady,
            JobError::SourceFetch(_) => JobPhase::SourceFetched,
            JobError::Materialization(_) => JobPhase::PipelineWritten,
            JobError::ImageProvision { .. } => JobPhase::ImageReady,
            JobError::ContainerRuntime(_) => JobPhase::Executed,
        }
    }
}
