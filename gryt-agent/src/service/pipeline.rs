//! Pipeline materialization
//!
//! Writes the decoded pipeline body as `pipeline.py` next to a `.gryt`
//! directory, where the `gryt` tool inside the container keeps its state.

use base64::{Engine as _, engine::general_purpose};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{JobError, Result};

/// Entry point file executed inside the container
pub const PIPELINE_FILE: &str = "pipeline.py";

/// Directory for the pipeline tool's local state
pub const METADATA_DIR: &str = ".gryt";

/// Decodes and writes pipeline definitions
pub struct PipelineMaterializer {}

impl PipelineMaterializer {
    pub fn new() -> Self {
        Self {}
    }

    /// Writes the pipeline into `target_dir`
    ///
    /// `target_dir` is the checkout root when a repository was cloned, the
    /// bare workspace otherwise.
    ///
    /// # Returns
    /// Path of the written pipeline file
    pub async fn write(&self, target_dir: &Path, encoded: &str) -> Result<PathBuf> {
        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let content = general_purpose::STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| JobError::Materialization(format!("invalid base64 pipeline: {}", e)))?;

        let metadata_dir = target_dir.join(METADATA_DIR);
        tokio::fs::create_dir_all(&metadata_dir)
            .await
            .map_err(|e| {
                JobError::Materialization(format!("{}: {}", metadata_dir.display(), e))
            })?;

        let pipeline_file = target_dir.join(PIPELINE_FILE);
        tokio::fs::write(&pipeline_file, &content)
            .await
            .map_err(|e| {
                JobError::Materialization(format!("{}: {}", pipeline_file.display(), e))
            })?;

        debug!(
            "Wrote {} bytes to {}",
            content.len(),
            pipeline_file.display()
        );
        Ok(pipeline_file)
    }
}
