//! Workspace management
//!
//! Every job gets its own directory under the workspace base:
//! `{base}/job-{id}-{timestamp}`. The directory holds the checkout (in `repo/`)
//! or the pipeline artifacts directly, and is removed when the job ends.
//!
//! Containers may leave behind files owned by another user, so removal is
//! preceded by a permission reclaim step. Removal is best-effort: a leaked
//! workspace is logged, never reported as a job failure.

use async_trait::async_trait;
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use gryt_core::domain::job::JobId;

use crate::error::{JobError, Result};

/// Subdirectory holding the source checkout
pub const REPO_DIR: &str = "repo";

const MAX_NAME_ATTEMPTS: u32 = 100;
const RECLAIM_TIMEOUT: Duration = Duration::from_secs(30);

/// A directory owned by exactly one job
///
/// Consumed by `WorkspaceManager::destroy`, so nothing can refer to it after
/// it has been removed.
#[derive(Debug)]
pub struct Workspace {
    job_id: JobId,
    path: PathBuf,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Makes a workspace removable before it is deleted
#[async_trait]
pub trait WorkspaceReclaimer: Send + Sync {
    /// Best-effort; failures are logged by the implementation
    async fn reclaim(&self, path: &Path);
}

/// Reclaims ownership with `chmod -R u+rwX`, retrying through `sudo -n`
pub struct ChmodReclaimer {}

impl ChmodReclaimer {
    pub fn new() -> Self {
        Self {}
    }

    async fn run(program: &str, args: &[&str], path: &Path) -> std::result::Result<(), String> {
        let output = Command::new(program)
            .args(args)
            .arg(path)
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(RECLAIM_TIMEOUT, output).await {
            Ok(Ok(output)) if output.status.success() => Ok(()),
            Ok(Ok(output)) => Err(String::from_utf8_lossy(&output.stderr).trim().to_string()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timed out after {:?}", RECLAIM_TIMEOUT)),
        }
    }
}

#[async_trait]
impl WorkspaceReclaimer for ChmodReclaimer {
    async fn reclaim(&self, path: &Path) {
        match Self::run("chmod", &["-R", "u+rwX"], path).await {
            Ok(()) => debug!("Fixed permissions on {}", path.display()),
            Err(e) => {
                warn!("chmod failed, trying with sudo: {}", e);
                match Self::run("sudo", &["-n", "chmod", "-R", "u+rwX"], path).await {
                    Ok(()) => debug!("Fixed permissions on {} with sudo", path.display()),
                    Err(e) => warn!("Failed to fix permissions even with sudo: {}", e),
                }
            }
        }
    }
}

/// Allocates and destroys per-job workspaces
pub struct WorkspaceManager {
    base_dir: PathBuf,
    reclaimer: Arc<dyn WorkspaceReclaimer>,
}

impl WorkspaceManager {
    pub fn new(base_dir: impl Into<PathBuf>, reclaimer: Arc<dyn WorkspaceReclaimer>) -> Self {
        Self {
            base_dir: base_dir.into(),
            reclaimer,
        }
    }

    /// Creates a fresh directory for the job
    ///
    /// Names embed a microsecond timestamp; a name that is already taken (a
    /// retried request landing in the same instant) gets a numeric suffix, so
    /// two calls never share a directory.
    pub async fn create(&self, job_id: JobId) -> Result<Workspace> {
        tokio::fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|e| {
                JobError::Workspace(format!("{}: {}", self.base_dir.display(), e))
            })?;

        let now = Utc::now();
        let stem = format!(
            "job-{}-{}.{:06}",
            job_id,
            now.timestamp(),
            now.timestamp_subsec_micros()
        );

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                stem.clone()
            } else {
                format!("{}-{}", stem, attempt)
            };
            let path = self.base_dir.join(name);

            match tokio::fs::create_dir(&path).await {
                Ok(()) => {
                    info!("[Job {}] Created workspace: {}", job_id, path.display());
                    return Ok(Workspace { job_id, path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(JobError::Workspace(format!("{}: {}", path.display(), e)));
                }
            }
        }

        Err(JobError::Workspace(format!(
            "no free directory name for {} after {} attempts",
            stem, MAX_NAME_ATTEMPTS
        )))
    }

    /// Removes the workspace and everything in it
    ///
    /// Never fails: problems are logged and the directory may be left behind.
    pub async fn destroy(&self, workspace: Workspace) {
        let Workspace { job_id, path } = workspace;

        match tokio::fs::try_exists(&path).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("[Job {}] Workspace {} already gone", job_id, path.display());
                return;
            }
            Err(e) => {
                warn!("[Job {}] Cannot inspect workspace {}: {}", job_id, path.display(), e);
            }
        }

        self.reclaimer.reclaim(&path).await;

        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => info!("[Job {}] Cleaned up workspace", job_id),
            Err(e) => warn!(
                "[Job {}] Failed to cleanup workspace {}: {}",
                job_id,
                path.display(),
                e
            ),
        }
    }
}
