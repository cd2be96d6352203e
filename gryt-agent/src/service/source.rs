//! Source checkout
//!
//! Shallow-clones the job's repository into `{workspace}/repo` with the `git`
//! CLI. Tokens are embedded into `https://` URLs only; other schemes are
//! cloned as given and the token goes unused.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{JobError, Result};
use crate::service::workspace::REPO_DIR;

/// The only scheme that accepts an embedded token
const TOKEN_SCHEME: &str = "https://";

/// Checks out a repository into a workspace
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Performs a single-commit checkout of `branch`
    ///
    /// # Returns
    /// Path of the checkout root
    async fn fetch(
        &self,
        workspace: &Path,
        url: &str,
        branch: &str,
        token: Option<&SecretString>,
    ) -> Result<PathBuf>;
}

/// SourceFetcher backed by the `git` command-line client
pub struct GitSourceFetcher {
    git_binary: String,
}

impl GitSourceFetcher {
    pub fn new() -> Self {
        Self::with_binary("git")
    }

    pub fn with_binary(git_binary: impl Into<String>) -> Self {
        Self {
            git_binary: git_binary.into(),
        }
    }
}

#[async_trait]
impl SourceFetcher for GitSourceFetcher {
    async fn fetch(
        &self,
        workspace: &Path,
        url: &str,
        branch: &str,
        token: Option<&SecretString>,
    ) -> Result<PathBuf> {
        let clone_url = match token {
            Some(token) => match authenticated_url(url, token.expose_secret()) {
                Some(with_auth) => with_auth,
                None => {
                    warn!("Token not applied: {} does not use {}", url, TOKEN_SCHEME);
                    url.to_string()
                }
            },
            None => url.to_string(),
        };

        let repo_path = workspace.join(REPO_DIR);
        info!(
            "Cloning {} (branch: {}) to {}",
            url,
            branch,
            repo_path.display()
        );

        let output = Command::new(&self.git_binary)
            .arg("clone")
            .arg("--depth")
            .arg("1")
            .arg("--branch")
            .arg(branch)
            .arg("--")
            .arg(&clone_url)
            .arg(&repo_path)
            // Never block on an interactive credential prompt
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| JobError::SourceFetch(format!("could not run {}: {}", self.git_binary, e)))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = match token {
            Some(token) => scrub(&stderr, token.expose_secret()),
            None => stderr.trim().to_string(),
        };

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            return Err(JobError::SourceFetch(format!(
                "git clone exited with {}: {}",
                code, stderr
            )));
        }

        if !stderr.is_empty() {
            debug!("git clone stderr: {}", stderr);
        }

        let has_metadata = tokio::fs::try_exists(repo_path.join(".git"))
            .await
            .unwrap_or(false);
        if !has_metadata {
            return Err(JobError::SourceFetch(
                "Clone completed but repository directory is invalid".to_string(),
            ));
        }

        // The checkout is mounted into the pipeline container
        if clone_url != url {
            self.reset_remote(&repo_path, url).await?;
        }

        info!("Successfully cloned {} into {}", url, repo_path.display());
        Ok(repo_path)
    }
}

impl GitSourceFetcher {
    /// Points `origin` back at the credential-free URL
    async fn reset_remote(&self, repo_path: &Path, url: &str) -> Result<()> {
        let output = Command::new(&self.git_binary)
            .arg("-C")
            .arg(repo_path)
            .args(["remote", "set-url", "origin", url])
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| JobError::SourceFetch(format!("could not run {}: {}", self.git_binary, e)))?;

        if !output.status.success() {
            return Err(JobError::SourceFetch(format!(
                "failed to remove credentials from origin: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        debug!("Reset origin of {} to {}", repo_path.display(), url);
        Ok(())
    }
}

/// Embeds `token` into the authority of an `https://` URL
///
/// Returns `None` when the scheme cannot carry credentials.
pub fn authenticated_url(url: &str, token: &str) -> Option<String> {
    url.strip_prefix(TOKEN_SCHEME)
        .map(|rest| format!("{}{}@{}", TOKEN_SCHEME, token, rest))
}

fn scrub(text: &str, token: &str) -> String {
    if token.is_empty() {
        return text.trim().to_string();
    }
    text.replace(token, "***").trim().to_string()
}
