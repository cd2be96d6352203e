//! Container runtime management
//!
//! Drives the `docker` or `podman` CLI for job execution:
//! - Checking runtime availability
//! - Making sure the job image is present locally
//! - Running the pipeline in a single `--rm` container bound to the workspace
//! - Force-removing a container that outlived the job timeout

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use gryt_core::domain::job::{JobId, ResourceLimits};

use crate::error::{JobError, Result};
use crate::execution::RawExecutionOutcome;
use crate::service::pipeline::PIPELINE_FILE;

/// Mount point of the job's working directory inside the container
pub const WORKSPACE_MOUNT: &str = "/workspace";

/// Variable telling the pipeline tool where its workspace is mounted
pub const WORKSPACE_ENV: &str = "GRYT_WORKSPACE";

/// Status the docker/podman CLI uses for its own failures
pub const RUNTIME_FAILURE_EXIT_CODE: i32 = 125;

/// Status reported for a run cut short by the job timeout
pub const TIMEOUT_EXIT_CODE: i32 = 124;

const CLEANUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Makes sure an image is available to the runtime
#[async_trait]
pub trait ImageProvisioner: Send + Sync {
    /// Pulls `image` if it is not present locally
    async fn ensure(&self, image: &str) -> Result<()>;
}

/// Everything needed to launch the pipeline container
#[derive(Debug, Clone)]
pub struct RunSpec<'a> {
    pub job_id: JobId,
    /// Host directory mounted read-write at `WORKSPACE_MOUNT`
    pub work_dir: &'a Path,
    pub image: &'a str,
    pub env_vars: &'a HashMap<String, String>,
    pub limits: &'a ResourceLimits,
}

/// Runs a pipeline in a fresh container
#[async_trait]
pub trait ContainerRunner: Send + Sync {
    /// Runs the pipeline to completion
    ///
    /// A nonzero exit is returned as an outcome; only runtime-level failures
    /// are errors.
    async fn run(&self, spec: &RunSpec<'_>) -> Result<RawExecutionOutcome>;

    /// Whether the runtime daemon answers
    async fn available(&self) -> bool;
}

/// ImageProvisioner and ContainerRunner backed by the docker/podman CLI
#[derive(Debug, Clone)]
pub struct ContainerCli {
    binary: String,
    timeout: Option<Duration>,
}

impl ContainerCli {
    /// Creates a runtime adapter
    ///
    /// # Arguments
    /// * `binary` - CLI to invoke ("docker" or "podman")
    /// * `timeout` - Upper bound for a single container run
    pub fn new(binary: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Builds the `run` argument list for a job container
    pub fn run_args(&self, spec: &RunSpec<'_>, container_name: &str) -> Result<Vec<String>> {
        validate_image(spec.image)?;

        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            container_name.to_string(),
            "-v".to_string(),
            format!("{}:{}:rw", spec.work_dir.display(), WORKSPACE_MOUNT),
            "-w".to_string(),
            WORKSPACE_MOUNT.to_string(),
            "-e".to_string(),
            format!("{}={}", WORKSPACE_ENV, WORKSPACE_MOUNT),
        ];

        let mut names: Vec<&String> = spec.env_vars.keys().collect();
        names.sort();
        for name in names {
            if name.is_empty() || name.contains('=') {
                return Err(JobError::ContainerRuntime(format!(
                    "invalid environment variable name '{}'",
                    name
                )));
            }
            if name == WORKSPACE_ENV {
                warn!(
                    "[Job {}] Ignoring caller-supplied {}; it always names the mount point",
                    spec.job_id, WORKSPACE_ENV
                );
                continue;
            }
            args.push("-e".to_string());
            args.push(format!("{}={}", name, spec.env_vars[name]));
        }

        let nano_cpus = spec
            .limits
            .nano_cpus()
            .map_err(|e| JobError::ContainerRuntime(e.to_string()))?;
        if let Some(nano_cpus) = nano_cpus {
            args.push("--cpus".to_string());
            args.push(format_cpus(nano_cpus));
        }

        if let Some(memory) = spec.limits.memory() {
            args.push("--memory".to_string());
            args.push(memory.to_string());
        }

        args.push(spec.image.to_string());
        args.push("gryt".to_string());
        args.push("run".to_string());
        args.push(PIPELINE_FILE.to_string());

        Ok(args)
    }

    async fn force_remove(&self, container_name: &str) {
        let output = Command::new(&self.binary)
            .arg("rm")
            .arg("-f")
            .arg(container_name)
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(CLEANUP_TIMEOUT, output).await {
            Ok(Ok(output)) if output.status.success() => {
                debug!("Container {} removed", container_name)
            }
            Ok(Ok(output)) => warn!(
                "Failed to remove container {}: {}",
                container_name,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
            Ok(Err(e)) => warn!("Failed to remove container {}: {}", container_name, e),
            Err(_) => warn!("Timed out removing container {}", container_name),
        }
    }
}

#[async_trait]
impl ImageProvisioner for ContainerCli {
    async fn ensure(&self, image: &str) -> Result<()> {
        validate_image(image)?;

        let inspect = Command::new(&self.binary)
            .arg("image")
            .arg("inspect")
            .arg(image)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                JobError::ContainerRuntime(format!("could not run {}: {}", self.binary, e))
            })?;

        if inspect.status.success() {
            info!("Image {} already exists", image);
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&inspect.stderr);
        if !is_missing_image(&stderr) {
            return Err(JobError::ContainerRuntime(format!(
                "image inspect failed: {}",
                stderr.trim()
            )));
        }

        info!("Pulling image {}...", image);
        let output = Command::new(&self.binary)
            .arg("pull")
            .arg(image)
            .output()
            .await
            .map_err(|e| JobError::ImageProvision {
                image: image.to_string(),
                message: format!("could not run {}: {}", self.binary, e),
            })?;

        if !output.status.success() {
            return Err(JobError::ImageProvision {
                image: image.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        info!("Image {} pulled successfully", image);
        Ok(())
    }
}

#[async_trait]
impl ContainerRunner for ContainerCli {
    async fn run(&self, spec: &RunSpec<'_>) -> Result<RawExecutionOutcome> {
        let container_name = format!("gryt-job-{}-{}", spec.job_id, Uuid::new_v4().simple());
        let args = self.run_args(spec, &container_name)?;

        info!(
            "[Job {}] Starting container {} with image {}",
            spec.job_id, container_name, spec.image
        );
        debug!("{} {}", self.binary, redact_env_values(&args).join(" "));

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, output).await {
                Ok(output) => output,
                Err(_) => {
                    warn!(
                        "[Job {}] Container {} exceeded {}s, removing it",
                        spec.job_id,
                        container_name,
                        limit.as_secs()
                    );
                    self.force_remove(&container_name).await;
                    return Ok(RawExecutionOutcome::failed(
                        TIMEOUT_EXIT_CODE,
                        format!("Execution timed out after {}s", limit.as_secs()),
                    ));
                }
            },
            None => output.await,
        }
        .map_err(|e| JobError::ContainerRuntime(format!("could not run {}: {}", self.binary, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        let outcome = classify_exit(output.status.code(), stdout, stderr)?;
        if !outcome.success() {
            warn!(
                "[Job {}] Container exited with code {}",
                spec.job_id, outcome.exit_code
            );
        }
        Ok(outcome)
    }

    async fn available(&self) -> bool {
        let status = Command::new(&self.binary)
            .arg("version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        match tokio::time::timeout(Duration::from_secs(10), status).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                debug!("{} version failed: {}", self.binary, e);
                false
            }
            Err(_) => false,
        }
    }
}

/// Interprets the exit status of `run`
///
/// Zero yields the combined output as stdout. The runtime's own failure
/// status (or death by signal) is an infrastructure error. Anything else is
/// the pipeline's exit code, reported with the error payload on both streams.
pub fn classify_exit(
    code: Option<i32>,
    stdout: String,
    stderr: String,
) -> Result<RawExecutionOutcome> {
    match code {
        Some(0) => Ok(RawExecutionOutcome::succeeded(stdout + &stderr)),
        Some(RUNTIME_FAILURE_EXIT_CODE) => {
            let message = stderr.trim();
            Err(JobError::ContainerRuntime(if message.is_empty() {
                format!("runtime exited with status {}", RUNTIME_FAILURE_EXIT_CODE)
            } else {
                message.to_string()
            }))
        }
        Some(code) => {
            let payload = if !stderr.trim().is_empty() {
                stderr
            } else if !stdout.trim().is_empty() {
                stdout
            } else {
                format!("Container exited with code {}", code)
            };
            Ok(RawExecutionOutcome::failed(code, payload))
        }
        None => Err(JobError::ContainerRuntime(
            "container client terminated by signal".to_string(),
        )),
    }
}

/// Rejects image references the CLI would parse as options
fn validate_image(image: &str) -> Result<()> {
    if image.trim().is_empty() || image.starts_with('-') {
        return Err(JobError::ContainerRuntime(format!(
            "invalid image reference '{}'",
            image
        )));
    }
    Ok(())
}

/// Whether `image inspect` failed only because the image is not present
///
/// docker reports "No such image", podman "image not known".
fn is_missing_image(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    stderr.contains("no such image") || stderr.contains("image not known")
}

/// Copy of `args` with the values of `-e NAME=VALUE` pairs masked
fn redact_env_values(args: &[String]) -> Vec<String> {
    let mut redacted = Vec::with_capacity(args.len());
    let mut after_env_flag = false;
    for arg in args {
        if after_env_flag {
            let name = arg.split_once('=').map_or(arg.as_str(), |(name, _)| name);
            redacted.push(format!("{}=***", name));
        } else {
            redacted.push(arg.clone());
        }
        after_env_flag = arg == "-e";
    }
    redacted
}

/// Renders a nano-CPU count as the decimal `--cpus` value the CLI converts
/// back to exactly that many NanoCPUs
pub fn format_cpus(nano_cpus: i64) -> String {
    format!("{}.{:09}", nano_cpus / 1_000_000_000, nano_cpus % 1_000_000_000)
}
