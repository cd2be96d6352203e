//! Execution service
//!
//! Runs one job end to end:
//! - Allocating the workspace
//! - Checking out the source repository, if one was requested
//! - Writing the pipeline file
//! - Making sure the image is present
//! - Running the container and normalizing its output
//!
//! Every phase returns a tagged result. The first failure short-circuits the
//! remaining phases and becomes a failed `ExecutionResult`; the workspace is
//! destroyed afterwards on every path.

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use gryt_core::domain::job::{ExecutionResult, JobId, JobRequest};

use crate::container::{ContainerRunner, ImageProvisioner, RunSpec};
use crate::error::{JobError, Result};
use crate::execution::{JobPhase, RawExecutionOutcome};
use crate::service::pipeline::PipelineMaterializer;
use crate::service::result;
use crate::service::secrets::SecretResolver;
use crate::service::source::SourceFetcher;
use crate::service::workspace::{Workspace, WorkspaceManager};

/// Orchestrates the job lifecycle
///
/// Holds no per-job state, so one instance serves concurrent jobs.
pub struct JobExecutor {
    default_image: String,
    workspaces: WorkspaceManager,
    secrets: Arc<dyn SecretResolver>,
    fetcher: Arc<dyn SourceFetcher>,
    materializer: PipelineMaterializer,
    images: Arc<dyn ImageProvisioner>,
    runner: Arc<dyn ContainerRunner>,
}

impl JobExecutor {
    pub fn new(
        default_image: impl Into<String>,
        workspaces: WorkspaceManager,
        secrets: Arc<dyn SecretResolver>,
        fetcher: Arc<dyn SourceFetcher>,
        images: Arc<dyn ImageProvisioner>,
        runner: Arc<dyn ContainerRunner>,
    ) -> Self {
        Self {
            default_image: default_image.into(),
            workspaces,
            secrets,
            fetcher,
            materializer: PipelineMaterializer::new(),
            images,
            runner,
        }
    }

    /// Whether the container runtime is reachable
    pub async fn runtime_available(&self) -> bool {
        self.runner.available().await
    }

    /// Executes a job
    ///
    /// Never fails: every job-domain error is reported inside the returned
    /// result with `exit_code = -1`.
    pub async fn execute(&self, request: &JobRequest) -> ExecutionResult {
        let job_id = request.job_id;
        let started_at = Utc::now();
        enter(job_id, JobPhase::Created);

        let workspace = match self.workspaces.create(job_id).await {
            Ok(workspace) => workspace,
            Err(e) => return failure(job_id, e, started_at),
        };
        enter(job_id, JobPhase::WorkspaceReady);

        let outcome = self.run_phases(&workspace, request).await;
        let completed_at = Utc::now();

        let result = match outcome {
            Ok(raw) => {
                let result = result::finalize(raw, started_at, completed_at);
                enter(job_id, JobPhase::Finalized);
                info!(
                    "[Job {}] Completed in {:.2}s. Exit code: {}",
                    job_id, result.duration_seconds, result.exit_code
                );
                result
            }
            Err(e) => failure(job_id, e, started_at),
        };

        self.workspaces.destroy(workspace).await;
        result
    }

    async fn run_phases(
        &self,
        workspace: &Workspace,
        request: &JobRequest,
    ) -> Result<RawExecutionOutcome> {
        let job_id = request.job_id;

        let work_dir: PathBuf = match &request.source {
            Some(source) => {
                let token = self.resolve_token(job_id, source.encrypted_token.as_deref());
                let repo = self
                    .fetcher
                    .fetch(workspace.path(), &source.url, &source.branch, token.as_ref())
                    .await?;
                info!("[Job {}] Cloned repository", job_id);
                enter(job_id, JobPhase::SourceFetched);
                repo
            }
            None => workspace.path().to_path_buf(),
        };

        self.materializer
            .write(&work_dir, &request.pipeline_b64)
            .await?;
        info!("[Job {}] Wrote pipeline file", job_id);
        enter(job_id, JobPhase::PipelineWritten);

        let image = request.image.as_deref().unwrap_or(&self.default_image);
        self.images.ensure(image).await?;
        enter(job_id, JobPhase::ImageReady);

        let outcome = self
            .runner
            .run(&RunSpec {
                job_id,
                work_dir: &work_dir,
                image,
                env_vars: &request.env_vars,
                limits: &request.limits,
            })
            .await?;
        enter(job_id, JobPhase::Executed);

        Ok(outcome)
    }

    /// Decrypts the checkout token
    ///
    /// A token that cannot be decrypted is dropped and the checkout proceeds
    /// without credentials.
    fn resolve_token(&self, job_id: JobId, encrypted: Option<&str>) -> Option<SecretString> {
        let encrypted = encrypted.filter(|e| !e.is_empty())?;
        match self.secrets.decrypt(encrypted) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!("[Job {}] Failed to decrypt GitHub token: {}", job_id, e);
                None
            }
        }
    }
}

fn enter(job_id: JobId, phase: JobPhase) {
    debug!(job_id, %phase, "Job phase reached");
}

fn failure(job_id: JobId, err: JobError, started_at: DateTime<Utc>) -> ExecutionResult {
    error!(
        "[Job {}] Execution failed before reaching {}: {}",
        job_id,
        err.phase(),
        err
    );
    ExecutionResult::infrastructure_failure(err.to_string(), started_at, Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::RawExecutionOutcome;
    use crate::service::pipeline::{METADATA_DIR, PIPELINE_FILE};
    use crate::service::secrets::SecretError;
    use crate::service::workspace::WorkspaceReclaimer;
    use async_trait::async_trait;
    use base64::{Engine as _, engine::general_purpose};
    use gryt_core::domain::job::{INFRASTRUCTURE_EXIT_CODE, ResourceLimits, SourceSpec};
    use secrecy::ExposeSecret;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct NoopReclaimer;

    #[async_trait]
    impl WorkspaceReclaimer for NoopReclaimer {
        async fn reclaim(&self, _path: &Path) {}
    }

    /// Accepts "good-cipher" only
    struct FakeSecrets;

    impl SecretResolver for FakeSecrets {
        fn decrypt(&self, ciphertext: &str) -> std::result::Result<SecretString, SecretError> {
            if ciphertext == "good-cipher" {
                Ok(SecretString::from("plain-token".to_string()))
            } else {
                Err(SecretError::Decryption)
            }
        }
    }

    #[derive(Default)]
    struct FakeFetcher {
        fail: bool,
        seen_token: Mutex<Option<Option<String>>>,
    }

    #[async_trait]
    impl SourceFetcher for FakeFetcher {
        async fn fetch(
            &self,
            workspace: &Path,
            _url: &str,
            _branch: &str,
            token: Option<&SecretString>,
        ) -> Result<PathBuf> {
            *self.seen_token.lock().unwrap() = Some(token.map(|t| t.expose_secret().to_string()));
            if self.fail {
                return Err(JobError::SourceFetch(
                    "repository 'https://invalid.example/repo.git' not found".to_string(),
                ));
            }
            let repo = workspace.join("repo");
            std::fs::create_dir_all(repo.join(".git")).unwrap();
            Ok(repo)
        }
    }

    #[derive(Default)]
    struct FakeImages {
        fail: bool,
        ensured: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ImageProvisioner for FakeImages {
        async fn ensure(&self, image: &str) -> Result<()> {
            self.ensured.lock().unwrap().push(image.to_string());
            if self.fail {
                return Err(JobError::ImageProvision {
                    image: image.to_string(),
                    message: "pull access denied".to_string(),
                });
            }
            Ok(())
        }
    }

    /// Records what it was asked to run and returns a canned outcome
    struct FakeRunner {
        outcome: std::result::Result<RawExecutionOutcome, String>,
        seen: Mutex<Option<(PathBuf, String, String)>>,
    }

    impl FakeRunner {
        fn returning(outcome: RawExecutionOutcome) -> Self {
            Self {
                outcome: Ok(outcome),
                seen: Mutex::new(None),
            }
        }

        fn erroring(message: &str) -> Self {
            Self {
                outcome: Err(message.to_string()),
                seen: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl ContainerRunner for FakeRunner {
        async fn run(&self, spec: &RunSpec<'_>) -> Result<RawExecutionOutcome> {
            let pipeline = std::fs::read_to_string(spec.work_dir.join(PIPELINE_FILE)).unwrap();
            *self.seen.lock().unwrap() = Some((
                spec.work_dir.to_path_buf(),
                spec.image.to_string(),
                pipeline,
            ));
            self.outcome.clone().map_err(JobError::ContainerRuntime)
        }

        async fn available(&self) -> bool {
            true
        }
    }

    struct Harness {
        _tmp: TempDir,
        base: PathBuf,
        executor: JobExecutor,
        fetcher: Arc<FakeFetcher>,
        images: Arc<FakeImages>,
        runner: Arc<FakeRunner>,
    }

    fn harness(fetcher: FakeFetcher, images: FakeImages, runner: FakeRunner) -> Harness {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("jobs");
        let fetcher = Arc::new(fetcher);
        let images = Arc::new(images);
        let runner = Arc::new(runner);

        let executor = JobExecutor::new(
            "ghcr.io/epyklab/gryt/pipeline:latest",
            WorkspaceManager::new(base.clone(), Arc::new(NoopReclaimer)),
            Arc::new(FakeSecrets),
            fetcher.clone(),
            images.clone(),
            runner.clone(),
        );

        Harness {
            _tmp: tmp,
            base,
            executor,
            fetcher,
            images,
            runner,
        }
    }

    fn request(job_id: JobId, pipeline: &str) -> JobRequest {
        JobRequest {
            job_id,
            pipeline_b64: general_purpose::STANDARD.encode(pipeline),
            source: None,
            image: None,
            env_vars: HashMap::new(),
            limits: ResourceLimits::default(),
        }
    }

    fn with_source(mut req: JobRequest, token: Option<&str>) -> JobRequest {
        req.source = Some(SourceSpec {
            url: "https://github.com/acme/app.git".to_string(),
            branch: "main".to_string(),
            encrypted_token: token.map(str::to_string),
        });
        req
    }

    fn leftover_workspaces(base: &Path) -> usize {
        std::fs::read_dir(base).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_successful_job_without_source() {
        let h = harness(
            FakeFetcher::default(),
            FakeImages::default(),
            FakeRunner::returning(RawExecutionOutcome::succeeded("ok\n".to_string())),
        );

        let result = h.executor.execute(&request(42, "print('ok')")).await;

        assert!(result.success);
        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.contains("ok"));
        assert!(result.error.is_none());
        assert!(result.completed_at >= result.started_at);
        assert!(result.duration_seconds >= 0.0);

        let (work_dir, image, pipeline) = h.runner.seen.lock().unwrap().clone().unwrap();
        assert_eq!(work_dir.parent(), Some(h.base.as_path()));
        assert_eq!(image, "ghcr.io/epyklab/gryt/pipeline:latest");
        assert_eq!(pipeline, "print('ok')");
        assert!(h.fetcher.seen_token.lock().unwrap().is_none());
        assert_eq!(leftover_workspaces(&h.base), 0);
    }

    #[tokio::test]
    async fn test_checkout_is_the_working_directory() {
        let h = harness(
            FakeFetcher::default(),
            FakeImages::default(),
            FakeRunner::returning(RawExecutionOutcome::succeeded(String::new())),
        );

        let result = h
            .executor
            .execute(&with_source(request(5, "pass"), Some("good-cipher")))
            .await;
        assert!(result.success);

        let (work_dir, _, _) = h.runner.seen.lock().unwrap().clone().unwrap();
        assert!(work_dir.ends_with("repo"));
        assert_eq!(
            h.fetcher.seen_token.lock().unwrap().clone(),
            Some(Some("plain-token".to_string()))
        );
        assert_eq!(leftover_workspaces(&h.base), 0);
    }

    #[tokio::test]
    async fn test_undecryptable_token_is_dropped() {
        let h = harness(
            FakeFetcher::default(),
            FakeImages::default(),
            FakeRunner::returning(RawExecutionOutcome::succeeded(String::new())),
        );

        let result = h
            .executor
            .execute(&with_source(request(6, "pass"), Some("tampered")))
            .await;

        assert!(result.success);
        assert_eq!(h.fetcher.seen_token.lock().unwrap().clone(), Some(None));
    }

    #[tokio::test]
    async fn test_fetch_failure_is_reported_and_cleaned_up() {
        let h = harness(
            FakeFetcher {
                fail: true,
                ..Default::default()
            },
            FakeImages::default(),
            FakeRunner::returning(RawExecutionOutcome::succeeded(String::new())),
        );

        let result = h
            .executor
            .execute(&with_source(request(7, "pass"), None))
            .await;

        assert!(!result.success);
        assert_eq!(result.exit_code, INFRASTRUCTURE_EXIT_CODE);
        assert!(result.stdout.is_empty());
        assert!(result.stderr.contains("Failed to clone repository"));
        assert_eq!(result.error.as_deref(), Some(result.stderr.as_str()));
        assert!(h.images.ensured.lock().unwrap().is_empty());
        assert!(h.runner.seen.lock().unwrap().is_none());
        assert_eq!(leftover_workspaces(&h.base), 0);
    }

    #[tokio::test]
    async fn test_bad_pipeline_encoding_aborts_before_image() {
        let h = harness(
            FakeFetcher::default(),
            FakeImages::default(),
            FakeRunner::returning(RawExecutionOutcome::succeeded(String::new())),
        );

        let mut req = request(8, "");
        req.pipeline_b64 = "***".to_string();
        let result = h.executor.execute(&req).await;

        assert_eq!(result.exit_code, INFRASTRUCTURE_EXIT_CODE);
        assert!(result.stderr.contains("Failed to write pipeline file"));
        assert!(h.images.ensured.lock().unwrap().is_empty());
        assert_eq!(leftover_workspaces(&h.base), 0);
    }

    #[tokio::test]
    async fn test_image_override_and_pull_failure() {
        let h = harness(
            FakeFetcher::default(),
            FakeImages {
                fail: true,
                ..Default::default()
            },
            FakeRunner::returning(RawExecutionOutcome::succeeded(String::new())),
        );

        let mut req = request(9, "pass");
        req.image = Some("python:3.12".to_string());
        let result = h.executor.execute(&req).await;

        assert_eq!(result.exit_code, INFRASTRUCTURE_EXIT_CODE);
        assert!(result.stderr.contains("Failed to pull image python:3.12"));
        assert_eq!(*h.images.ensured.lock().unwrap(), vec!["python:3.12"]);
        assert!(h.runner.seen.lock().unwrap().is_none());
        assert_eq!(leftover_workspaces(&h.base), 0);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_a_normal_failure() {
        let h = harness(
            FakeFetcher::default(),
            FakeImages::default(),
            FakeRunner::returning(RawExecutionOutcome::failed(
                2,
                "AssertionError: build broke".to_string(),
            )),
        );

        let result = h.executor.execute(&request(10, "assert False")).await;

        assert!(!result.success);
        assert_eq!(result.exit_code, 2);
        assert_eq!(result.stderr, "AssertionError: build broke");
        assert!(result.error.is_none());
        assert_eq!(leftover_workspaces(&h.base), 0);
    }

    #[tokio::test]
    async fn test_runtime_error_is_infrastructure_failure() {
        let h = harness(
            FakeFetcher::default(),
            FakeImages::default(),
            FakeRunner::erroring("Cannot connect to the Docker daemon"),
        );

        let result = h.executor.execute(&request(11, "pass")).await;

        assert_eq!(result.exit_code, INFRASTRUCTURE_EXIT_CODE);
        assert!(result.stderr.contains("Cannot connect to the Docker daemon"));
        assert_eq!(leftover_workspaces(&h.base), 0);
    }

    #[tokio::test]
    async fn test_json_output_is_compacted() {
        let h = harness(
            FakeFetcher::default(),
            FakeImages::default(),
            FakeRunner::returning(RawExecutionOutcome::succeeded(
                "{\n  \"passed\": 3,\n  \"failed\": 0\n}\n".to_string(),
            )),
        );

        let result = h.executor.execute(&request(12, "pass")).await;
        assert_eq!(result.stdout, r#"{"passed":3,"failed":0}"#);
    }

    #[tokio::test]
    async fn test_workspace_failure_reported_without_cleanup() {
        let tmp = TempDir::new().unwrap();
        let occupied = tmp.path().join("occupied");
        std::fs::write(&occupied, "").unwrap();

        let executor = JobExecutor::new(
            "img",
            WorkspaceManager::new(occupied, Arc::new(NoopReclaimer)),
            Arc::new(FakeSecrets),
            Arc::new(FakeFetcher::default()),
            Arc::new(FakeImages::default()),
            Arc::new(FakeRunner::returning(RawExecutionOutcome::succeeded(
                String::new(),
            ))),
        );

        let result = executor.execute(&request(13, "pass")).await;
        assert_eq!(result.exit_code, INFRASTRUCTURE_EXIT_CODE);
        assert!(result.stderr.contains("Failed to create workspace"));
    }

    #[tokio::test]
    async fn test_metadata_dir_written_next_to_pipeline() {
        struct InspectingRunner;

        #[async_trait]
        impl ContainerRunner for InspectingRunner {
            async fn run(&self, spec: &RunSpec<'_>) -> Result<RawExecutionOutcome> {
                assert!(spec.work_dir.join(METADATA_DIR).is_dir());
                Ok(RawExecutionOutcome::succeeded("checked".to_string()))
            }

            async fn available(&self) -> bool {
                true
            }
        }

        let tmp = TempDir::new().unwrap();
        let executor = JobExecutor::new(
            "img",
            WorkspaceManager::new(tmp.path().join("jobs"), Arc::new(NoopReclaimer)),
            Arc::new(FakeSecrets),
            Arc::new(FakeFetcher::default()),
            Arc::new(FakeImages::default()),
            Arc::new(InspectingRunner),
        );

        let result = executor.execute(&request(14, "pass")).await;
        assert_eq!(result.stdout, "checked");
    }
}
