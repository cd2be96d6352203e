//! Service layer
//!
//! Services hold the job lifecycle logic: workspace allocation, source
//! checkout, pipeline materialization, secret handling and result
//! normalization. Collaborators that touch the outside world sit behind
//! traits so the executor can be tested with fakes.

mod execution;
pub mod pipeline;
pub mod result;
pub mod secrets;
pub mod source;
pub mod workspace;

pub use execution::JobExecutor;
pub use pipeline::PipelineMaterializer;
pub use secrets::{FernetSecretResolver, SecretError, SecretResolver};
pub use source::{GitSourceFetcher, SourceFetcher};
pub use workspace::{ChmodReclaimer, Workspace, WorkspaceManager, WorkspaceReclaimer};
