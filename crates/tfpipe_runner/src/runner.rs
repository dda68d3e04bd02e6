//! The runner seam: something that can run a container to completion.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tfpipe_core::CancelToken;

use crate::config::{ContainerConfig, RunConfig};
use crate::error::RunnerResult;

/// Outcome of one finished container.
///
/// A non-zero exit code is still a completed run; interpreting it is left to
/// the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub container_id: String,
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[async_trait]
pub trait ContainerRunner: Send + Sync {
    /// Whether the runtime answers at all.
    async fn is_available(&self) -> RunnerResult<bool>;

    /// Runtime name and server version, e.g. `docker 27.1.1`.
    async fn version(&self) -> RunnerResult<String>;

    async fn pull_image(&self, image: &str, tag: &str) -> RunnerResult<()>;

    async fn image_exists(&self, image: &str, tag: &str) -> RunnerResult<bool>;

    /// Run `config` until it exits, times out or `cancel` fires.
    ///
    /// Cancellation yields [`RunnerError::Cancelled`](crate::RunnerError::Cancelled),
    /// an expired `run_config.timeout_seconds` yields
    /// [`RunnerError::Timeout`](crate::RunnerError::Timeout). Either way the
    /// container is stopped before returning.
    async fn run_container(
        &self,
        config: &ContainerConfig,
        run_config: &RunConfig,
        cancel: &CancelToken,
    ) -> RunnerResult<ExecutionResult>;
}
