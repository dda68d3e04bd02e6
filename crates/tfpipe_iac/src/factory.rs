//! Environment factory handing out one Terraform container per task.

use std::sync::Arc;

use tfpipe_core::{EnvironmentError, EnvironmentFactory, ExecutionEnvironment};
use tfpipe_runner::{ContainerEnvironment, ContainerRunner, RunConfig};
use tracing::debug;

use crate::job::TerraformJob;

/// Builds a [`ContainerEnvironment`] from a job bound to the requested version.
#[derive(Clone)]
pub struct ContainerEnvironmentFactory {
    runner: Arc<dyn ContainerRunner>,
    job: TerraformJob,
    run_config: RunConfig,
}

impl ContainerEnvironmentFactory {
    pub fn new(runner: Arc<dyn ContainerRunner>, job: TerraformJob, run_config: RunConfig) -> Self {
        Self {
            runner,
            job,
            run_config,
        }
    }
}

impl EnvironmentFactory for ContainerEnvironmentFactory {
    fn for_version(&self, version: &str) -> Result<Arc<dyn ExecutionEnvironment>, EnvironmentError> {
        let job = self
            .job
            .with_terraform_version(version)
            .map_err(|e| EnvironmentError::Setup {
                step: "resolve-version".to_string(),
                message: e.to_string(),
            })?;

        let config = job.container_config();
        debug!("Prepared {} for Terraform {}", config.full_image(), version);

        Ok(Arc::new(ContainerEnvironment::new(
            self.runner.clone(),
            config,
            self.run_config.clone(),
        )))
    }
}
