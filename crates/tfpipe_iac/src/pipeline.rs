//! Terraform validation actions.

use std::sync::Arc;

use tfpipe_core::{
    build_matrix, AggregateReport, CancelToken, CheckDefinition, CommandLine, Dispatcher,
    TaskDescriptor, TaskResult,
};
use tfpipe_runner::{ContainerRunner, RunConfig};
use tracing::{debug, info};

use crate::checks;
use crate::error::{IacError, IacResult};
use crate::factory::ContainerEnvironmentFactory;
use crate::job::TerraformJob;
use crate::parse::build_terraform_command;
use crate::tools::ToolVersion;
use crate::verify;

/// Runs Terraform checks and commands in containers built from a job.
pub struct TerraformPipeline {
    runner: Arc<dyn ContainerRunner>,
    job: TerraformJob,
    run_config: RunConfig,
    max_parallel: usize,
}

impl TerraformPipeline {
    pub fn new(runner: Arc<dyn ContainerRunner>, job: TerraformJob) -> Self {
        Self {
            runner,
            job,
            run_config: RunConfig::default(),
            max_parallel: 0,
        }
    }

    pub fn with_run_config(mut self, run_config: RunConfig) -> Self {
        self.run_config = run_config;
        self
    }

    /// Limit concurrent containers. `0` means unbounded.
    pub fn max_parallel(mut self, limit: usize) -> Self {
        self.max_parallel = limit;
        self
    }

    pub fn job(&self) -> &TerraformJob {
        &self.job
    }

    /// Replace the job, keeping runner and limits.
    pub fn with_job(mut self, job: TerraformJob) -> Self {
        self.job = job;
        self
    }

    fn factory(&self, job: TerraformJob) -> ContainerEnvironmentFactory {
        ContainerEnvironmentFactory::new(self.runner.clone(), job, self.run_config.clone())
    }

    fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new().max_concurrency(self.max_parallel)
    }

    /// Reject a missing or empty source tree before any container starts.
    fn check_source(&self) -> IacResult<()> {
        if self.job.source_dir().is_none() {
            return Ok(());
        }
        self.validate_source_dir()?;

        if let Some(workdir) = self.job.host_workdir() {
            if !workdir.is_dir() {
                return Err(IacError::InvalidSourceDir {
                    path: workdir.display().to_string(),
                    reason: "module directory does not exist".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Tasks of the static check: one container per check, against the job's version.
    pub fn static_check_tasks(&self) -> IacResult<Vec<TaskDescriptor>> {
        let versions = vec![self.job.terraform_version().to_string()];
        Ok(build_matrix(&versions, &checks::static_checks(), &self.factory(self.job.clone()))?)
    }

    /// Tasks of the compatibility check over `versions`, or the default list when empty.
    pub fn compatibility_tasks(&self, versions: &[String]) -> IacResult<Vec<TaskDescriptor>> {
        let versions = if versions.is_empty() {
            self.job.defaults().compat_versions.clone()
        } else {
            versions.to_vec()
        };
        Ok(build_matrix(
            &versions,
            &checks::compatibility_checks(),
            &self.factory(self.job.clone()),
        )?)
    }

    /// Run `init`, `validate` and `fmt-check` concurrently.
    pub async fn static_check(&self, cancel: &CancelToken) -> IacResult<AggregateReport> {
        self.check_source()?;
        info!("Running static checks with Terraform {}", self.job.terraform_version());
        let tasks = self.static_check_tasks()?;
        Ok(self.dispatcher().run_matrix(tasks, cancel).await?)
    }

    /// Run `init` and `validate` against every version concurrently.
    pub async fn version_compatibility(
        &self,
        versions: &[String],
        cancel: &CancelToken,
    ) -> IacResult<AggregateReport> {
        self.check_source()?;
        let tasks = self.compatibility_tasks(versions)?;
        info!("Running {} compatibility task(s)", tasks.len());
        Ok(self.dispatcher().run_matrix(tasks, cancel).await?)
    }

    /// Run tasks without stopping at the first failure, for summaries.
    pub async fn run_tasks(
        &self,
        tasks: Vec<TaskDescriptor>,
        cancel: &CancelToken,
    ) -> IacResult<Vec<TaskResult>> {
        self.check_source()?;
        Ok(self.dispatcher().run_all(tasks, cancel).await?)
    }

    async fn run_single(
        &self,
        job: TerraformJob,
        name: &str,
        commands: Vec<CommandLine>,
        cancel: &CancelToken,
    ) -> IacResult<String> {
        self.check_source()?;
        let versions = vec![job.terraform_version().to_string()];
        let check = CheckDefinition::new(name, commands);
        let tasks = build_matrix(&versions, &[check], &self.factory(job))?;
        debug!("Running {} in {}", name, self.job.workdir());

        let report = self.dispatcher().run_matrix(tasks, cancel).await?;
        Ok(report.combined_output())
    }

    /// Run `terraform <command> <args>` and return its output.
    pub async fn exec(&self, command: &str, args: &[String], cancel: &CancelToken) -> IacResult<String> {
        let command = build_terraform_command(command, args)?;
        info!("Executing {}", command);
        self.run_single(self.job.clone(), "exec", vec![command], cancel)
            .await
    }

    /// Run tflint, installing it when the job does not already.
    pub async fn lint(&self, cancel: &CancelToken) -> IacResult<String> {
        let job = if self.job.has_tflint() {
            self.job.clone()
        } else {
            let version = ToolVersion::Pinned(self.job.defaults().tflint_version.clone());
            self.job.clone().with_tflint(version)
        };
        self.run_single(job, "lint", checks::lint_commands(), cancel)
            .await
    }

    /// Regenerate `README.md` with terraform-docs.
    pub async fn docs(&self, cancel: &CancelToken) -> IacResult<String> {
        let job = if self.job.has_terraform_docs() {
            self.job.clone()
        } else {
            self.job.clone().with_terraform_docs(None)
        };
        self.run_single(job, "docs", checks::docs_commands(), cancel)
            .await
    }

    /// `terraform init` and `terraform plan`, optionally with a fixture var-file.
    pub async fn plan(&self, fixture: Option<&str>, cancel: &CancelToken) -> IacResult<String> {
        let commands = checks::plan_commands(&self.job.defaults().fixtures_path, fixture);
        self.run_single(self.job.clone(), "plan", commands, cancel)
            .await
    }

    /// Check mandatory files in the module directory.
    pub fn verify_files(&self, extras: &[String]) -> IacResult<()> {
        let dir = self.job.host_workdir().ok_or_else(|| IacError::InvalidSourceDir {
            path: String::new(),
            reason: "no source directory configured".to_string(),
        })?;
        verify::verify_files(&dir, extras)
    }

    pub fn validate_source_dir(&self) -> IacResult<()> {
        match self.job.source_dir() {
            Some(dir) => verify::validate_source_dir(dir),
            None => Err(IacError::InvalidSourceDir {
                path: String::new(),
                reason: "no source directory configured".to_string(),
            }),
        }
    }
}
