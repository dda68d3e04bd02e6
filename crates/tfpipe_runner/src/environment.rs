//! Container-backed execution environment.

use std::sync::Arc;

use async_trait::async_trait;
use tfpipe_core::{CancelToken, CommandLine, EnvironmentError, ExecutionEnvironment};
use tracing::debug;

use crate::config::{ContainerConfig, RunConfig};
use crate::error::RunnerError;
use crate::runner::ContainerRunner;
use crate::script::{strip_markers, Script, StepKind};

/// Runs command sequences in a fresh container built from `config`.
///
/// Each call to [`ExecutionEnvironment::run`] starts one container that runs
/// the config's setup steps and then the commands, stopping at the first
/// failure.
#[derive(Clone)]
pub struct ContainerEnvironment {
    runner: Arc<dyn ContainerRunner>,
    config: ContainerConfig,
    run_config: RunConfig,
}

impl ContainerEnvironment {
    pub fn new(runner: Arc<dyn ContainerRunner>, config: ContainerConfig, run_config: RunConfig) -> Self {
        Self {
            runner,
            config,
            run_config,
        }
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    pub fn run_config(&self) -> &RunConfig {
        &self.run_config
    }
}

impl std::fmt::Debug for ContainerEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerEnvironment")
            .field("image", &self.config.full_image())
            .field("setup_steps", &self.config.setup.len())
            .finish()
    }
}

#[async_trait]
impl ExecutionEnvironment for ContainerEnvironment {
    async fn run(
        &self,
        cancel: &CancelToken,
        commands: &[CommandLine],
    ) -> Result<String, EnvironmentError> {
        let script = Script::new(&self.config.setup, commands);
        if script.is_empty() {
            return Ok(String::new());
        }

        let config = self
            .config
            .clone()
            .entrypoint("/bin/sh")
            .command(vec!["-c".to_string(), script.render()]);

        debug!(
            "Running {} step(s) in {}",
            script.steps().len(),
            config.full_image()
        );

        let result = self
            .runner
            .run_container(&config, &self.run_config, cancel)
            .await
            .map_err(into_environment_error)?;

        if result.success() {
            return Ok(script.final_output(&result.stdout));
        }

        let Some(failure) = script.failed_step(&result.stderr) else {
            return Err(EnvironmentError::Setup {
                step: "start-container".to_string(),
                message: describe_exit(result.exit_code, &strip_markers(&result.stderr)),
            });
        };

        let message = describe_exit(result.exit_code, &failure.stderr);
        match failure.step.kind {
            StepKind::Setup => Err(EnvironmentError::Setup {
                step: failure.step.name.clone(),
                message,
            }),
            StepKind::Command => Err(EnvironmentError::Command {
                command: failure.step.command.clone(),
                exit_code: Some(result.exit_code),
                message,
            }),
        }
    }
}

fn into_environment_error(err: RunnerError) -> EnvironmentError {
    match err {
        RunnerError::Cancelled => EnvironmentError::Cancelled,
        RunnerError::ImagePullFailed(message) => EnvironmentError::Setup {
            step: "pull-image".to_string(),
            message,
        },
        RunnerError::InvalidMount(message) => EnvironmentError::Setup {
            step: "mount".to_string(),
            message,
        },
        other => EnvironmentError::Unavailable(other.to_string()),
    }
}

fn describe_exit(exit_code: i64, stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("exited with code {}", exit_code)
    } else {
        stderr.to_string()
    }
}
