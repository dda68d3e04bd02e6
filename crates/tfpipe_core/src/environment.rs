//! Execution environment seam.
//!
//! An environment is a prepared runtime (binaries installed, sources mounted,
//! variables set) that can run an ordered command sequence. Handles are never
//! shared between concurrent tasks; a factory hands out a fresh one per task.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::cancel::CancelToken;
use crate::command::CommandLine;

/// Failure reported by an execution environment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentError {
    #[error("setup step '{step}' failed: {message}")]
    Setup { step: String, message: String },

    #[error("command `{command}` failed{}: {message}", exit_suffix(.exit_code))]
    Command {
        command: CommandLine,
        exit_code: Option<i64>,
        message: String,
    },

    #[error("execution cancelled")]
    Cancelled,

    #[error("environment unavailable: {0}")]
    Unavailable(String),
}

fn exit_suffix(exit_code: &Option<i64>) -> String {
    match exit_code {
        Some(code) => format!(" with exit code {}", code),
        None => String::new(),
    }
}

/// A runtime able to execute command sequences.
#[async_trait]
pub trait ExecutionEnvironment: Send + Sync {
    /// Run `commands` strictly in order against persistent state.
    ///
    /// Returns the stdout of the final command, or the first failure. Later
    /// commands never start once one has failed.
    async fn run(
        &self,
        cancel: &CancelToken,
        commands: &[CommandLine],
    ) -> Result<String, EnvironmentError>;
}

/// Produces independent environments bound to a tool version.
pub trait EnvironmentFactory: Send + Sync {
    fn for_version(&self, version: &str)
        -> Result<Arc<dyn ExecutionEnvironment>, EnvironmentError>;
}

impl<F> EnvironmentFactory for F
where
    F: Fn(&str) -> Result<Arc<dyn ExecutionEnvironment>, EnvironmentError> + Send + Sync,
{
    fn for_version(
        &self,
        version: &str,
    ) -> Result<Arc<dyn ExecutionEnvironment>, EnvironmentError> {
        self(version)
    }
}
