//! Error types for the core module.

use thiserror::Error;

use crate::command::CommandLine;
use crate::environment::EnvironmentError;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Failure of a single task, carried as data inside a `TaskResult`.
#[derive(Error, Debug, Clone)]
pub enum TaskError {
    #[error("task '{label}' failed running {}: {cause}", describe_command(.command))]
    CommandFailed {
        label: String,
        command: Option<CommandLine>,
        #[source]
        cause: EnvironmentError,
    },

    #[error("task '{label}' could not set up its environment: {cause}")]
    EnvironmentSetupFailed {
        label: String,
        #[source]
        cause: EnvironmentError,
    },

    #[error("task '{label}' worker panicked: {message}")]
    WorkerPanicked { label: String, message: String },
}

impl TaskError {
    /// Classify an environment failure for the task `label`.
    pub fn from_environment(label: impl Into<String>, cause: EnvironmentError) -> Self {
        let label = label.into();
        match cause {
            EnvironmentError::Setup { .. } => Self::EnvironmentSetupFailed { label, cause },
            EnvironmentError::Command { ref command, .. } => Self::CommandFailed {
                label,
                command: Some(command.clone()),
                cause,
            },
            EnvironmentError::Cancelled | EnvironmentError::Unavailable(_) => Self::CommandFailed {
                label,
                command: None,
                cause,
            },
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::CommandFailed { label, .. }
            | Self::EnvironmentSetupFailed { label, .. }
            | Self::WorkerPanicked { label, .. } => label,
        }
    }

    /// Whether the failure was caused by cancellation rather than the task itself.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::CommandFailed {
                cause: EnvironmentError::Cancelled,
                ..
            }
        )
    }
}

fn describe_command(command: &Option<CommandLine>) -> String {
    match command {
        Some(command) => format!("`{}`", command),
        None => "its command sequence".to_string(),
    }
}

/// Errors that can occur during orchestration.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("aggregation failed on '{label}': {cause}")]
    AggregationFailed {
        label: String,
        #[source]
        cause: Box<TaskError>,
    },

    #[error("expected {expected} task results but received {received}")]
    IncompleteResults { expected: usize, received: usize },

    #[error("duplicate task label: {0}")]
    DuplicateLabel(String),

    #[error("command line cannot be empty")]
    EmptyCommand,
}

impl CoreError {
    /// Label of the failing task, when the error names one.
    pub fn failed_label(&self) -> Option<&str> {
        match self {
            Self::AggregationFailed { label, .. } => Some(label),
            _ => None,
        }
    }
}
