//! Task descriptors and results.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::command::CommandLine;
use crate::environment::{EnvironmentError, ExecutionEnvironment};
use crate::error::TaskError;

/// One unit of work: a labelled command sequence bound to its own environment.
#[derive(Clone)]
pub struct TaskDescriptor {
    label: String,
    commands: Vec<CommandLine>,
    environment: Result<Arc<dyn ExecutionEnvironment>, EnvironmentError>,
}

impl TaskDescriptor {
    pub fn new(
        label: impl Into<String>,
        commands: Vec<CommandLine>,
        environment: Arc<dyn ExecutionEnvironment>,
    ) -> Self {
        Self {
            label: label.into(),
            commands,
            environment: Ok(environment),
        }
    }

    /// A descriptor whose environment could not be constructed.
    ///
    /// Dispatching it still yields a result, carrying `error` under `label`.
    pub fn with_setup_error(
        label: impl Into<String>,
        commands: Vec<CommandLine>,
        error: EnvironmentError,
    ) -> Self {
        Self {
            label: label.into(),
            commands,
            environment: Err(error),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn commands(&self) -> &[CommandLine] {
        &self.commands
    }

    pub fn has_environment(&self) -> bool {
        self.environment.is_ok()
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        String,
        Vec<CommandLine>,
        Result<Arc<dyn ExecutionEnvironment>, EnvironmentError>,
    ) {
        (self.label, self.commands, self.environment)
    }
}

impl fmt::Debug for TaskDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDescriptor")
            .field("label", &self.label)
            .field("commands", &self.commands)
            .field("environment", &self.environment.as_ref().map(|_| "<environment>"))
            .finish()
    }
}

/// Outcome of one task. Created once by its worker, then only read.
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub label: String,
    pub output: String,
    pub error: Option<TaskError>,
    pub duration: Duration,
}

impl TaskResult {
    pub fn success(label: impl Into<String>, output: impl Into<String>, duration: Duration) -> Self {
        Self {
            label: label.into(),
            output: output.into(),
            error: None,
            duration,
        }
    }

    pub fn failure(label: impl Into<String>, error: TaskError, duration: Duration) -> Self {
        Self {
            label: label.into(),
            output: String::new(),
            error: Some(error),
            duration,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
