//! Error types for the Terraform module.

use std::fmt;

use thiserror::Error;

/// Result type alias for IaC operations.
pub type IacResult<T> = Result<T, IacError>;

/// Group of mandatory files checked by file verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileCategory {
    Module,
    Docs,
    Tooling,
    Extra,
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Module => "Terraform module",
            Self::Docs => "documentation",
            Self::Tooling => "tooling",
            Self::Extra => "extra",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during IaC operations.
#[derive(Error, Debug)]
pub enum IacError {
    #[error("Invalid environment variable '{0}': expected KEY=VALUE")]
    InvalidEnvVar(String),

    #[error("Invalid Terraform variable '{0}': expected KEY=VALUE with a non-empty key")]
    InvalidVariable(String),

    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("Terraform command cannot be empty")]
    EmptyCommand,

    #[error("Invalid log level '{0}': expected one of trace, debug, info, warn, error, off")]
    InvalidLogLevel(String),

    #[error("Invalid Terraform version '{0}'")]
    InvalidVersion(String),

    #[error("Failed to load .env files: {0}")]
    DotEnv(String),

    #[error("mandatory {category} files are missing: {missing:?} (required: {required:?})")]
    MissingFiles {
        category: FileCategory,
        missing: Vec<String>,
        required: Vec<String>,
    },

    #[error("Invalid source directory {path}: {reason}")]
    InvalidSourceDir { path: String, reason: String },

    #[error(transparent)]
    Task(#[from] tfpipe_core::TaskError),

    #[error(transparent)]
    Core(#[from] tfpipe_core::CoreError),

    #[error("Runner error: {0}")]
    Runner(#[from] tfpipe_runner::RunnerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl IacError {
    /// Whether the failure came from a check or command rather than from setup or input.
    pub fn is_check_failure(&self) -> bool {
        matches!(
            self,
            Self::Task(_) | Self::Core(tfpipe_core::CoreError::AggregationFailed { .. }) | Self::MissingFiles { .. }
        )
    }
}
