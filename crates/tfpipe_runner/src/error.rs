//! Runner errors.

use thiserror::Error;

pub type RunnerResult<T> = Result<T, RunnerError>;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("no usable container runtime: {0}")]
    RuntimeNotAvailable(String),

    #[error("could not run container: {0}")]
    ExecutionFailed(String),

    #[error("could not pull image {0}")]
    ImagePullFailed(String),

    #[error("container still running after {0}s, stopped")]
    Timeout(u64),

    #[error("container run cancelled")]
    Cancelled,

    #[error("invalid mount: {0}")]
    InvalidMount(String),

    #[error("docker engine API: {0}")]
    DockerApi(#[from] bollard::errors::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
