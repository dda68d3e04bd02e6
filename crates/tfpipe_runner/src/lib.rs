//! # tfpipe_runner
//!
//! Container execution for tfpipe.
//!
//! Every task runs in its own container. [`ContainerEnvironment`] adapts a
//! [`ContainerRunner`] to the [`tfpipe_core::ExecutionEnvironment`] contract:
//! setup steps and commands run as one `/bin/sh` script, the last command's
//! stdout is returned, and a failure is attributed to the step that caused it.
//!
//! # Runners
//!
//! - [`CliRunner`]: drives the `docker` or `podman` binary
//! - [`DockerRunner`]: talks to the Docker Engine API through bollard
//! - [`MockRunner`]: scripted behaviour for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tfpipe_core::{CancelToken, CommandLine, ExecutionEnvironment};
//! use tfpipe_runner::{CliRunner, CliRunnerOptions, ContainerConfig, ContainerEnvironment, RunConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runner = CliRunner::new(CliRunnerOptions::default())?;
//!     let config = ContainerConfig::new("hashicorp/terraform")
//!         .tag("1.12.0")
//!         .workdir("/mnt");
//!
//!     let env = ContainerEnvironment::new(Arc::new(runner), config, RunConfig::default());
//!     let output = env
//!         .run(&CancelToken::never(), &[CommandLine::terraform(["version"])])
//!         .await?;
//!     println!("{}", output);
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod docker;
pub mod environment;
pub mod error;
pub mod mock;
pub mod runner;
pub mod script;

pub use cli::{CliRunner, CliRunnerOptions, ContainerRuntime, LogStream};
pub use config::{CacheVolume, ContainerConfig, MountConfig, RunConfig, SetupStep};
pub use docker::DockerRunner;
pub use environment::ContainerEnvironment;
pub use error::{RunnerError, RunnerResult};
pub use mock::{CapturedCall, MockResponse, MockRule, MockRunner};
pub use runner::{ContainerRunner, ExecutionResult};
pub use script::{Script, ScriptStep, StepKind};
