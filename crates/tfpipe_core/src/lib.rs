//! # tfpipe_core
//!
//! Concurrent fan-out of command sequences over independent execution
//! environments, with result aggregation.
//!
//! The crate knows nothing about containers. An [`ExecutionEnvironment`] is an
//! opaque handle that runs an ordered list of [`CommandLine`]s and returns the
//! last command's output or the first failure. The [`Dispatcher`] runs one
//! [`TaskDescriptor`] per worker, every worker emits exactly one
//! [`TaskResult`], and [`aggregate`] turns the results into an
//! [`AggregateReport`] or the first failure.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tfpipe_core::{
//!     build_matrix, cancel_channel, CheckDefinition, CommandLine, Dispatcher,
//!     EnvironmentError, ExecutionEnvironment,
//! };
//!
//! # async fn demo(factory: impl Fn(&str) -> Result<Arc<dyn ExecutionEnvironment>, EnvironmentError> + Send + Sync) -> Result<(), Box<dyn std::error::Error>> {
//! let checks = vec![CheckDefinition::new(
//!     "init",
//!     vec![
//!         CommandLine::terraform(["version"]),
//!         CommandLine::terraform(["init", "-backend=false"]),
//!     ],
//! )];
//! let versions = vec!["1.12.0".to_string(), "1.12.1".to_string()];
//!
//! let descriptors = build_matrix(&versions, &checks, &factory)?;
//! let (_source, cancel) = cancel_channel();
//! let report = Dispatcher::new().run_matrix(descriptors, &cancel).await?;
//! println!("{}", report.combined_output());
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod cancel;
pub mod command;
pub mod dispatcher;
pub mod environment;
pub mod error;
pub mod matrix;
pub mod task;

pub use aggregator::{aggregate, AggregateReport, ReportEntry};
pub use cancel::{cancel_channel, CancelSource, CancelToken};
pub use command::CommandLine;
pub use dispatcher::{run_matrix, Dispatcher};
pub use environment::{EnvironmentError, EnvironmentFactory, ExecutionEnvironment};
pub use error::{CoreError, CoreResult, TaskError};
pub use matrix::{build_matrix, matrix_label, CheckDefinition};
pub use task::{TaskDescriptor, TaskResult};
