//! # tfpipe_iac
//!
//! Terraform job configuration and validation actions for tfpipe.
//!
//! A [`TerraformJob`] describes the container a Terraform command runs in.
//! [`TerraformPipeline`] turns it into concurrent checks through the
//! `tfpipe_core` dispatcher, one container per version and check.
//!
//! ## Features
//!
//! - Static checks (`init`, `validate`, `fmt-check`) run concurrently
//! - Version compatibility matrix across Terraform releases
//! - tflint, terraform-docs and `plan` with fixtures
//! - Credentials passed as secrets: AWS keys or OIDC, git tokens, netrc, SSH agent
//! - Host-side verification of mandatory module files
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tfpipe_core::cancel_channel;
//! use tfpipe_iac::{PipelineDefaults, TerraformJob, TerraformPipeline};
//! use tfpipe_runner::{CliRunner, CliRunnerOptions};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let job = TerraformJob::new(PipelineDefaults::default())
//!     .with_source_dir("./infra")
//!     .with_module("vpc");
//! let runner = Arc::new(CliRunner::new(CliRunnerOptions::new())?);
//! let pipeline = TerraformPipeline::new(runner, job).max_parallel(4);
//!
//! let (_source, cancel) = cancel_channel();
//! let report = pipeline.version_compatibility(&[], &cancel).await?;
//! println!("{}", report);
//! # Ok(())
//! # }
//! ```

pub mod checks;
pub mod defaults;
pub mod error;
pub mod factory;
pub mod job;
pub mod parse;
pub mod pipeline;
pub mod tools;
pub mod verify;

pub use defaults::{PipelineDefaults, TerraformSettings};
pub use error::{FileCategory, IacError, IacResult};
pub use factory::ContainerEnvironmentFactory;
pub use job::{GitHost, ImageSource, Secret, TerraformJob};
pub use pipeline::TerraformPipeline;
pub use tools::ToolVersion;
