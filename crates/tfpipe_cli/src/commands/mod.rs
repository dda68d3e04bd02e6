//! CLI command definitions.
//!
//! Every subcommand maps to one pipeline action. Arguments shared by the
//! container-backed actions live in [`SourceArgs`]; flags that apply to the
//! whole run live in [`GlobalArgs`].

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use thiserror::Error;
use tracing::{info, warn};

use tfpipe_core::CancelToken;
use tfpipe_iac::{GitHost, TerraformJob, TerraformPipeline};
use tfpipe_runner::{
    CliRunner, CliRunnerOptions, ContainerRunner, ContainerRuntime, DockerRunner, RunConfig,
};

use crate::config::{parse_image, FileConfig, RuntimeChoice};
use crate::output::{self, OutputFormat, RunSummary};

pub mod compat;
pub mod docs;
pub mod exec;
pub mod lint;
pub mod plan;
pub mod static_check;
pub mod verify_files;

/// tfpipe - concurrent Terraform validation in containers
#[derive(Parser, Debug)]
#[command(name = "tfpipe")]
#[command(version, about = "tfpipe - concurrent Terraform validation in containers")]
#[command(long_about = r#"
tfpipe runs Terraform checks in isolated containers, one per version and
check, and reports the combined result.

ACTIONS:
  static-check  → init, validate and fmt-check in parallel
  compat        → init and validate across several Terraform versions
  exec          → run one terraform command
  lint          → tflint
  docs          → terraform-docs
  plan          → init and plan, optionally with a fixture
  verify-files  → check mandatory module files (no container)

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments or configuration
  3 - Check failure
  4 - Container runtime error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file (defaults to ./tfpipe.yaml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Container runtime
    #[arg(long, global = true, value_enum)]
    pub runtime: Option<RuntimeChoice>,

    /// Print container commands instead of running them
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Cancel the whole run after this many seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Maximum containers running at once (0 = unbounded)
    #[arg(long, global = true)]
    pub max_parallel: Option<usize>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Log container output while it runs
    #[arg(long, global = true)]
    pub stream_logs: bool,

    #[command(flatten)]
    pub credentials: CredentialArgs,
}

/// Credentials, read from the environment when not given as flags.
#[derive(Args, Debug, Clone, Default)]
pub struct CredentialArgs {
    #[arg(long, global = true, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    pub aws_access_key_id: Option<String>,

    #[arg(long, global = true, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub aws_secret_access_key: Option<String>,

    #[arg(long, global = true, env = "AWS_SESSION_TOKEN", hide_env_values = true)]
    pub aws_session_token: Option<String>,

    #[arg(long, global = true, env = "AWS_REGION")]
    pub aws_region: Option<String>,

    /// Role assumed with a web identity token
    #[arg(long, global = true, env = "AWS_ROLE_ARN")]
    pub aws_role_arn: Option<String>,

    #[arg(long, global = true, env = "AWS_OIDC_TOKEN", hide_env_values = true)]
    pub aws_oidc_token: Option<String>,

    #[arg(long, global = true, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    #[arg(long, global = true, env = "GITLAB_TOKEN", hide_env_values = true)]
    pub gitlab_token: Option<String>,

    /// Token for Terraform Cloud / Enterprise
    #[arg(long, global = true, env = "TF_TOKEN", hide_env_values = true)]
    pub tf_token: Option<String>,

    /// Token for the GitLab Terraform registry
    #[arg(long, global = true, env = "TF_REGISTRY_GITLAB_TOKEN", hide_env_values = true)]
    pub tf_registry_gitlab_token: Option<String>,

    /// Forward the SSH agent socket into containers
    #[arg(long, global = true)]
    pub ssh_agent: bool,

    /// SSH agent socket, used with --ssh-agent
    #[arg(long, global = true, env = "SSH_AUTH_SOCK")]
    pub ssh_auth_sock: Option<PathBuf>,
}

/// Source tree and job options shared by container-backed actions.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Terraform source directory
    #[arg(short, long)]
    pub source: Option<PathBuf>,

    /// Module under the modules root to run in
    #[arg(short, long)]
    pub module: Option<String>,

    /// Terraform version
    #[arg(long = "terraform-version")]
    pub terraform_version: Option<String>,

    /// Image: alpine, official, or <image>[:<tag>]
    #[arg(long)]
    pub image: Option<String>,

    /// Environment variable KEY=VALUE (repeatable)
    #[arg(short, long = "env")]
    pub env: Vec<String>,

    /// Terraform variable NAME=VALUE (repeatable)
    #[arg(long = "var")]
    pub vars: Vec<String>,

    /// Load *.env files from the source directory
    #[arg(long)]
    pub dotenv: bool,

    /// TF_LOG level
    #[arg(long)]
    pub log_level: Option<String>,

    /// TF_WORKSPACE
    #[arg(long)]
    pub workspace: Option<String>,

    /// Terraform -parallelism
    #[arg(long)]
    pub parallelism: Option<u32>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run init, validate and fmt-check concurrently
    #[command(name = "static-check")]
    StaticCheck(static_check::StaticCheckArgs),

    /// Run init and validate across Terraform versions
    Compat(compat::CompatArgs),

    /// Run a terraform command
    Exec(exec::ExecArgs),

    /// Run tflint
    Lint(lint::LintArgs),

    /// Generate README.md with terraform-docs
    Docs(docs::DocsArgs),

    /// Run terraform plan
    Plan(plan::PlanArgs),

    /// Check mandatory module files
    #[command(name = "verify-files")]
    VerifyFiles(verify_files::VerifyFilesArgs),
}

/// Outcome of a multi-task action that did not fully succeed.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("{action}: {failed} of {total} check(s) failed")]
    ChecksFailed {
        action: String,
        failed: usize,
        total: usize,
    },

    #[error("{0}: run cancelled before all checks finished")]
    Cancelled(String),
}

/// Everything a command needs besides its own arguments.
pub struct Invocation {
    pub global: GlobalArgs,
    pub file: FileConfig,
    pub cancel: CancelToken,
}

impl Invocation {
    pub fn format(&self) -> OutputFormat {
        self.global.format
    }

    /// Build the job from file configuration, then command-line overrides.
    pub fn job(&self, source: &SourceArgs) -> Result<TerraformJob> {
        let file = &self.file;
        let mut job = TerraformJob::new(file.defaults.clone())
            .with_cache_buster()
            .with_settings(&file.terraform);

        let source_dir = source
            .source
            .clone()
            .or_else(|| file.source.clone())
            .unwrap_or_else(|| PathBuf::from("."));
        job = job.with_source_dir(source_dir.clone());

        if let Some(module) = source.module.as_ref().or(file.module.as_ref()) {
            job = job.with_module(module.clone());
        }
        if let Some(image) = source.image.as_ref().or(file.image.as_ref()) {
            job = job.with_image(parse_image(image)?);
        }
        if let Some(version) = &source.terraform_version {
            job = job.with_terraform_version(version)?;
        }

        job = job
            .with_env_vars(file.env.as_slice())?
            .with_env_vars(source.env.as_slice())?;
        job = job
            .with_tf_variables(file.variables.as_slice())?
            .with_tf_variables(source.vars.as_slice())?;

        if source.dotenv || file.dotenv {
            job = job.with_dotenv_dir(&source_dir)?;
        }
        if let Some(level) = source.log_level.as_ref().or(file.log_level.as_ref()) {
            job = job.with_log_level(level)?;
        }
        if let Some(workspace) = source.workspace.as_ref().or(file.workspace.as_ref()) {
            job = job.with_workspace(workspace);
        }
        if let Some(parallelism) = source.parallelism.or(file.parallelism) {
            job = job.with_parallelism(parallelism);
        }
        if let Some(args) = &file.cli_args {
            job = job.with_cli_args(args);
        }

        let forward_ssh = self.global.credentials.ssh_agent || file.ssh_agent;
        Ok(apply_credentials(job, &self.global.credentials, forward_ssh))
    }

    async fn runner(&self) -> Result<Arc<dyn ContainerRunner>> {
        let choice = self.global.runtime.or(self.file.runtime);

        if self.global.dry_run {
            // A dry run only renders commands, so no runtime has to be present.
            let runtime = match choice {
                Some(RuntimeChoice::Podman) => ContainerRuntime::Podman,
                Some(RuntimeChoice::Api) => {
                    info!("Dry run with the API runtime, showing the equivalent docker commands");
                    ContainerRuntime::Docker
                }
                Some(RuntimeChoice::Docker) | None => ContainerRuntime::Docker,
            };
            let options = CliRunnerOptions::new().dry_run();
            return Ok(Arc::new(CliRunner::with_runtime(runtime, options)));
        }

        let options = CliRunnerOptions::new();
        let runner: Arc<dyn ContainerRunner> = match choice {
            Some(RuntimeChoice::Api) => Arc::new(DockerRunner::new().await?),
            Some(RuntimeChoice::Docker) => {
                Arc::new(CliRunner::new(options.prefer(ContainerRuntime::Docker))?)
            }
            Some(RuntimeChoice::Podman) => {
                Arc::new(CliRunner::new(options.prefer(ContainerRuntime::Podman))?)
            }
            None => Arc::new(CliRunner::new(options)?),
        };
        Ok(runner)
    }

    pub fn max_parallel(&self) -> usize {
        self.global
            .max_parallel
            .or(self.file.max_parallel)
            .unwrap_or(0)
    }

    /// Pipeline over the job built from `source`.
    pub async fn pipeline(&self, source: &SourceArgs) -> Result<TerraformPipeline> {
        let job = self.job(source)?;
        let runner = self.runner().await?;
        let run_config = RunConfig::default().stream_logs(self.global.stream_logs);

        info!(
            "Terraform {} in {}",
            job.terraform_version(),
            job.workdir()
        );

        Ok(TerraformPipeline::new(runner, job)
            .with_run_config(run_config)
            .max_parallel(self.max_parallel()))
    }

    /// Print a summary and turn failures into a [`RunError`].
    pub fn report(&self, summary: &RunSummary) -> Result<()> {
        if !self.global.quiet || summary.failed > 0 {
            output::print_summary(summary, self.format(), self.global.verbose)
                .context("Failed to print summary")?;
        }

        if summary.any_cancelled() {
            return Err(RunError::Cancelled(summary.action.clone()).into());
        }
        if summary.failed > 0 {
            return Err(RunError::ChecksFailed {
                action: summary.action.clone(),
                failed: summary.failed,
                total: summary.total(),
            }
            .into());
        }
        Ok(())
    }
}

fn apply_credentials(mut job: TerraformJob, creds: &CredentialArgs, forward_ssh: bool) -> TerraformJob {
    let region = creds.aws_region.as_deref();

    if let (Some(key), Some(secret)) = (&creds.aws_access_key_id, &creds.aws_secret_access_key) {
        job = job.with_aws_keys(key.clone(), secret.clone(), creds.aws_session_token.clone(), region);
    }
    if let (Some(role), Some(token)) = (&creds.aws_role_arn, &creds.aws_oidc_token) {
        job = job.with_aws_oidc(role.clone(), token.clone(), region, None);
    }
    if let Some(token) = &creds.github_token {
        job = job.with_github_token(token.clone());
    }
    if let Some(token) = &creds.gitlab_token {
        job = job.with_gitlab_token(token.clone());
    }
    if let Some(token) = &creds.tf_token {
        job = job.with_terraform_token(token.clone());
    }
    if let Some(token) = &creds.tf_registry_gitlab_token {
        job = job.with_registry_gitlab_token(token.clone());
    }
    match (&creds.ssh_auth_sock, forward_ssh) {
        (Some(socket), true) => job = job.with_ssh_agent(socket.clone(), &[GitHost::GitHub]),
        (None, true) => warn!("SSH agent forwarding requested but SSH_AUTH_SOCK is not set"),
        (_, false) => {}
    }
    job
}
