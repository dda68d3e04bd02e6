//! CLI-based container runner supporting Docker and Podman.
//!
//! Containers are started through the runtime's command line tool. Secret
//! environment values are handed to the client process through its own
//! environment and forwarded by name with `-e KEY`, so they never appear in
//! the argument list.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tfpipe_core::CancelToken;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::{ContainerConfig, RunConfig};
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{ContainerRunner, ExecutionResult};

/// Container runtime type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerRuntime {
    Docker,
    Podman,
}

impl ContainerRuntime {
    /// Get the CLI command name.
    pub fn command(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
        }
    }
}

impl std::fmt::Display for ContainerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.command())
    }
}

/// Output stream of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// CLI-based container runner options.
#[derive(Debug, Clone, Default)]
pub struct CliRunnerOptions {
    /// Preferred runtime (if not set, auto-detect)
    pub preferred_runtime: Option<ContainerRuntime>,
    /// Dry-run mode (log commands without executing)
    pub dry_run: bool,
}

impl CliRunnerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn prefer(mut self, runtime: ContainerRuntime) -> Self {
        self.preferred_runtime = Some(runtime);
        self
    }
}

/// CLI-based container runner.
pub struct CliRunner {
    runtime: ContainerRuntime,
    options: CliRunnerOptions,
}

enum Outcome {
    Exited(std::io::Result<std::process::ExitStatus>),
    TimedOut,
    Cancelled,
}

impl CliRunner {
    /// Create a new CLI runner with automatic runtime detection.
    pub fn new(options: CliRunnerOptions) -> RunnerResult<Self> {
        let runtime = Self::detect_runtime(&options)?;
        info!("Using container runtime: {}", runtime);

        Ok(Self { runtime, options })
    }

    /// Create a runner with a specific runtime.
    pub fn with_runtime(runtime: ContainerRuntime, options: CliRunnerOptions) -> Self {
        Self { runtime, options }
    }

    /// Detect available container runtime.
    pub fn detect_runtime(options: &CliRunnerOptions) -> RunnerResult<ContainerRuntime> {
        if let Some(preferred) = options.preferred_runtime {
            if options.dry_run || Self::is_runtime_available(preferred) {
                return Ok(preferred);
            }
            warn!(
                "Preferred runtime {} not available, trying alternatives",
                preferred
            );
        }

        for runtime in [ContainerRuntime::Docker, ContainerRuntime::Podman] {
            if Self::is_runtime_available(runtime) {
                return Ok(runtime);
            }
        }

        Err(RunnerError::RuntimeNotAvailable(
            "Neither Docker nor Podman is available".to_string(),
        ))
    }

    fn is_runtime_available(runtime: ContainerRuntime) -> bool {
        std::process::Command::new(runtime.command())
            .arg("version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Get the current runtime.
    pub fn runtime(&self) -> ContainerRuntime {
        self.runtime
    }

    /// Check if dry-run mode is enabled.
    pub fn is_dry_run(&self) -> bool {
        self.options.dry_run
    }

    /// Build the command line arguments for running a container.
    fn build_run_args(
        &self,
        config: &ContainerConfig,
        run_config: &RunConfig,
        name: &str,
    ) -> Vec<String> {
        let mut args = vec!["run".to_string()];

        if config.auto_remove {
            args.push("--rm".to_string());
        }

        args.push("--name".to_string());
        args.push(name.to_string());

        if let Some(entrypoint) = &config.entrypoint {
            args.push("--entrypoint".to_string());
            args.push(entrypoint.clone());
        }

        if let Some(workdir) = &config.workdir {
            args.push("-w".to_string());
            args.push(workdir.clone());
        }

        for (key, value) in &config.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }

        // Value comes from the client's environment.
        for key in config.secret_env.keys() {
            args.push("-e".to_string());
            args.push(key.clone());
        }

        for mount in &config.mounts {
            args.push("-v".to_string());
            let mut spec = format!("{}:{}", mount.source.to_string_lossy(), mount.target);
            if mount.read_only {
                spec.push_str(":ro");
            }
            args.push(spec);
        }

        for cache in &config.caches {
            args.push("-v".to_string());
            args.push(format!("{}:{}", cache.name, cache.target));
        }

        if let Some(user) = &config.user {
            args.push("-u".to_string());
            args.push(user.clone());
        }

        if let Some(network) = &config.network_mode {
            args.push("--network".to_string());
            args.push(network.clone());
        }

        if let Some(memory) = run_config.memory_limit {
            args.push("-m".to_string());
            args.push(format!("{}b", memory));
        }

        if let Some(cpus) = run_config.cpu_limit {
            args.push("--cpus".to_string());
            args.push(format!("{:.2}", cpus));
        }

        args.push(config.full_image());
        args.extend(config.command.iter().cloned());

        args
    }

    /// Format command for logging.
    fn format_command(&self, args: &[String]) -> String {
        let mut cmd = self.runtime.command().to_string();
        for arg in args {
            if arg.contains(' ') || arg.contains('=') || arg.contains('\n') {
                cmd.push_str(&format!(" '{}'", arg));
            } else {
                cmd.push_str(&format!(" {}", arg));
            }
        }
        cmd
    }

    /// Execute the runtime client, capturing both streams.
    async fn execute(
        &self,
        args: &[String],
        secrets: &BTreeMap<String, String>,
        name: &str,
        run_config: &RunConfig,
        cancel: &CancelToken,
    ) -> RunnerResult<(i64, String, String)> {
        let mut cmd = Command::new(self.runtime.command());
        cmd.args(args)
            .envs(secrets)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Executing: {}", self.format_command(args));

        let mut child = cmd.spawn().map_err(|e| {
            RunnerError::ExecutionFailed(format!("Failed to spawn {}: {}", self.runtime, e))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::ExecutionFailed("stdout was not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RunnerError::ExecutionFailed("stderr was not captured".into()))?;

        let stdout_task = tokio::spawn(collect_stream(
            stdout,
            LogStream::Stdout,
            name.to_string(),
            run_config.stream_logs,
        ));
        let stderr_task = tokio::spawn(collect_stream(
            stderr,
            LogStream::Stderr,
            name.to_string(),
            run_config.stream_logs,
        ));

        let outcome = tokio::select! {
            status = child.wait() => Outcome::Exited(status),
            _ = deadline(run_config.timeout_seconds) => Outcome::TimedOut,
            _ = cancel.cancelled() => Outcome::Cancelled,
        };

        let status = match outcome {
            Outcome::Exited(status) => status.map_err(|e| {
                RunnerError::ExecutionFailed(format!("Failed to wait for process: {}", e))
            })?,
            Outcome::TimedOut => {
                warn!("Container {} timed out", name);
                self.terminate(&mut child, name).await;
                return Err(RunnerError::Timeout(run_config.timeout_seconds));
            }
            Outcome::Cancelled => {
                info!("Container {} cancelled", name);
                self.terminate(&mut child, name).await;
                return Err(RunnerError::Cancelled);
            }
        };

        let stdout_output = stdout_task.await.unwrap_or_default();
        let stderr_output = stderr_task.await.unwrap_or_default();
        let exit_code = status.code().unwrap_or(-1) as i64;

        Ok((exit_code, stdout_output, stderr_output))
    }

    /// Kill the client and force-remove the container it started.
    async fn terminate(&self, child: &mut tokio::process::Child, name: &str) {
        if let Err(e) = child.kill().await {
            debug!("Client for {} already gone: {}", name, e);
        }
        let removed = Command::new(self.runtime.command())
            .args(["rm", "-f", name])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Err(e) = removed {
            warn!("Failed to remove container {}: {}", name, e);
        }
    }

    /// Run a simple command (like version, pull).
    async fn run_simple_command(&self, args: &[&str]) -> RunnerResult<String> {
        let output = Command::new(self.runtime.command())
            .args(args)
            .output()
            .await
            .map_err(|e| RunnerError::ExecutionFailed(e.to_string()))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(RunnerError::ExecutionFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ))
        }
    }
}

/// Read `stream` to the end, decoding each line lossily so that bytes which
/// are not UTF-8 never cut the output short.
async fn collect_stream<R>(stream: R, kind: LogStream, name: String, stream_logs: bool) -> String
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    let mut output = String::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let chunk = String::from_utf8_lossy(&buf);
                if stream_logs {
                    info!("[{}] [{}] {}", name, kind, chunk.trim_end_matches(['\r', '\n']));
                }
                output.push_str(&chunk);
            }
            Err(e) => {
                warn!("Stopped reading {} of {}: {}", kind, name, e);
                break;
            }
        }
    }
    output
}

async fn deadline(seconds: u64) {
    if seconds == 0 {
        std::future::pending::<()>().await;
    } else {
        tokio::time::sleep(Duration::from_secs(seconds)).await;
    }
}

fn container_name(config: &ContainerConfig) -> String {
    let prefix = config.name_prefix.as_deref().unwrap_or("tfpipe");
    format!("{}-{}", prefix, &uuid::Uuid::new_v4().simple().to_string()[..12])
}

#[async_trait]
impl ContainerRunner for CliRunner {
    async fn is_available(&self) -> RunnerResult<bool> {
        Ok(self.run_simple_command(&["version"]).await.is_ok())
    }

    async fn version(&self) -> RunnerResult<String> {
        let output = self
            .run_simple_command(&["version", "--format", "{{.Server.Version}}"])
            .await?;
        Ok(format!("{} {}", self.runtime, output.trim()))
    }

    async fn pull_image(&self, image: &str, tag: &str) -> RunnerResult<()> {
        let full_image = format!("{}:{}", image, tag);
        info!("Pulling image: {}", full_image);

        if self.options.dry_run {
            info!("[DRY-RUN] Would pull: {}", full_image);
            return Ok(());
        }

        let output = Command::new(self.runtime.command())
            .args(["pull", &full_image])
            .output()
            .await
            .map_err(|e| RunnerError::ImagePullFailed(e.to_string()))?;

        if output.status.success() {
            info!("Successfully pulled: {}", full_image);
            Ok(())
        } else {
            Err(RunnerError::ImagePullFailed(format!(
                "{}: {}",
                full_image,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }

    async fn image_exists(&self, image: &str, tag: &str) -> RunnerResult<bool> {
        let full_image = format!("{}:{}", image, tag);
        let status = Command::new(self.runtime.command())
            .args(["image", "inspect", &full_image])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| RunnerError::ExecutionFailed(e.to_string()))?;

        Ok(status.success())
    }

    async fn run_container(
        &self,
        config: &ContainerConfig,
        run_config: &RunConfig,
        cancel: &CancelToken,
    ) -> RunnerResult<ExecutionResult> {
        let name = container_name(config);
        let args = self.build_run_args(config, run_config, &name);
        let cmd_str = self.format_command(&args);

        info!("Running container {} from {}", name, config.full_image());

        if self.options.dry_run {
            info!("[DRY-RUN] Would execute: {}", cmd_str);
            return Ok(ExecutionResult {
                container_id: "dry-run".to_string(),
                exit_code: 0,
                stdout: format!("[DRY-RUN] Command: {}", cmd_str),
                stderr: String::new(),
                started_at: Utc::now(),
                finished_at: Utc::now(),
                duration_ms: 0,
            });
        }

        config.validate_mounts()?;

        if cancel.is_cancelled() {
            return Err(RunnerError::Cancelled);
        }

        if run_config.pull_image && !self.image_exists(&config.image, &config.tag).await? {
            self.pull_image(&config.image, &config.tag).await?;
        }

        let started_at = Utc::now();
        let (exit_code, stdout, stderr) = self
            .execute(&args, &config.secret_env, &name, run_config, cancel)
            .await?;
        let finished_at = Utc::now();
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;

        if exit_code == 0 {
            info!("Container {} completed in {}ms", name, duration_ms);
        } else {
            warn!(
                "Container {} exited with code {} after {}ms",
                name, exit_code, duration_ms
            );
        }

        Ok(ExecutionResult {
            container_id: name,
            exit_code,
            stdout,
            stderr,
            started_at,
            finished_at,
            duration_ms,
        })
    }
}
