//! Docker Engine API implementation of ContainerRunner.

use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::service::{HostConfig, Mount, MountTypeEnum};
use bollard::Docker;
use chrono::Utc;
use futures_util::StreamExt;
use tfpipe_core::CancelToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{ContainerConfig, RunConfig};
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{ContainerRunner, ExecutionResult};

/// Docker-based container runner talking to the engine API.
pub struct DockerRunner {
    client: Docker,
}

enum Outcome {
    Exited(RunnerResult<i64>),
    TimedOut,
    Cancelled,
}

impl DockerRunner {
    /// Connect to the local engine and verify it responds.
    pub async fn new() -> RunnerResult<Self> {
        let client = Docker::connect_with_local_defaults()?;
        client
            .ping()
            .await
            .map_err(|e| RunnerError::RuntimeNotAvailable(e.to_string()))?;
        Ok(Self { client })
    }

    /// Create with custom Docker host.
    pub async fn with_host(host: &str) -> RunnerResult<Self> {
        let client = Docker::connect_with_http(host, 120, bollard::API_DEFAULT_VERSION)?;
        client
            .ping()
            .await
            .map_err(|e| RunnerError::RuntimeNotAvailable(e.to_string()))?;
        Ok(Self { client })
    }

    fn generate_container_name(prefix: Option<&str>) -> String {
        let id = Uuid::new_v4().simple().to_string()[..12].to_string();
        format!("{}-{}", prefix.unwrap_or("tfpipe"), id)
    }

    fn container_config(config: &ContainerConfig, run_config: &RunConfig) -> Config<String> {
        let mut mounts: Vec<Mount> = config
            .mounts
            .iter()
            .map(|m| Mount {
                target: Some(m.target.clone()),
                source: Some(m.source.to_string_lossy().to_string()),
                typ: Some(MountTypeEnum::BIND),
                read_only: Some(m.read_only),
                ..Default::default()
            })
            .collect();

        mounts.extend(config.caches.iter().map(|c| Mount {
            target: Some(c.target.clone()),
            source: Some(c.name.clone()),
            typ: Some(MountTypeEnum::VOLUME),
            ..Default::default()
        }));

        // Secrets travel in the create request body, never on a command line.
        let env: Vec<String> = config
            .all_env()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let host_config = HostConfig {
            mounts: Some(mounts),
            // Removed manually once logs are collected.
            auto_remove: Some(false),
            memory: run_config.memory_limit,
            nano_cpus: run_config.cpu_limit.map(|c| (c * 1_000_000_000.0) as i64),
            network_mode: config.network_mode.clone(),
            ..Default::default()
        };

        Config {
            image: Some(config.full_image()),
            entrypoint: config.entrypoint.clone().map(|e| vec![e]),
            cmd: if config.command.is_empty() {
                None
            } else {
                Some(config.command.clone())
            },
            working_dir: config.workdir.clone(),
            env: Some(env),
            host_config: Some(host_config),
            user: config.user.clone(),
            ..Default::default()
        }
    }

    async fn wait_for_exit(&self, container_id: &str) -> RunnerResult<i64> {
        let mut wait_stream = self
            .client
            .wait_container(container_id, None::<WaitContainerOptions<String>>);

        match wait_stream.next().await {
            Some(Ok(exit)) => Ok(exit.status_code),
            // Non-zero exits arrive as an error carrying the code.
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(RunnerError::ExecutionFailed(e.to_string())),
            None => Err(RunnerError::ExecutionFailed("Container wait failed".into())),
        }
    }

    async fn collect_logs(&self, container_id: &str, name: &str, stream_logs: bool) -> (String, String) {
        let log_options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let mut stdout = String::new();
        let mut stderr = String::new();

        let mut log_stream = self.client.logs(container_id, Some(log_options));
        while let Some(result) = log_stream.next().await {
            match result {
                Ok(LogOutput::StdOut { message }) => {
                    let text = String::from_utf8_lossy(&message);
                    if stream_logs {
                        info!("[{}] [stdout] {}", name, text.trim_end());
                    }
                    stdout.push_str(&text);
                }
                Ok(LogOutput::StdErr { message }) => {
                    let text = String::from_utf8_lossy(&message);
                    if stream_logs {
                        info!("[{}] [stderr] {}", name, text.trim_end());
                    }
                    stderr.push_str(&text);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Failed reading logs of {}: {}", name, e);
                    break;
                }
            }
        }

        (stdout, stderr)
    }

    async fn remove(&self, container_id: &str) {
        let removed = self
            .client
            .remove_container(
                container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await;
        if let Err(e) = removed {
            warn!("Failed to remove container {}: {}", container_id, e);
        }
    }
}

#[async_trait]
impl ContainerRunner for DockerRunner {
    async fn is_available(&self) -> RunnerResult<bool> {
        Ok(self.client.ping().await.is_ok())
    }

    async fn version(&self) -> RunnerResult<String> {
        let version = self.client.version().await?;
        Ok(format!(
            "Docker {} (API {})",
            version.version.unwrap_or_default(),
            version.api_version.unwrap_or_default()
        ))
    }

    async fn pull_image(&self, image: &str, tag: &str) -> RunnerResult<()> {
        info!("Pulling image {}:{}", image, tag);

        let options = CreateImageOptions {
            from_image: image,
            tag,
            ..Default::default()
        };

        let mut stream = self.client.create_image(Some(options), None, None);
        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!("Pull status: {}", status);
                    }
                }
                Err(e) => {
                    return Err(RunnerError::ImagePullFailed(format!(
                        "{}:{}: {}",
                        image, tag, e
                    )));
                }
            }
        }

        info!("Image {}:{} pulled successfully", image, tag);
        Ok(())
    }

    async fn image_exists(&self, image: &str, tag: &str) -> RunnerResult<bool> {
        let full_image = format!("{}:{}", image, tag);
        match self.client.inspect_image(&full_image).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn run_container(
        &self,
        config: &ContainerConfig,
        run_config: &RunConfig,
        cancel: &CancelToken,
    ) -> RunnerResult<ExecutionResult> {
        let container_name = Self::generate_container_name(config.name_prefix.as_deref());
        let started_at = Utc::now();

        debug!(
            "Running container {} with image {}",
            container_name,
            config.full_image()
        );

        if cancel.is_cancelled() {
            return Err(RunnerError::Cancelled);
        }

        if run_config.pull_image && !self.image_exists(&config.image, &config.tag).await? {
            self.pull_image(&config.image, &config.tag).await?;
        }

        let create_options = CreateContainerOptions {
            name: container_name.as_str(),
            platform: None,
        };
        let container = self
            .client
            .create_container(
                Some(create_options),
                Self::container_config(config, run_config),
            )
            .await?;
        let container_id = container.id;

        if let Err(e) = self
            .client
            .start_container(&container_id, None::<StartContainerOptions<String>>)
            .await
        {
            self.remove(&container_id).await;
            return Err(e.into());
        }

        let outcome = tokio::select! {
            code = self.wait_for_exit(&container_id) => Outcome::Exited(code),
            _ = deadline(run_config.timeout_seconds) => Outcome::TimedOut,
            _ = cancel.cancelled() => Outcome::Cancelled,
        };

        let exit_code = match outcome {
            Outcome::Exited(Ok(code)) => code,
            Outcome::Exited(Err(e)) => {
                self.remove(&container_id).await;
                return Err(e);
            }
            Outcome::TimedOut => {
                warn!("Container {} timed out", container_name);
                self.remove(&container_id).await;
                return Err(RunnerError::Timeout(run_config.timeout_seconds));
            }
            Outcome::Cancelled => {
                info!("Container {} cancelled", container_name);
                self.remove(&container_id).await;
                return Err(RunnerError::Cancelled);
            }
        };

        let (stdout, stderr) = self
            .collect_logs(&container_id, &container_name, run_config.stream_logs)
            .await;

        let finished_at = Utc::now();
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;

        if config.auto_remove {
            self.remove(&container_id).await;
        }

        Ok(ExecutionResult {
            container_id,
            exit_code,
            stdout,
            stderr,
            started_at,
            finished_at,
            duration_ms,
        })
    }
}

async fn deadline(seconds: u64) {
    if seconds == 0 {
        std::future::pending::<()>().await;
    } else {
        tokio::time::sleep(Duration::from_secs(seconds)).await;
    }
}
