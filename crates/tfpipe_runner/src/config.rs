//! Container configuration types.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tfpipe_core::CommandLine;

use crate::error::{RunnerError, RunnerResult};

/// Bind mount from the host into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    /// Host path to mount
    pub source: PathBuf,
    /// Container path to mount to
    pub target: String,
    /// Whether the mount is read-only
    pub read_only: bool,
}

impl MountConfig {
    pub fn new(source: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            read_only: false,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// Named volume shared across runs, used for plugin and tool caches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheVolume {
    pub name: String,
    pub target: String,
}

impl CacheVolume {
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
        }
    }
}

/// A named command run before the task's own commands.
///
/// A failing setup step is reported as an environment setup failure rather
/// than a command failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupStep {
    pub name: String,
    pub command: CommandLine,
}

impl SetupStep {
    pub fn new(name: impl Into<String>, command: CommandLine) -> Self {
        Self {
            name: name.into(),
            command,
        }
    }

    /// A step running `script` through `/bin/sh -c`.
    pub fn shell(name: impl Into<String>, script: impl Into<String>) -> Self {
        Self::new(
            name,
            CommandLine::new("/bin/sh", ["-c".to_string(), script.into()]),
        )
    }
}

/// Container configuration.
///
/// Builder methods consume and return the config, so a base config can be
/// cloned and specialised per task without touching the original.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Image to use
    pub image: String,
    /// Image tag (default: latest)
    pub tag: String,
    /// Entrypoint override
    pub entrypoint: Option<String>,
    /// Command to run
    pub command: Vec<String>,
    /// Working directory inside container
    pub workdir: Option<String>,
    /// Environment variables
    pub env: BTreeMap<String, String>,
    /// Environment variables that must not appear on a command line
    #[serde(skip_serializing)]
    #[serde(default)]
    pub secret_env: BTreeMap<String, String>,
    /// Bind mounts
    pub mounts: Vec<MountConfig>,
    /// Named cache volumes
    pub caches: Vec<CacheVolume>,
    /// Steps run before the task commands
    pub setup: Vec<SetupStep>,
    /// Whether to remove container after execution
    pub auto_remove: bool,
    /// Container name prefix
    pub name_prefix: Option<String>,
    /// User to run as (e.g., "1000:1000")
    pub user: Option<String>,
    /// Network mode
    pub network_mode: Option<String>,
}

impl ContainerConfig {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            tag: "latest".to_string(),
            entrypoint: None,
            command: Vec::new(),
            workdir: None,
            env: BTreeMap::new(),
            secret_env: BTreeMap::new(),
            mounts: Vec::new(),
            caches: Vec::new(),
            setup: Vec::new(),
            auto_remove: true,
            name_prefix: None,
            user: None,
            network_mode: None,
        }
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
        self.entrypoint = Some(entrypoint.into());
        self
    }

    pub fn command(mut self, cmd: Vec<String>) -> Self {
        self.command = cmd;
        self
    }

    pub fn workdir(mut self, dir: impl Into<String>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add an environment variable whose value is passed to the runtime
    /// without ever being rendered into its arguments.
    pub fn secret_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.secret_env.insert(key.into(), value.into());
        self
    }

    pub fn mount(mut self, mount: MountConfig) -> Self {
        self.mounts.push(mount);
        self
    }

    pub fn cache(mut self, cache: CacheVolume) -> Self {
        self.caches.push(cache);
        self
    }

    pub fn setup_step(mut self, step: SetupStep) -> Self {
        self.setup.push(step);
        self
    }

    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.network_mode = Some(network.into());
        self
    }

    pub fn auto_remove(mut self, remove: bool) -> Self {
        self.auto_remove = remove;
        self
    }

    /// Get the full image name with tag.
    pub fn full_image(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }

    /// All environment variables, public and secret, in key order.
    pub fn all_env(&self) -> impl Iterator<Item = (&String, &String)> {
        self.env.iter().chain(self.secret_env.iter())
    }

    /// Check that every bind mount source exists on the host.
    pub fn validate_mounts(&self) -> RunnerResult<()> {
        for mount in &self.mounts {
            if !mount.source.exists() {
                return Err(RunnerError::InvalidMount(format!(
                    "{} does not exist (target {})",
                    mount.source.display(),
                    mount.target
                )));
            }
        }
        Ok(())
    }
}

/// Run configuration with timeouts and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Timeout in seconds (0 = no timeout)
    pub timeout_seconds: u64,
    /// Whether to pull image before running
    pub pull_image: bool,
    /// Memory limit in bytes
    pub memory_limit: Option<i64>,
    /// CPU limit (number of CPUs)
    pub cpu_limit: Option<f64>,
    /// Whether to log container output line by line as it arrives
    pub stream_logs: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 0,
            pull_image: true,
            memory_limit: None,
            cpu_limit: None,
            stream_logs: false,
        }
    }
}

impl RunConfig {
    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn no_pull(mut self) -> Self {
        self.pull_image = false;
        self
    }

    pub fn memory(mut self, bytes: i64) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    pub fn cpus(mut self, cpus: f64) -> Self {
        self.cpu_limit = Some(cpus);
        self
    }

    pub fn stream_logs(mut self, enabled: bool) -> Self {
        self.stream_logs = enabled;
        self
    }
}
