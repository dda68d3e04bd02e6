//! `tfpipe.yaml` configuration file.
//!
//! Values on the command line win over the file, and the file wins over
//! built-in defaults.

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tfpipe_iac::{ImageSource, PipelineDefaults, TerraformSettings};
use tracing::debug;

pub const DEFAULT_CONFIG_FILE: &str = "tfpipe.yaml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid image '{0}': expected alpine, official or <image>[:<tag>]")]
    InvalidImage(String),
}

/// Container runtime selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeChoice {
    /// docker CLI
    Docker,
    /// podman CLI
    Podman,
    /// Docker Engine API
    Api,
}

/// Contents of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub defaults: PipelineDefaults,
    pub runtime: Option<RuntimeChoice>,
    pub max_parallel: Option<usize>,
    /// Overall deadline in seconds.
    pub timeout: Option<u64>,
    pub source: Option<PathBuf>,
    pub module: Option<String>,
    pub image: Option<String>,
    pub env: Vec<String>,
    pub variables: Vec<String>,
    pub dotenv: bool,
    pub log_level: Option<String>,
    pub workspace: Option<String>,
    pub parallelism: Option<u32>,
    pub cli_args: Option<String>,
    /// Terraform CLI behaviour: caches, timeouts, Terraform Cloud.
    pub terraform: TerraformSettings,
    /// Forward the host SSH agent (`SSH_AUTH_SOCK`) into containers.
    pub ssh_agent: bool,
    /// Versions added to the compatibility list.
    pub extra_versions: Vec<String>,
    /// Extra files required by `verify-files`.
    pub extra_files: Vec<String>,
}

impl FileConfig {
    /// Load `explicit`, or `tfpipe.yaml` from the working directory when present.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) if !path.exists() => Err(ConfigError::NotFound(path.to_path_buf())),
            Some(path) => Self::from_file(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::from_file(default)
                } else {
                    debug!("No {} found, using built-in defaults", DEFAULT_CONFIG_FILE);
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Parse `alpine`, `official` (alias `hashicorp`) or an image reference.
pub fn parse_image(value: &str) -> Result<ImageSource, ConfigError> {
    let value = value.trim();
    match value {
        "" => Err(ConfigError::InvalidImage(value.to_string())),
        "alpine" => Ok(ImageSource::Alpine),
        "official" | "hashicorp" => Ok(ImageSource::Official),
        reference => {
            // A colon before the last slash belongs to a registry port.
            let (image, tag) = match reference.rsplit_once(':') {
                Some((image, tag)) if !tag.contains('/') && !image.is_empty() && !tag.is_empty() => {
                    (image, tag)
                }
                _ => (reference, "latest"),
            };
            Ok(ImageSource::Custom {
                image: image.to_string(),
                tag: tag.to_string(),
            })
        }
    }
}
