//! Pipeline defaults.
//!
//! Every value here is handed to jobs and pipelines explicitly, so callers
//! and tests can replace any of them.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::IacResult;

/// Tool versions, images and paths used when the caller does not say otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineDefaults {
    pub terraform_version: String,
    pub terraform_image: String,
    pub base_image: String,
    pub base_image_tag: String,
    /// Where the source directory is mounted inside containers.
    pub mount_path: String,
    /// Directory holding modules, relative to the source directory.
    pub modules_root: String,
    pub tflint_version: String,
    pub terraform_docs_version: String,
    pub aws_region: String,
    pub aws_oidc_token_name: String,
    pub plugin_cache_path: String,
    pub plugin_cache_volume: String,
    pub data_dir: String,
    pub netrc_path: String,
    pub ssh_socket_path: String,
    /// Versions exercised by the compatibility check when none are given.
    pub compat_versions: Vec<String>,
    /// Directory of `.tfvars` fixtures, relative to the working directory.
    pub fixtures_path: String,
    pub parallelism: u32,
}

impl Default for PipelineDefaults {
    fn default() -> Self {
        Self {
            terraform_version: "1.12.0".to_string(),
            terraform_image: "hashicorp/terraform".to_string(),
            base_image: "alpine".to_string(),
            base_image_tag: "latest".to_string(),
            mount_path: "/mnt".to_string(),
            modules_root: "modules".to_string(),
            tflint_version: "0.58.0".to_string(),
            terraform_docs_version: "0.20.0".to_string(),
            aws_region: "eu-west-1".to_string(),
            aws_oidc_token_name: "AWS_OIDC_TOKEN".to_string(),
            plugin_cache_path: "/root/.terraform.d/plugin-cache".to_string(),
            plugin_cache_volume: "terraform-plugin-cache".to_string(),
            data_dir: "/root/.terraform.d".to_string(),
            netrc_path: "/root/.netrc".to_string(),
            ssh_socket_path: "/var/run/host.sock".to_string(),
            compat_versions: ["1.11.1", "1.11.2", "1.11.3", "1.11.4"]
                .iter()
                .map(|v| v.to_string())
                .collect(),
            fixtures_path: "fixtures".to_string(),
            parallelism: 10,
        }
    }
}

impl PipelineDefaults {
    /// Load defaults from a YAML file; missing keys keep their default.
    pub fn from_file(path: &Path) -> IacResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> IacResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Compatibility versions followed by `extra`, without repeats.
    pub fn compat_versions_with(&self, extra: &[String]) -> Vec<String> {
        let mut versions = self.compat_versions.clone();
        for version in extra {
            let version = version.trim();
            if !version.is_empty() && !versions.iter().any(|v| v == version) {
                versions.push(version.to_string());
            }
        }
        versions
    }
}

/// Terraform CLI behaviour of a job, as read from configuration.
///
/// Unset values leave the Terraform default in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TerraformSettings {
    /// Install git and openssh into Alpine-based images.
    pub install_git: bool,
    /// Share downloaded providers across containers through a named volume.
    pub plugin_cache: bool,
    /// Set `TF_DATA_DIR` to the shared data directory.
    pub data_dir: bool,
    /// Write `.terraform-version` before running.
    pub version_file: bool,
    /// `TF_INPUT`
    pub input: Option<bool>,
    /// `TF_LOG_PATH`
    pub log_path: Option<String>,
    /// `TF_REGISTRY_CLIENT_TIMEOUT` in seconds.
    pub registry_timeout: Option<u32>,
    /// `TF_STATE_PERSIST_INTERVAL` in seconds.
    pub state_persist_interval: Option<u32>,
    /// `TF_CLI_CONFIG_FILE`
    pub cli_config_file: Option<String>,
    /// `TF_CLOUD_ORGANIZATION`
    pub cloud_organization: Option<String>,
    /// `TF_CLOUD_HOSTNAME`
    pub cloud_hostname: Option<String>,
    /// `TF_CLI_ARGS_<command>`, keyed by subcommand.
    pub cli_args_for: BTreeMap<String, String>,
}

impl Default for TerraformSettings {
    fn default() -> Self {
        Self {
            install_git: true,
            plugin_cache: true,
            data_dir: false,
            version_file: false,
            input: None,
            log_path: None,
            registry_timeout: None,
            state_persist_interval: None,
            cli_config_file: None,
            cloud_organization: None,
            cloud_hostname: None,
            cli_args_for: BTreeMap::new(),
        }
    }
}
