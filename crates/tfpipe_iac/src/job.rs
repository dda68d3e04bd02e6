//! Terraform job options.
//!
//! A [`TerraformJob`] describes everything a Terraform container needs:
//! image, tool versions, mounted sources, credentials and Terraform's own
//! environment variables. Every builder consumes the job and returns the new
//! value, so a base job can be cloned into per-version variants without any
//! of them seeing the others' changes.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tfpipe_runner::{CacheVolume, ContainerConfig, MountConfig, SetupStep};
use tracing::debug;
use uuid::Uuid;

use crate::defaults::{PipelineDefaults, TerraformSettings};
use crate::error::{IacError, IacResult};
use crate::parse::{self, is_valid_version};
use crate::tools::{self, ToolVersion};

const NETRC_LOGIN_VAR: &str = "TFPIPE_NETRC_LOGIN";
const NETRC_PASSWORD_VAR: &str = "TFPIPE_NETRC_PASSWORD";
const CACHE_BUSTER_VAR: &str = "TFPIPE_CACHE_BUSTER";
const SECONDS_PER_DAY: i64 = 86_400;

/// Where the container image and the Terraform binary come from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ImageSource {
    /// Alpine base image with Terraform downloaded during setup.
    #[default]
    Alpine,
    /// `hashicorp/terraform` tagged with the job's Terraform version.
    Official,
    /// Caller-supplied image; Terraform is still installed during setup.
    Custom { image: String, tag: String },
}

/// A credential value that never shows up in debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Git hosting services that credentials and known hosts can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitHost {
    GitHub,
    GitLab,
}

impl GitHost {
    pub fn domain(&self) -> &'static str {
        match self {
            Self::GitHub => "github.com",
            Self::GitLab => "gitlab.com",
        }
    }
}

#[derive(Debug, Clone)]
struct Netrc {
    host: GitHost,
    login: String,
    password: Secret,
}

#[derive(Debug, Clone)]
struct SshAgent {
    socket: PathBuf,
    known_hosts: Vec<GitHost>,
}

/// Options of a Terraform container.
#[derive(Debug, Clone)]
pub struct TerraformJob {
    defaults: PipelineDefaults,
    image: ImageSource,
    terraform_version: String,
    source_dir: Option<PathBuf>,
    module_path: Option<String>,
    env: BTreeMap<String, String>,
    secrets: BTreeMap<String, Secret>,
    tf_variables: BTreeMap<String, String>,
    web_identity_token: Option<String>,
    netrc: Option<Netrc>,
    ssh: Option<SshAgent>,
    parallelism: Option<u32>,
    cli_args: Option<String>,
    install_git: bool,
    plugin_cache: bool,
    data_dir: bool,
    version_file: bool,
    tflint: Option<ToolVersion>,
    terraform_docs: Option<String>,
}

impl TerraformJob {
    pub fn new(defaults: PipelineDefaults) -> Self {
        Self {
            terraform_version: defaults.terraform_version.clone(),
            defaults,
            image: ImageSource::default(),
            source_dir: None,
            module_path: None,
            env: BTreeMap::new(),
            secrets: BTreeMap::new(),
            tf_variables: BTreeMap::new(),
            web_identity_token: None,
            netrc: None,
            ssh: None,
            parallelism: None,
            cli_args: None,
            install_git: true,
            plugin_cache: true,
            data_dir: false,
            version_file: false,
            tflint: None,
            terraform_docs: None,
        }
    }

    pub fn defaults(&self) -> &PipelineDefaults {
        &self.defaults
    }

    pub fn image(&self) -> &ImageSource {
        &self.image
    }

    pub fn terraform_version(&self) -> &str {
        &self.terraform_version
    }

    pub fn source_dir(&self) -> Option<&Path> {
        self.source_dir.as_deref()
    }

    pub fn module_path(&self) -> Option<&str> {
        self.module_path.as_deref()
    }

    pub fn has_tflint(&self) -> bool {
        self.tflint.is_some()
    }

    pub fn has_terraform_docs(&self) -> bool {
        self.terraform_docs.is_some()
    }

    /// Working directory inside the container.
    pub fn workdir(&self) -> String {
        match &self.module_path {
            Some(path) => format!(
                "{}/{}/{}",
                self.defaults.mount_path.trim_end_matches('/'),
                self.defaults.modules_root.trim_matches('/'),
                path.trim_matches('/')
            ),
            None => self.defaults.mount_path.clone(),
        }
    }

    /// Host directory matching [`workdir`](Self::workdir).
    pub fn host_workdir(&self) -> Option<PathBuf> {
        let source = self.source_dir.as_ref()?;
        Some(match &self.module_path {
            Some(path) => source
                .join(&self.defaults.modules_root)
                .join(path.trim_matches('/')),
            None => source.clone(),
        })
    }

    pub fn with_image(mut self, image: ImageSource) -> Self {
        self.image = image;
        self
    }

    /// A copy of this job bound to another Terraform version.
    pub fn with_terraform_version(&self, version: &str) -> IacResult<Self> {
        let version = version.trim().trim_start_matches('v');
        if !is_valid_version(version) {
            return Err(IacError::InvalidVersion(version.to_string()));
        }
        let mut job = self.clone();
        job.terraform_version = version.to_string();
        Ok(job)
    }

    pub fn with_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_dir = Some(dir.into());
        self
    }

    /// Run inside `<modules_root>/<path>` instead of the source root.
    pub fn with_module(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.module_path = if path.trim().is_empty() { None } else { Some(path) };
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add strict `KEY=VALUE` entries.
    pub fn with_env_vars<S: AsRef<str>>(mut self, entries: &[S]) -> IacResult<Self> {
        self.env.extend(parse::parse_env_vars(entries)?);
        Ok(self)
    }

    pub fn with_secret(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(key.into(), Secret::new(value));
        self
    }

    pub fn with_tf_variables<S: AsRef<str>>(mut self, entries: &[S]) -> IacResult<Self> {
        self.tf_variables.extend(parse::parse_tf_variables(entries)?);
        Ok(self)
    }

    /// Load every `*.env` file of `dir`; files named `*secret*` become secrets.
    pub fn with_dotenv_dir(mut self, dir: &Path) -> IacResult<Self> {
        let dotenv = parse::load_dotenv_dir(dir)?;
        debug!(
            "Loaded {} variable(s) and {} secret(s) from {}",
            dotenv.env.len(),
            dotenv.secrets.len(),
            dir.display()
        );
        self.env.extend(dotenv.env);
        self.secrets
            .extend(dotenv.secrets.into_iter().map(|(k, v)| (k, Secret::new(v))));
        Ok(self)
    }

    fn region_or_default(&self, region: Option<&str>) -> String {
        match region.map(str::trim) {
            Some(r) if !r.is_empty() => r.to_string(),
            _ => self.defaults.aws_region.clone(),
        }
    }

    pub fn with_aws_keys(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
        region: Option<&str>,
    ) -> Self {
        let region = self.region_or_default(region);
        self.env.insert("AWS_REGION".into(), region);
        self.secrets
            .insert("AWS_ACCESS_KEY_ID".into(), Secret::new(access_key_id));
        self.secrets
            .insert("AWS_SECRET_ACCESS_KEY".into(), Secret::new(secret_access_key));
        if let Some(token) = session_token.filter(|t| !t.is_empty()) {
            self.secrets.insert("AWS_SESSION_TOKEN".into(), Secret::new(token));
        }
        self
    }

    /// Authenticate with a web identity token; replaces static AWS keys.
    pub fn with_aws_oidc(
        mut self,
        role_arn: impl Into<String>,
        token: impl Into<String>,
        region: Option<&str>,
        session_name: Option<&str>,
    ) -> Self {
        let region = self.region_or_default(region);
        let session_name = match session_name.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("tfpipe-{}", Uuid::new_v4()),
        };
        let token_name = self.defaults.aws_oidc_token_name.clone();

        for key in ["AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY", "AWS_SESSION_TOKEN"] {
            self.secrets.remove(key);
            self.env.remove(key);
        }

        self.env.insert("AWS_REGION".into(), region);
        self.env.insert("AWS_ROLE_ARN".into(), role_arn.into());
        self.env.insert("AWS_ROLE_SESSION_NAME".into(), session_name);
        self.env.insert(
            "AWS_WEB_IDENTITY_TOKEN_FILE".into(),
            format!("/run/secrets/{}", token_name),
        );
        self.secrets.insert(token_name.clone(), Secret::new(token));
        self.web_identity_token = Some(token_name);
        self
    }

    pub fn with_github_token(self, token: impl Into<String>) -> Self {
        self.with_secret("GITHUB_TOKEN", token)
    }

    pub fn with_gitlab_token(self, token: impl Into<String>) -> Self {
        self.with_secret("GITLAB_TOKEN", token)
    }

    /// Token for Terraform Cloud / Enterprise.
    pub fn with_terraform_token(self, token: impl Into<String>) -> Self {
        self.with_secret("TF_TOKEN", token)
    }

    /// Token for the GitLab-hosted Terraform registry.
    pub fn with_registry_gitlab_token(self, token: impl Into<String>) -> Self {
        self.with_secret("TF_TOKEN_gitlab_com", token)
    }

    /// Write a `.netrc` entry for `host` so git over HTTPS can authenticate.
    pub fn with_netrc(mut self, host: GitHost, login: impl Into<String>, password: impl Into<String>) -> Self {
        self.netrc = Some(Netrc {
            host,
            login: login.into(),
            password: Secret::new(password),
        });
        self
    }

    /// Forward the host SSH agent socket and trust the given hosts.
    pub fn with_ssh_agent(mut self, socket: impl Into<PathBuf>, known_hosts: &[GitHost]) -> Self {
        self.ssh = Some(SshAgent {
            socket: socket.into(),
            known_hosts: known_hosts.to_vec(),
        });
        self
    }

    /// Set `TF_LOG`; the level is validated and lowercased.
    pub fn with_log_level(self, level: &str) -> IacResult<Self> {
        let level = parse::validate_log_level(level)?;
        Ok(self.with_env("TF_LOG", level))
    }

    pub fn with_log_path(self, path: &str) -> Self {
        self.with_non_empty_env("TF_LOG_PATH", path)
    }

    pub fn with_workspace(self, workspace: &str) -> Self {
        self.with_non_empty_env("TF_WORKSPACE", workspace)
    }

    pub fn with_input(self, allow_input: bool) -> Self {
        self.with_env("TF_INPUT", if allow_input { "1" } else { "0" })
    }

    pub fn with_parallelism(mut self, parallelism: u32) -> Self {
        self.parallelism = Some(if parallelism == 0 {
            self.defaults.parallelism
        } else {
            parallelism
        });
        self
    }

    /// Extra arguments appended to every Terraform command (`TF_CLI_ARGS`).
    pub fn with_cli_args(mut self, args: &str) -> Self {
        let args = args.trim();
        self.cli_args = if args.is_empty() { None } else { Some(args.to_string()) };
        self
    }

    /// Extra arguments for one Terraform subcommand (`TF_CLI_ARGS_<command>`).
    pub fn with_cli_args_for(self, command: &str, args: &str) -> Self {
        let command = command.trim();
        if command.is_empty() {
            return self;
        }
        self.with_non_empty_env(&format!("TF_CLI_ARGS_{}", command), args.trim())
    }

    pub fn with_registry_timeout(self, seconds: u32) -> Self {
        let seconds = if seconds == 0 { 10 } else { seconds };
        self.with_env("TF_REGISTRY_CLIENT_TIMEOUT", seconds.to_string())
    }

    pub fn with_state_persist_interval(self, seconds: u32) -> Self {
        self.with_env("TF_STATE_PERSIST_INTERVAL", seconds.max(20).to_string())
    }

    pub fn with_cli_config_file(self, path: &str) -> Self {
        self.with_non_empty_env("TF_CLI_CONFIG_FILE", path)
    }

    pub fn with_cloud_organization(self, organization: &str) -> Self {
        self.with_non_empty_env("TF_CLOUD_ORGANIZATION", organization)
    }

    pub fn with_cloud_hostname(self, hostname: &str) -> Self {
        self.with_non_empty_env("TF_CLOUD_HOSTNAME", hostname)
    }

    pub fn with_git(mut self, install: bool) -> Self {
        self.install_git = install;
        self
    }

    pub fn with_plugin_cache(mut self, enabled: bool) -> Self {
        self.plugin_cache = enabled;
        self
    }

    /// Point `TF_DATA_DIR` at the shared data directory.
    pub fn with_data_dir(mut self) -> Self {
        self.data_dir = true;
        self
    }

    /// Apply configured Terraform CLI behaviour.
    pub fn with_settings(self, settings: &TerraformSettings) -> Self {
        let mut job = self
            .with_git(settings.install_git)
            .with_plugin_cache(settings.plugin_cache);
        if settings.data_dir {
            job = job.with_data_dir();
        }
        if settings.version_file {
            job = job.with_version_file();
        }
        if let Some(input) = settings.input {
            job = job.with_input(input);
        }
        if let Some(path) = &settings.log_path {
            job = job.with_log_path(path);
        }
        if let Some(seconds) = settings.registry_timeout {
            job = job.with_registry_timeout(seconds);
        }
        if let Some(seconds) = settings.state_persist_interval {
            job = job.with_state_persist_interval(seconds);
        }
        if let Some(path) = &settings.cli_config_file {
            job = job.with_cli_config_file(path);
        }
        if let Some(organization) = &settings.cloud_organization {
            job = job.with_cloud_organization(organization);
        }
        if let Some(hostname) = &settings.cloud_hostname {
            job = job.with_cloud_hostname(hostname);
        }
        for (command, args) in &settings.cli_args_for {
            job = job.with_cli_args_for(command, args);
        }
        job
    }

    /// Change an environment variable once a day so cached layers expire.
    pub fn with_cache_buster(self) -> Self {
        let day = Utc::now().timestamp() / SECONDS_PER_DAY * SECONDS_PER_DAY;
        self.with_env(CACHE_BUSTER_VAR, day.to_string())
    }

    /// Write `.terraform-version` into the working directory before running.
    pub fn with_version_file(mut self) -> Self {
        self.version_file = true;
        self
    }

    pub fn with_tflint(mut self, version: ToolVersion) -> Self {
        self.tflint = Some(version);
        self
    }

    pub fn with_terraform_docs(mut self, version: Option<&str>) -> Self {
        let version = version
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(&self.defaults.terraform_docs_version)
            .to_string();
        self.terraform_docs = Some(version);
        self
    }

    fn with_non_empty_env(self, key: &str, value: &str) -> Self {
        if value.trim().is_empty() {
            self
        } else {
            self.with_env(key, value.trim())
        }
    }

    fn cli_args_value(&self) -> Option<String> {
        let parallelism = self.parallelism.map(|p| format!("-parallelism={}", p));
        let parts: Vec<String> = parallelism.into_iter().chain(self.cli_args.clone()).collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }

    fn image_reference(&self) -> (String, String, bool) {
        let d = &self.defaults;
        match &self.image {
            ImageSource::Alpine => (d.base_image.clone(), d.base_image_tag.clone(), true),
            ImageSource::Official => (d.terraform_image.clone(), self.terraform_version.clone(), false),
            ImageSource::Custom { image, tag } => (image.clone(), tag.clone(), true),
        }
    }

    /// Container configuration running this job.
    ///
    /// Setup steps run in a fixed order: git, Terraform, caches, credentials
    /// files, then the optional linters.
    pub fn container_config(&self) -> ContainerConfig {
        let d = &self.defaults;
        let (image, tag, install_terraform) = self.image_reference();

        let mut config = ContainerConfig::new(image)
            .tag(tag)
            .name_prefix("tfpipe")
            .workdir(self.workdir());

        if let Some(dir) = &self.source_dir {
            config = config.mount(MountConfig::new(dir.clone(), d.mount_path.clone()));
        }

        if self.install_git {
            config = config.setup_step(tools::install_git());
        }
        if install_terraform {
            config = config.setup_step(tools::install_terraform(&self.terraform_version));
        }

        if self.plugin_cache {
            config = config
                .cache(CacheVolume::new(&d.plugin_cache_volume, &d.plugin_cache_path))
                .env("TF_PLUGIN_CACHE_DIR", &d.plugin_cache_path)
                .setup_step(SetupStep::shell(
                    "plugin-cache",
                    format!("mkdir -p {p} && chmod 755 {p}", p = d.plugin_cache_path),
                ));
        }

        if self.data_dir {
            config = config
                .env("TF_DATA_DIR", &d.data_dir)
                .setup_step(SetupStep::shell("data-dir", format!("mkdir -p {}", d.data_dir)));
        }

        if let Some(netrc) = &self.netrc {
            config = config
                .env(NETRC_LOGIN_VAR, &netrc.login)
                .secret_env(NETRC_PASSWORD_VAR, netrc.password.expose())
                .setup_step(SetupStep::shell(
                    "netrc",
                    format!(
                        "printf 'machine %s\\nlogin %s\\npassword %s\\n' {host} \"${login}\" \"${password}\" > {path} && chmod 600 {path}",
                        host = netrc.host.domain(),
                        login = NETRC_LOGIN_VAR,
                        password = NETRC_PASSWORD_VAR,
                        path = d.netrc_path
                    ),
                ));
        }

        if let Some(ssh) = &self.ssh {
            let mut script = "mkdir -p /root/.ssh && chmod 700 /root/.ssh".to_string();
            for host in &ssh.known_hosts {
                script.push_str(&format!(
                    " && ssh-keyscan {} >> /root/.ssh/known_hosts",
                    host.domain()
                ));
            }
            if !ssh.known_hosts.is_empty() {
                script.push_str(" && chmod 600 /root/.ssh/known_hosts");
            }
            config = config
                .mount(MountConfig::new(ssh.socket.clone(), d.ssh_socket_path.clone()))
                .env("SSH_AUTH_SOCK", &d.ssh_socket_path)
                .setup_step(SetupStep::shell("ssh", script));
        }

        if let Some(name) = &self.web_identity_token {
            config = config.setup_step(SetupStep::shell(
                "aws-web-identity-token",
                format!(
                    "mkdir -p /run/secrets && printf '%s' \"${name}\" > /run/secrets/{name}",
                    name = name
                ),
            ));
        }

        if self.version_file {
            config = config.setup_step(SetupStep::shell(
                "terraform-version-file",
                format!("printf '%s\\n' {} > .terraform-version", self.terraform_version),
            ));
        }

        if let Some(version) = &self.tflint {
            config = config.setup_step(tools::install_tflint(version));
        }
        if let Some(version) = &self.terraform_docs {
            config = config.setup_step(tools::install_terraform_docs(version));
        }

        for (key, value) in &self.env {
            config = config.env(key, value);
        }
        for (name, value) in &self.tf_variables {
            if !value.is_empty() {
                config = config.env(format!("TF_VAR_{}", name), value);
            }
        }
        if let Some(args) = self.cli_args_value() {
            config = config.env("TF_CLI_ARGS", args);
        }
        for (key, value) in &self.secrets {
            config = config.secret_env(key, value.expose());
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> TerraformJob {
        TerraformJob::new(PipelineDefaults::default())
    }

    fn step_names(config: &ContainerConfig) -> Vec<&str> {
        config.setup.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_default_job_installs_terraform_on_alpine() {
        let config = job().container_config();
        assert_eq!(config.full_image(), "alpine:latest");
        assert_eq!(config.workdir.as_deref(), Some("/mnt"));
        assert_eq!(step_names(&config), vec!["install-git", "install-terraform", "plugin-cache"]);
        assert_eq!(
            config.env.get("TF_PLUGIN_CACHE_DIR").map(String::as_str),
            Some("/root/.terraform.d/plugin-cache")
        );
        assert_eq!(config.caches[0].name, "terraform-plugin-cache");
    }

    #[test]
    fn test_official_image_skips_install() {
        let config = job()
            .with_image(ImageSource::Official)
            .with_terraform_version("1.11.4")
            .unwrap()
            .container_config();
        assert_eq!(config.full_image(), "hashicorp/terraform:1.11.4");
        assert!(!step_names(&config).contains(&"install-terraform"));
    }

    #[test]
    fn test_versioned_copies_are_independent() {
        let base = job().with_env("TF_IN_AUTOMATION", "1");
        let a = base.with_terraform_version("1.11.1").unwrap();
        let b = base.with_terraform_version("v1.12.0").unwrap().with_env("ONLY_B", "1");

        assert_eq!(base.terraform_version(), "1.12.0");
        assert_eq!(a.terraform_version(), "1.11.1");
        assert_eq!(b.terraform_version(), "1.12.0");
        assert!(!a.container_config().env.contains_key("ONLY_B"));
        assert!(base.with_terraform_version("latest; rm -rf /").is_err());
    }

    #[test]
    fn test_module_workdir() {
        let job = job().with_source_dir("/repo").with_module("network/vpc");
        assert_eq!(job.workdir(), "/mnt/modules/network/vpc");
        assert_eq!(job.host_workdir(), Some(PathBuf::from("/repo/modules/network/vpc")));

        let config = job.container_config();
        assert_eq!(config.mounts[0].source, PathBuf::from("/repo"));
        assert_eq!(config.mounts[0].target, "/mnt");
    }

    #[test]
    fn test_aws_keys_are_secret() {
        let config = job()
            .with_aws_keys("AKIA", "shh", Some("session".into()), None)
            .container_config();

        assert_eq!(config.env.get("AWS_REGION").map(String::as_str), Some("eu-west-1"));
        assert!(!config.env.contains_key("AWS_SECRET_ACCESS_KEY"));
        assert_eq!(config.secret_env.get("AWS_SECRET_ACCESS_KEY").map(String::as_str), Some("shh"));
        assert!(config.secret_env.contains_key("AWS_SESSION_TOKEN"));
    }

    #[test]
    fn test_oidc_replaces_keys() {
        let config = job()
            .with_aws_keys("AKIA", "shh", None, Some("us-east-1"))
            .with_aws_oidc("arn:aws:iam::123:role/ci", "jwt", None, None)
            .container_config();

        assert!(!config.secret_env.contains_key("AWS_ACCESS_KEY_ID"));
        assert_eq!(config.secret_env.get("AWS_OIDC_TOKEN").map(String::as_str), Some("jwt"));
        assert_eq!(
            config.env.get("AWS_WEB_IDENTITY_TOKEN_FILE").map(String::as_str),
            Some("/run/secrets/AWS_OIDC_TOKEN")
        );
        assert!(config.env["AWS_ROLE_SESSION_NAME"].starts_with("tfpipe-"));

        let token_step = config
            .setup
            .iter()
            .find(|s| s.name == "aws-web-identity-token")
            .unwrap();
        assert!(!tools::step_script(token_step).contains("jwt"));
    }

    #[test]
    fn test_terraform_env_vars() {
        let config = job()
            .with_log_level("DEBUG")
            .unwrap()
            .with_log_path("")
            .with_workspace("staging")
            .with_input(false)
            .with_parallelism(4)
            .with_cli_args("-no-color")
            .with_cli_args_for("plan", "-lock=false")
            .with_tf_variables(&["region=eu-west-1", "empty="])
            .unwrap()
            .with_state_persist_interval(5)
            .container_config();

        assert_eq!(config.env["TF_LOG"], "debug");
        assert!(!config.env.contains_key("TF_LOG_PATH"));
        assert_eq!(config.env["TF_WORKSPACE"], "staging");
        assert_eq!(config.env["TF_INPUT"], "0");
        assert_eq!(config.env["TF_CLI_ARGS"], "-parallelism=4 -no-color");
        assert_eq!(config.env["TF_CLI_ARGS_plan"], "-lock=false");
        assert_eq!(config.env["TF_VAR_region"], "eu-west-1");
        assert!(!config.env.contains_key("TF_VAR_empty"));
        assert_eq!(config.env["TF_STATE_PERSIST_INTERVAL"], "20");
        assert!(job().with_log_level("loud").is_err());
    }

    #[test]
    fn test_settings_env_and_steps() {
        let settings = TerraformSettings {
            install_git: false,
            data_dir: true,
            input: Some(true),
            log_path: Some("/tmp/tf.log".into()),
            registry_timeout: Some(0),
            state_persist_interval: Some(60),
            cli_config_file: Some("/mnt/.terraformrc".into()),
            cloud_organization: Some("acme".into()),
            cloud_hostname: Some("app.terraform.io".into()),
            cli_args_for: [("init".to_string(), "-upgrade".to_string())].into(),
            ..TerraformSettings::default()
        };
        let config = job()
            .with_terraform_token("tf-cloud-token")
            .with_settings(&settings)
            .container_config();

        assert_eq!(step_names(&config), vec!["install-terraform", "plugin-cache", "data-dir"]);
        assert_eq!(config.env["TF_DATA_DIR"], "/root/.terraform.d");
        assert_eq!(config.env["TF_INPUT"], "1");
        assert_eq!(config.env["TF_LOG_PATH"], "/tmp/tf.log");
        assert_eq!(config.env["TF_REGISTRY_CLIENT_TIMEOUT"], "10");
        assert_eq!(config.env["TF_STATE_PERSIST_INTERVAL"], "60");
        assert_eq!(config.env["TF_CLI_CONFIG_FILE"], "/mnt/.terraformrc");
        assert_eq!(config.env["TF_CLOUD_ORGANIZATION"], "acme");
        assert_eq!(config.env["TF_CLOUD_HOSTNAME"], "app.terraform.io");
        assert_eq!(config.env["TF_CLI_ARGS_init"], "-upgrade");
        assert_eq!(config.secret_env["TF_TOKEN"], "tf-cloud-token");
        assert!(!config.env.values().any(|v| v == "tf-cloud-token"));
    }

    #[test]
    fn test_default_settings_change_nothing() {
        let plain = job().container_config();
        let configured = job().with_settings(&TerraformSettings::default()).container_config();
        assert_eq!(step_names(&plain), step_names(&configured));
        assert_eq!(plain.env, configured.env);
    }

    #[test]
    fn test_netrc_and_ssh_setup() {
        let config = job()
            .with_netrc(GitHost::GitHub, "ci-bot", "ghp_secret")
            .with_ssh_agent("/tmp/agent.sock", &[GitHost::GitHub])
            .container_config();

        let netrc = config.setup.iter().find(|s| s.name == "netrc").unwrap();
        assert!(tools::step_script(netrc).contains("github.com"));
        assert!(!tools::step_script(netrc).contains("ghp_secret"));
        assert_eq!(config.secret_env[NETRC_PASSWORD_VAR], "ghp_secret");

        let ssh = config.setup.iter().find(|s| s.name == "ssh").unwrap();
        assert!(tools::step_script(ssh).contains("ssh-keyscan github.com"));
        assert_eq!(config.env["SSH_AUTH_SOCK"], "/var/run/host.sock");
        assert!(config.mounts.iter().any(|m| m.target == "/var/run/host.sock"));
    }

    #[test]
    fn test_tools_and_version_file_order() {
        let config = job()
            .with_git(false)
            .with_plugin_cache(false)
            .with_version_file()
            .with_tflint(ToolVersion::Latest)
            .with_terraform_docs(None)
            .container_config();

        assert_eq!(
            step_names(&config),
            vec![
                "install-terraform",
                "terraform-version-file",
                "install-tflint",
                "install-terraform-docs"
            ]
        );
    }

    #[test]
    fn test_cache_buster_is_day_aligned() {
        let config = job().with_cache_buster().container_config();
        let value: i64 = config.env[CACHE_BUSTER_VAR].parse().unwrap();
        assert_eq!(value % SECONDS_PER_DAY, 0);
    }

    #[test]
    fn test_debug_hides_secrets() {
        let job = job().with_github_token("ghp_very_secret");
        assert!(!format!("{:?}", job).contains("ghp_very_secret"));
    }
}
