//! Setup steps installing Terraform tooling inside Alpine-based containers.

use tfpipe_runner::SetupStep;

/// Which release of a tool to install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolVersion {
    Latest,
    Pinned(String),
}

impl ToolVersion {
    /// `None` or a blank string means latest.
    pub fn from_option(version: Option<&str>) -> Self {
        match version.map(str::trim) {
            Some(v) if !v.is_empty() => Self::Pinned(v.trim_start_matches('v').to_string()),
            _ => Self::Latest,
        }
    }
}

pub fn install_git() -> SetupStep {
    SetupStep::shell("install-git", "apk add --no-cache git openssh")
}

pub fn install_terraform(version: &str) -> SetupStep {
    let url = format!(
        "https://releases.hashicorp.com/terraform/{v}/terraform_{v}_linux_amd64.zip",
        v = version
    );
    SetupStep::shell(
        "install-terraform",
        format!(
            "apk add --no-cache curl unzip && \
             curl -fsSL {} -o /tmp/terraform.zip && \
             unzip -o /tmp/terraform.zip -d /tmp && \
             mv /tmp/terraform /usr/local/bin/terraform && \
             chmod +x /usr/local/bin/terraform && \
             rm /tmp/terraform.zip",
            url
        ),
    )
}

pub fn install_tflint(version: &ToolVersion) -> SetupStep {
    let script = match version {
        ToolVersion::Latest => "apk add --no-cache curl bash && \
             curl -fsSL https://raw.githubusercontent.com/terraform-linters/tflint/master/install_linux.sh | bash"
            .to_string(),
        ToolVersion::Pinned(v) => format!(
            "apk add --no-cache curl unzip && \
             curl -fsSL https://github.com/terraform-linters/tflint/releases/download/v{}/tflint_linux_amd64.zip -o /tmp/tflint.zip && \
             unzip -o /tmp/tflint.zip -d /tmp && \
             mv /tmp/tflint /usr/local/bin/tflint && \
             chmod +x /usr/local/bin/tflint && \
             rm /tmp/tflint.zip",
            v
        ),
    };
    SetupStep::shell("install-tflint", script)
}

pub fn install_terraform_docs(version: &str) -> SetupStep {
    let version = version.trim_start_matches('v');
    SetupStep::shell(
        "install-terraform-docs",
        format!(
            "apk add --no-cache curl tar && \
             curl -fsSLo /tmp/terraform-docs.tar.gz \
             https://github.com/terraform-docs/terraform-docs/releases/download/v{v}/terraform-docs-v{v}-$(uname)-amd64.tar.gz && \
             tar -xzf /tmp/terraform-docs.tar.gz -C /tmp && \
             chmod +x /tmp/terraform-docs && \
             mv /tmp/terraform-docs /usr/local/bin/terraform-docs && \
             rm /tmp/terraform-docs.tar.gz",
            v = version
        ),
    )
}

/// Shell text of a setup step built by this module.
pub fn step_script(step: &SetupStep) -> &str {
    step.command.args().get(1).map(String::as_str).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terraform_install_url() {
        let step = install_terraform("1.11.4");
        assert_eq!(step.name, "install-terraform");
        assert!(step_script(&step)
            .contains("https://releases.hashicorp.com/terraform/1.11.4/terraform_1.11.4_linux_amd64.zip"));
    }

    #[test]
    fn test_tflint_latest_uses_install_script() {
        let step = install_tflint(&ToolVersion::from_option(None));
        assert!(step_script(&step).contains("install_linux.sh"));

        let step = install_tflint(&ToolVersion::from_option(Some("v0.58.0")));
        assert!(step_script(&step).contains("releases/download/v0.58.0/tflint_linux_amd64.zip"));
    }

    #[test]
    fn test_terraform_docs_url() {
        let step = install_terraform_docs("0.20.0");
        assert!(step_script(&step).contains("terraform-docs-v0.20.0-$(uname)-amd64.tar.gz"));
    }
}
