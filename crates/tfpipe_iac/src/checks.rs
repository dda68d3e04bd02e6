//! Check presets.

use tfpipe_core::{CheckDefinition, CommandLine};

fn init_without_backend() -> CommandLine {
    CommandLine::terraform(["init", "-backend=false"])
}

/// `init`, `validate` and `fmt-check`, each run in its own container.
pub fn static_checks() -> Vec<CheckDefinition> {
    vec![
        CheckDefinition::new("init", vec![init_without_backend()]),
        CheckDefinition::new(
            "validate",
            vec![init_without_backend(), CommandLine::terraform(["validate"])],
        ),
        CheckDefinition::new(
            "fmt-check",
            vec![CommandLine::terraform(["fmt", "-check", "-diff"])],
        ),
    ]
}

/// `init` and `validate`, prefixed by `terraform version` so the output
/// names the binary that ran.
pub fn compatibility_checks() -> Vec<CheckDefinition> {
    let version = CommandLine::terraform(["version"]);
    vec![
        CheckDefinition::new(
            "init",
            vec![version.clone(), init_without_backend()],
        ),
        CheckDefinition::new(
            "validate",
            vec![version, init_without_backend(), CommandLine::terraform(["validate"])],
        ),
    ]
}

pub fn lint_commands() -> Vec<CommandLine> {
    vec![
        CommandLine::new("cat", [".tflint.hcl"]),
        CommandLine::new("tflint", ["--init"]),
        CommandLine::new("tflint", ["--recursive"]),
    ]
}

pub fn docs_commands() -> Vec<CommandLine> {
    vec![
        CommandLine::new("cat", [".terraform-docs.yml"]),
        CommandLine::new(
            "terraform-docs",
            ["markdown", ".", "--output-file", "README.md"],
        ),
    ]
}

/// `terraform init` then `terraform plan`, with `-var-file` when a fixture is named.
pub fn plan_commands(fixtures_path: &str, fixture: Option<&str>) -> Vec<CommandLine> {
    let plan = match fixture.map(str::trim).filter(|f| !f.is_empty()) {
        Some(fixture) => CommandLine::terraform([
            "plan".to_string(),
            format!(
                "-var-file={}/{}",
                fixtures_path.trim_end_matches('/'),
                fixture
            ),
        ]),
        None => CommandLine::terraform(["plan"]),
    };
    vec![init_without_backend(), plan]
}
