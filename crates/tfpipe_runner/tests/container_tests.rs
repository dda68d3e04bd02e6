//! Integration tests for the container execution layer.
//!
//! These run against the mock runner so no Docker or Podman installation is
//! needed.

use std::sync::Arc;
use std::time::Duration;

use tfpipe_core::{
    build_matrix, cancel_channel, CancelToken, CheckDefinition, CommandLine, CoreError,
    Dispatcher, EnvironmentError, ExecutionEnvironment, TaskError,
};
use tfpipe_runner::{
    CliRunner, CliRunnerOptions, ContainerConfig, ContainerEnvironment, ContainerRunner, ContainerRuntime,
    MockResponse, MockRule, MockRunner, RunConfig, SetupStep,
};

fn terraform_env(runner: &MockRunner, version: &str) -> Arc<dyn ExecutionEnvironment> {
    Arc::new(ContainerEnvironment::new(
        Arc::new(runner.clone()),
        ContainerConfig::new("hashicorp/terraform")
            .tag(version)
            .workdir("/mnt"),
        RunConfig::default(),
    ))
}

/// Test basic mock runner functionality.
#[tokio::test]
async fn test_mock_runner_basic_execution() {
    let runner = MockRunner::new().add_response(MockResponse::success("Terraform v1.12.0"));

    let config = ContainerConfig::new("hashicorp/terraform")
        .tag("1.12.0")
        .workdir("/mnt")
        .command(vec!["version".to_string()]);

    let result = runner
        .run_container(&config, &RunConfig::default(), &CancelToken::never())
        .await
        .unwrap();

    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, "Terraform v1.12.0");
    assert!(result.success());
}

/// The environment hands the runner one script with setup steps first.
#[tokio::test]
async fn test_environment_renders_single_script() {
    let runner = MockRunner::new();
    let env = ContainerEnvironment::new(
        Arc::new(runner.clone()),
        ContainerConfig::new("alpine")
            .tag("3.20")
            .env("TF_IN_AUTOMATION", "1")
            .setup_step(SetupStep::shell("install-tflint", "apk add --no-cache tflint")),
        RunConfig::default(),
    );

    env.run(
        &CancelToken::never(),
        &[
            CommandLine::new("tflint", ["--init"]),
            CommandLine::new("tflint", ["--recursive"]),
        ],
    )
    .await
    .unwrap();

    let calls = runner.get_method_calls("run_container");
    assert_eq!(calls.len(), 1);

    let script = calls[0].script().unwrap();
    let install = script.find("apk add").unwrap();
    let init = script.find("tflint --init").unwrap();
    let recursive = script.find("tflint --recursive").unwrap();
    assert!(install < init && init < recursive);
    assert!(script.starts_with("set -e\n"));

    let env_vars = calls[0].env.as_ref().unwrap();
    assert_eq!(env_vars.get("TF_IN_AUTOMATION"), Some(&"1".to_string()));
}

/// Two versions, one failing at init: the aggregate names the failing label
/// and carries the failing command.
#[tokio::test]
async fn test_matrix_over_containers() {
    let runner = MockRunner::new()
        .add_rule(MockRule::output("terraform version", "Terraform v\n"))
        .add_rule(
            MockRule::fail("terraform init", 1, "Error: Unsupported Terraform Core version\n")
                .when(":1.12.1"),
        )
        .add_rule(MockRule::output("terraform init", "Terraform has been successfully initialized!\n"));

    let checks = vec![CheckDefinition::new(
        "init",
        vec![
            CommandLine::terraform(["version"]),
            CommandLine::terraform(["init", "-backend=false"]),
        ],
    )];
    let versions = vec!["1.12.0".to_string(), "1.12.1".to_string()];
    let factory = |version: &str| -> Result<Arc<dyn ExecutionEnvironment>, EnvironmentError> {
        Ok(terraform_env(&runner, version))
    };

    let descriptors = build_matrix(&versions, &checks, &factory).unwrap();
    let err = Dispatcher::new()
        .run_matrix(descriptors, &CancelToken::never())
        .await
        .unwrap_err();

    match err {
        CoreError::AggregationFailed { label, cause } => {
            assert_eq!(label, "1.12.1.init");
            match *cause {
                TaskError::CommandFailed {
                    command: Some(command),
                    ..
                } => assert_eq!(command, CommandLine::terraform(["init", "-backend=false"])),
                other => panic!("unexpected cause: {:?}", other),
            }
        }
        other => panic!("unexpected error: {:?}", other),
    }

    assert_eq!(runner.get_method_calls("run_container").len(), 2);
}

/// Successful matrix output is the last command of each task.
#[tokio::test]
async fn test_matrix_success_collects_outputs() {
    let runner = MockRunner::new()
        .add_rule(MockRule::output("terraform version", "noise\n"))
        .add_rule(MockRule::output("terraform validate", "Success! The configuration is valid.\n"));

    let checks = vec![CheckDefinition::new(
        "validate",
        vec![
            CommandLine::terraform(["version"]),
            CommandLine::terraform(["validate"]),
        ],
    )];
    let versions = vec!["1.11.4".to_string(), "1.12.0".to_string()];
    let factory = |version: &str| -> Result<Arc<dyn ExecutionEnvironment>, EnvironmentError> {
        Ok(terraform_env(&runner, version))
    };

    let report = Dispatcher::new()
        .max_concurrency(1)
        .run_matrix(
            build_matrix(&versions, &checks, &factory).unwrap(),
            &CancelToken::never(),
        )
        .await
        .unwrap();

    assert_eq!(report.len(), 2);
    assert!(!report.combined_output().contains("noise"));
    assert_eq!(
        report.combined_output().matches("configuration is valid").count(),
        2
    );
    assert_eq!(runner.peak_concurrency(), 1);
}

/// Cancelling a run in flight stops every container promptly.
#[tokio::test]
async fn test_cancellation_reaches_containers() {
    let runner = MockRunner::new().with_delay(Duration::from_secs(60));
    let checks = vec![CheckDefinition::new("init", vec![CommandLine::terraform(["init"])])];
    let versions: Vec<String> = (0..6).map(|i| format!("1.{}.0", i)).collect();
    let factory = |version: &str| -> Result<Arc<dyn ExecutionEnvironment>, EnvironmentError> {
        Ok(terraform_env(&runner, version))
    };

    let (source, cancel) = cancel_channel();
    source.cancel_after(Duration::from_millis(50));

    let started = std::time::Instant::now();
    let results = Dispatcher::new()
        .run_all(build_matrix(&versions, &checks, &factory).unwrap(), &cancel)
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(results.len(), 6);
    assert!(results
        .iter()
        .all(|r| r.error.as_ref().map(|e| e.is_cancelled()).unwrap_or(false)));
}

/// Test mock runner availability and version reporting.
#[tokio::test]
async fn test_mock_runner_availability() {
    let runner = MockRunner::new().set_available(false).set_version("podman 5.0.0");
    assert!(!runner.is_available().await.unwrap());
    assert_eq!(runner.version().await.unwrap(), "podman 5.0.0");
}

/// Test image pull workflow bookkeeping.
#[tokio::test]
async fn test_mock_runner_image_workflow() {
    let runner = MockRunner::new().add_existing_image("alpine:3.20");

    assert!(runner.image_exists("alpine", "3.20").await.unwrap());
    assert!(!runner.image_exists("hashicorp/terraform", "1.12.0").await.unwrap());

    runner.pull_image("hashicorp/terraform", "1.12.0").await.unwrap();
    assert!(runner.image_exists("hashicorp/terraform", "1.12.0").await.unwrap());
    assert!(runner.was_called("pull_image"));

    runner.clear_calls();
    assert_eq!(runner.call_count(), 0);
}

/// A dry run reports the container command instead of a piece of the script.
#[tokio::test]
async fn test_dry_run_environment_output() {
    let runner = CliRunner::with_runtime(ContainerRuntime::Docker, CliRunnerOptions::new().dry_run());
    let env = ContainerEnvironment::new(
        Arc::new(runner),
        ContainerConfig::new("alpine")
            .setup_step(SetupStep::shell("install-terraform", "apk add --no-cache terraform")),
        RunConfig::default(),
    );

    let output = env
        .run(
            &CancelToken::never(),
            &[
                CommandLine::terraform(["version"]),
                CommandLine::terraform(["init", "-backend=false"]),
            ],
        )
        .await
        .unwrap();

    assert!(output.starts_with("[DRY-RUN] Command: docker run"));
    assert!(output.contains("apk add --no-cache terraform"));
    assert!(output.contains("terraform version"));
}

#[test]
fn test_cli_runner_options_builder() {
    let options = CliRunnerOptions::new().dry_run().prefer(ContainerRuntime::Podman);
    assert!(options.dry_run);
    assert_eq!(options.preferred_runtime, Some(ContainerRuntime::Podman));
}

#[test]
fn test_container_runtime_display() {
    assert_eq!(ContainerRuntime::Docker.to_string(), "docker");
    assert_eq!(ContainerRuntime::Podman.to_string(), "podman");
}
