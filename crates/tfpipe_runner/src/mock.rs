//! Mock container runner for testing.
//!
//! Scripts rendered by [`Script`](crate::script::Script) are "executed" step
//! by step against a list of [`MockRule`]s, producing the same marker layout a
//! real shell would. Anything else gets the next queued [`MockResponse`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tfpipe_core::CancelToken;

use crate::config::{ContainerConfig, RunConfig};
use crate::error::{RunnerError, RunnerResult};
use crate::runner::{ContainerRunner, ExecutionResult};
use crate::script::{is_rendered_script, rendered_steps, STEP_MARKER};

/// Predefined mock response for a container execution.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl MockResponse {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            duration_ms: 100,
        }
    }

    pub fn failure(exit_code: i64, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
            duration_ms: 100,
        }
    }
}

#[derive(Debug, Clone)]
enum MockAction {
    Output(String),
    Fail { exit_code: i64, stderr: String },
}

/// Behaviour of script steps whose shell text contains a pattern.
#[derive(Debug, Clone)]
pub struct MockRule {
    step_pattern: String,
    conditions: Vec<String>,
    action: MockAction,
}

impl MockRule {
    /// Matching steps print `stdout` and succeed.
    pub fn output(step_pattern: impl Into<String>, stdout: impl Into<String>) -> Self {
        Self {
            step_pattern: step_pattern.into(),
            conditions: Vec::new(),
            action: MockAction::Output(stdout.into()),
        }
    }

    /// Matching steps print `stderr` and exit with `exit_code`.
    pub fn fail(
        step_pattern: impl Into<String>,
        exit_code: i64,
        stderr: impl Into<String>,
    ) -> Self {
        Self {
            step_pattern: step_pattern.into(),
            conditions: Vec::new(),
            action: MockAction::Fail {
                exit_code,
                stderr: stderr.into(),
            },
        }
    }

    /// Only apply when the image reference or the script contains `pattern`.
    pub fn when(mut self, pattern: impl Into<String>) -> Self {
        self.conditions.push(pattern.into());
        self
    }

    fn matches(&self, step: &str, image: &str, script: &str) -> bool {
        step.contains(&self.step_pattern)
            && self
                .conditions
                .iter()
                .all(|c| image.contains(c.as_str()) || script.contains(c.as_str()))
    }
}

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub method: String,
    pub image: Option<String>,
    pub command: Option<Vec<String>>,
    pub env: Option<BTreeMap<String, String>>,
    /// Names of secret variables; values are never captured.
    pub secret_keys: Vec<String>,
    pub workdir: Option<String>,
}

impl CapturedCall {
    fn simple(method: &str, image: Option<String>) -> Self {
        Self {
            method: method.to_string(),
            image,
            command: None,
            env: None,
            secret_keys: Vec::new(),
            workdir: None,
        }
    }

    /// The rendered script when the call ran `/bin/sh -c <script>`.
    pub fn script(&self) -> Option<&str> {
        match self.command.as_deref() {
            Some([flag, script]) if flag == "-c" => Some(script.as_str()),
            _ => None,
        }
    }
}

/// Mock container runner for testing.
#[derive(Clone)]
pub struct MockRunner {
    available: Arc<RwLock<bool>>,
    version: Arc<RwLock<String>>,
    responses: Arc<RwLock<Vec<MockResponse>>>,
    response_index: Arc<AtomicUsize>,
    rules: Arc<RwLock<Vec<MockRule>>>,
    delay: Arc<RwLock<Duration>>,
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
    existing_images: Arc<RwLock<Vec<String>>>,
    simulate_failure: Arc<RwLock<Option<String>>>,
    start_failure: Arc<RwLock<Option<MockResponse>>>,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRunner {
    pub fn new() -> Self {
        Self {
            available: Arc::new(RwLock::new(true)),
            version: Arc::new(RwLock::new("mock-runner 1.0.0".to_string())),
            responses: Arc::new(RwLock::new(Vec::new())),
            response_index: Arc::new(AtomicUsize::new(0)),
            rules: Arc::new(RwLock::new(Vec::new())),
            delay: Arc::new(RwLock::new(Duration::ZERO)),
            captured_calls: Arc::new(RwLock::new(Vec::new())),
            existing_images: Arc::new(RwLock::new(Vec::new())),
            simulate_failure: Arc::new(RwLock::new(None)),
            start_failure: Arc::new(RwLock::new(None)),
            running: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_available(self, available: bool) -> Self {
        *self.available.write() = available;
        self
    }

    pub fn set_version(self, version: impl Into<String>) -> Self {
        *self.version.write() = version.into();
        self
    }

    /// Queue a response for a run that is not a step script.
    pub fn add_response(self, response: MockResponse) -> Self {
        self.responses.write().push(response);
        self
    }

    /// Add a rule for script steps. The first matching rule wins.
    pub fn add_rule(self, rule: MockRule) -> Self {
        self.rules.write().push(rule);
        self
    }

    /// Make every run take `delay`, during which it can be cancelled.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.write() = delay;
        self
    }

    pub fn add_existing_image(self, image: impl Into<String>) -> Self {
        self.existing_images.write().push(image.into());
        self
    }

    /// Fail every runtime call with [`RunnerError::ExecutionFailed`].
    pub fn simulate_failure(self, message: impl Into<String>) -> Self {
        *self.simulate_failure.write() = Some(message.into());
        self
    }

    /// Make every run exit with `response` before any script step runs, the
    /// way a runtime rejects a container it cannot create.
    pub fn fail_to_start(self, response: MockResponse) -> Self {
        *self.start_failure.write() = Some(response);
        self
    }

    pub fn clear_calls(&self) {
        self.captured_calls.write().clear();
    }

    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    pub fn call_count(&self) -> usize {
        self.captured_calls.read().len()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.captured_calls.read().iter().any(|c| c.method == method)
    }

    pub fn get_method_calls(&self, method: &str) -> Vec<CapturedCall> {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    /// Highest number of `run_container` calls in flight at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn record_call(&self, call: CapturedCall) {
        self.captured_calls.write().push(call);
    }

    fn next_response(&self) -> MockResponse {
        let responses = self.responses.read();
        if responses.is_empty() {
            return MockResponse::success("");
        }
        let index = self.response_index.fetch_add(1, Ordering::SeqCst);
        responses
            .get(index % responses.len())
            .cloned()
            .unwrap_or_else(|| MockResponse::success(""))
    }

    fn check_failure(&self) -> RunnerResult<()> {
        if let Some(msg) = self.simulate_failure.read().clone() {
            return Err(RunnerError::ExecutionFailed(msg));
        }
        Ok(())
    }

    /// Walk the steps of a rendered script, applying rules.
    fn simulate_script(&self, image: &str, script: &str) -> MockResponse {
        let rules = self.rules.read();
        let mut response = MockResponse::success("");

        for (index, step) in rendered_steps(script).iter().enumerate() {
            let marker = format!("{} {}\n", STEP_MARKER, index);
            response.stdout.push_str(&marker);
            response.stderr.push_str(&marker);

            match rules.iter().find(|r| r.matches(step, image, script)) {
                Some(MockRule {
                    action: MockAction::Output(text),
                    ..
                }) => response.stdout.push_str(text),
                Some(MockRule {
                    action: MockAction::Fail { exit_code, stderr },
                    ..
                }) => {
                    response.exit_code = *exit_code;
                    response.stderr.push_str(stderr);
                    break;
                }
                None => {}
            }
        }

        response
    }

    async fn run_tracked(
        &self,
        config: &ContainerConfig,
        cancel: &CancelToken,
    ) -> RunnerResult<MockResponse> {
        let start_failure = self.start_failure.read().clone();
        let response = match (start_failure, config.command.as_slice()) {
            (Some(response), _) => response,
            (None, [flag, script]) if flag == "-c" && is_rendered_script(script) => {
                self.simulate_script(&config.full_image(), script)
            }
            (None, _) => self.next_response(),
        };

        let delay = *self.delay.read();
        if !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(RunnerError::Cancelled),
            }
        }

        Ok(response)
    }
}

#[async_trait]
impl ContainerRunner for MockRunner {
    async fn is_available(&self) -> RunnerResult<bool> {
        self.record_call(CapturedCall::simple("is_available", None));
        Ok(*self.available.read())
    }

    async fn version(&self) -> RunnerResult<String> {
        self.record_call(CapturedCall::simple("version", None));
        self.check_failure()?;
        Ok(self.version.read().clone())
    }

    async fn pull_image(&self, image: &str, tag: &str) -> RunnerResult<()> {
        let full_image = format!("{}:{}", image, tag);
        self.record_call(CapturedCall::simple("pull_image", Some(full_image.clone())));
        self.check_failure()?;
        self.existing_images.write().push(full_image);
        Ok(())
    }

    async fn image_exists(&self, image: &str, tag: &str) -> RunnerResult<bool> {
        let full_image = format!("{}:{}", image, tag);
        self.record_call(CapturedCall::simple("image_exists", Some(full_image.clone())));
        Ok(self.existing_images.read().contains(&full_image))
    }

    async fn run_container(
        &self,
        config: &ContainerConfig,
        _run_config: &RunConfig,
        cancel: &CancelToken,
    ) -> RunnerResult<ExecutionResult> {
        self.record_call(CapturedCall {
            method: "run_container".to_string(),
            image: Some(config.full_image()),
            command: Some(config.command.clone()),
            env: Some(config.env.clone()),
            secret_keys: config.secret_env.keys().cloned().collect(),
            workdir: config.workdir.clone(),
        });

        self.check_failure()?;
        if cancel.is_cancelled() {
            return Err(RunnerError::Cancelled);
        }

        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_running, Ordering::SeqCst);
        let outcome = self.run_tracked(config, cancel).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        let response = outcome?;

        let started_at = Utc::now();
        let finished_at = started_at + chrono::Duration::milliseconds(response.duration_ms as i64);

        Ok(ExecutionResult {
            container_id: format!("mock-{}", uuid::Uuid::new_v4()),
            exit_code: response.exit_code,
            stdout: response.stdout,
            stderr: response.stderr,
            started_at,
            finished_at,
            duration_ms: response.duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SetupStep;
    use crate::script::Script;
    use tfpipe_core::CommandLine;

    fn scripted(config: ContainerConfig, commands: &[CommandLine]) -> ContainerConfig {
        let script = Script::new(&config.setup, commands);
        config
            .entrypoint("/bin/sh")
            .command(vec!["-c".to_string(), script.render()])
    }

    #[tokio::test]
    async fn test_queued_responses_cycle() {
        let runner = MockRunner::new()
            .add_response(MockResponse::success("one"))
            .add_response(MockResponse::failure(2, "two"));
        let config = ContainerConfig::new("alpine").command(vec!["true".into()]);
        let cancel = CancelToken::never();

        let first = runner.run_container(&config, &RunConfig::default(), &cancel).await.unwrap();
        let second = runner.run_container(&config, &RunConfig::default(), &cancel).await.unwrap();
        let third = runner.run_container(&config, &RunConfig::default(), &cancel).await.unwrap();

        assert_eq!(first.stdout, "one");
        assert_eq!(second.exit_code, 2);
        assert_eq!(third.stdout, "one");
        assert_eq!(runner.get_method_calls("run_container").len(), 3);
    }

    #[tokio::test]
    async fn test_script_rules_stop_at_failure() {
        let runner = MockRunner::new()
            .add_rule(MockRule::output("terraform version", "Terraform v1.12.0\n"))
            .add_rule(MockRule::fail("terraform validate", 1, "Error: bad\n"));

        let config = scripted(
            ContainerConfig::new("hashicorp/terraform").tag("1.12.0"),
            &[
                CommandLine::terraform(["version"]),
                CommandLine::terraform(["validate"]),
                CommandLine::terraform(["fmt"]),
            ],
        );

        let result = runner
            .run_container(&config, &RunConfig::default(), &CancelToken::never())
            .await
            .unwrap();

        assert_eq!(result.exit_code, 1);
        assert!(result.stdout.contains("Terraform v1.12.0"));
        assert!(result.stderr.ends_with("##tfpipe-step 1\nError: bad\n"));
        assert!(!result.stdout.contains("##tfpipe-step 2"));
    }

    #[tokio::test]
    async fn test_rule_conditions() {
        let runner = MockRunner::new()
            .add_rule(MockRule::fail("terraform init", 1, "unsupported\n").when(":1.5.7"));
        let commands = [CommandLine::terraform(["init"])];

        let old = scripted(ContainerConfig::new("hashicorp/terraform").tag("1.5.7"), &commands);
        let new = scripted(ContainerConfig::new("hashicorp/terraform").tag("1.12.0"), &commands);
        let cancel = CancelToken::never();

        let old = runner.run_container(&old, &RunConfig::default(), &cancel).await.unwrap();
        let new = runner.run_container(&new, &RunConfig::default(), &cancel).await.unwrap();

        assert!(!old.success());
        assert!(new.success());
    }

    #[tokio::test]
    async fn test_setup_steps_are_simulated() {
        let runner = MockRunner::new().add_rule(MockRule::fail("apk add", 99, "no network\n"));
        let config = scripted(
            ContainerConfig::new("alpine")
                .setup_step(SetupStep::shell("install-terraform", "apk add curl")),
            &[CommandLine::terraform(["init"])],
        );

        let result = runner
            .run_container(&config, &RunConfig::default(), &CancelToken::never())
            .await
            .unwrap();
        assert_eq!(result.exit_code, 99);
        assert!(result.stderr.starts_with("##tfpipe-step 0\nno network"));
    }

    #[tokio::test]
    async fn test_delay_is_cancellable() {
        let runner = MockRunner::new().with_delay(Duration::from_secs(30));
        let (source, cancel) = tfpipe_core::cancel_channel();
        source.cancel_after(Duration::from_millis(20));

        let started = std::time::Instant::now();
        let result = runner
            .run_container(&ContainerConfig::new("alpine"), &RunConfig::default(), &cancel)
            .await;

        assert!(matches!(result, Err(RunnerError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_simulated_failure_and_secret_capture() {
        let runner = MockRunner::new();
        let config = ContainerConfig::new("alpine").secret_env("GITLAB_TOKEN", "glpat-x");
        runner
            .run_container(&config, &RunConfig::default(), &CancelToken::never())
            .await
            .unwrap();

        let call = &runner.get_calls()[0];
        assert_eq!(call.secret_keys, vec!["GITLAB_TOKEN".to_string()]);
        assert!(!call.env.as_ref().unwrap().contains_key("GITLAB_TOKEN"));

        let failing = MockRunner::new().simulate_failure("daemon gone");
        assert!(failing.version().await.is_err());
        assert!(failing.was_called("version"));
    }
}
