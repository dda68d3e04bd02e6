//! Integration tests for fan-out dispatch and aggregation.
//!
//! These tests drive the dispatcher with in-process fake environments that
//! record what ran, so no container runtime is needed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mockall::mock;
use parking_lot::Mutex;

use tfpipe_core::{
    build_matrix, cancel_channel, run_matrix, CancelToken, CheckDefinition, CommandLine,
    CoreError, Dispatcher, EnvironmentError, ExecutionEnvironment, TaskDescriptor, TaskError,
};

/// Shared record of finished tasks, in completion order.
#[derive(Default, Clone)]
struct Journal {
    completed: Arc<Mutex<Vec<String>>>,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Journal {
    fn completed(&self) -> Vec<String> {
        self.completed.lock().clone()
    }
}

/// Fake environment bound to one tool version.
struct FakeEnvironment {
    label: String,
    version: String,
    delay: Duration,
    fail_on: Option<(String, String)>,
    output: String,
    journal: Journal,
}

#[async_trait]
impl ExecutionEnvironment for FakeEnvironment {
    async fn run(
        &self,
        cancel: &CancelToken,
        commands: &[CommandLine],
    ) -> Result<String, EnvironmentError> {
        let now = self.journal.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.journal.peak.fetch_max(now, Ordering::SeqCst);

        let result = async {
            let mut last = String::new();
            for command in commands {
                tokio::select! {
                    _ = tokio::time::sleep(self.delay) => {}
                    _ = cancel.cancelled() => return Err(EnvironmentError::Cancelled),
                }

                if let Some((version, sub)) = &self.fail_on {
                    if version == &self.version && command.args().first() == Some(sub) {
                        return Err(EnvironmentError::Command {
                            command: command.clone(),
                            exit_code: Some(1),
                            message: format!("simulated failure on {}", self.version),
                        });
                    }
                }
                last = format!("{} {}", self.output, command);
            }
            Ok(if self.output.is_empty() { last } else { self.output.clone() })
        }
        .await;

        self.journal.running.fetch_sub(1, Ordering::SeqCst);
        if result.is_ok() {
            self.journal.completed.lock().push(self.label.clone());
        }
        result
    }
}

fn fake(
    label: &str,
    version: &str,
    output: &str,
    delay: Duration,
    fail_on: Option<(&str, &str)>,
    journal: &Journal,
) -> Arc<dyn ExecutionEnvironment> {
    Arc::new(FakeEnvironment {
        label: label.to_string(),
        version: version.to_string(),
        delay,
        fail_on: fail_on.map(|(v, s)| (v.to_string(), s.to_string())),
        output: output.to_string(),
        journal: journal.clone(),
    })
}

fn init_commands() -> Vec<CommandLine> {
    vec![
        CommandLine::terraform(["version"]),
        CommandLine::terraform(["init", "-backend=false"]),
    ]
}

#[tokio::test]
async fn test_failing_version_reported_while_sibling_completes() {
    let journal = Journal::default();
    let descriptors = vec![
        TaskDescriptor::new(
            "1.12.0.init",
            init_commands(),
            fake("1.12.0.init", "1.12.0", "", Duration::from_millis(5), Some(("1.12.1", "init")), &journal),
        ),
        TaskDescriptor::new(
            "1.12.1.init",
            init_commands(),
            fake("1.12.1.init", "1.12.1", "", Duration::from_millis(5), Some(("1.12.1", "init")), &journal),
        ),
    ];

    let err = run_matrix(&CancelToken::never(), descriptors).await.unwrap_err();

    match err {
        CoreError::AggregationFailed { label, cause } => {
            assert_eq!(label, "1.12.1.init");
            match *cause {
                TaskError::CommandFailed {
                    command: Some(command),
                    cause: EnvironmentError::Command { message, .. },
                    ..
                } => {
                    assert_eq!(command, CommandLine::terraform(["init", "-backend=false"]));
                    assert!(message.contains("simulated failure"));
                }
                other => panic!("unexpected cause: {:?}", other),
            }
        }
        other => panic!("unexpected error: {:?}", other),
    }

    assert_eq!(journal.completed(), vec!["1.12.0.init".to_string()]);
}

#[tokio::test]
async fn test_three_outputs_each_appear_once() {
    let journal = Journal::default();
    let descriptors = [("first", "A", 30), ("second", "B", 10), ("third", "C", 20)]
        .into_iter()
        .map(|(label, output, ms)| {
            TaskDescriptor::new(
                label,
                vec![CommandLine::new("echo", [output])],
                fake(label, "1.0.0", output, Duration::from_millis(ms), None, &journal),
            )
        })
        .collect();

    let report = Dispatcher::new()
        .run_matrix(descriptors, &CancelToken::never())
        .await
        .unwrap();

    let combined = report.combined_output();
    for needle in ["A", "B", "C"] {
        assert_eq!(combined.matches(needle).count(), 1, "{} in {:?}", needle, combined);
    }
    assert_eq!(report.len(), 3);
}

#[tokio::test]
async fn test_every_result_consumed_before_returning() {
    let journal = Journal::default();
    let descriptors: Vec<_> = (0..16)
        .map(|i| {
            let label = format!("task-{}", i);
            TaskDescriptor::new(
                label.clone(),
                vec![CommandLine::new("true", Vec::<String>::new())],
                fake(&label, "1.0.0", "ok", Duration::from_millis(5 + (i % 4) * 10), None, &journal),
            )
        })
        .collect();

    let report = Dispatcher::new()
        .run_matrix(descriptors, &CancelToken::never())
        .await
        .unwrap();

    assert_eq!(report.len(), 16);
    assert_eq!(journal.completed().len(), 16);
}

#[tokio::test]
async fn test_failure_does_not_stop_siblings() {
    let journal = Journal::default();
    let mut descriptors = vec![TaskDescriptor::new(
        "broken",
        vec![CommandLine::terraform(["validate"])],
        fake("broken", "0.1.0", "", Duration::from_millis(1), Some(("0.1.0", "validate")), &journal),
    )];
    for label in ["b", "c", "d"] {
        descriptors.push(TaskDescriptor::new(
            label,
            vec![CommandLine::terraform(["validate"])],
            fake(label, "1.0.0", label, Duration::from_millis(40), None, &journal),
        ));
    }

    let results = Dispatcher::new()
        .run_all(descriptors, &CancelToken::never())
        .await
        .unwrap();

    assert_eq!(results.len(), 4);
    let by_label: HashMap<_, _> = results.iter().map(|r| (r.label.as_str(), r)).collect();
    assert!(!by_label["broken"].is_success());
    for label in ["b", "c", "d"] {
        assert!(by_label[label].is_success());
    }

    let mut completed = journal.completed();
    completed.sort();
    assert_eq!(completed, vec!["b", "c", "d"]);
}

#[tokio::test]
async fn test_run_finishes_in_bounded_time() {
    let journal = Journal::default();
    let descriptors: Vec<_> = (0..8)
        .map(|i| {
            let label = format!("t{}", i);
            let fail = if i % 3 == 0 { Some(("1.0.0", "plan")) } else { None };
            TaskDescriptor::new(
                label.clone(),
                vec![CommandLine::terraform(["plan"])],
                fake(&label, "1.0.0", "", Duration::from_millis(10), fail, &journal),
            )
        })
        .collect();

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        Dispatcher::new().run_matrix(descriptors, &CancelToken::never()),
    )
    .await
    .expect("dispatcher must not deadlock");

    assert!(matches!(outcome, Err(CoreError::AggregationFailed { .. })));
}

#[tokio::test]
async fn test_empty_input_returns_immediately() {
    let report = tokio::time::timeout(
        Duration::from_millis(100),
        run_matrix(&CancelToken::never(), Vec::new()),
    )
    .await
    .expect("empty run must not block")
    .unwrap();

    assert!(report.is_empty());
    assert_eq!(report.combined_output(), "");
}

#[tokio::test]
async fn test_concurrency_limit_respected() {
    let journal = Journal::default();
    let descriptors: Vec<_> = (0..6)
        .map(|i| {
            let label = format!("limited-{}", i);
            TaskDescriptor::new(
                label.clone(),
                vec![CommandLine::new("sleep", ["1"])],
                fake(&label, "1.0.0", "done", Duration::from_millis(20), None, &journal),
            )
        })
        .collect();

    Dispatcher::new()
        .max_concurrency(2)
        .run_matrix(descriptors, &CancelToken::never())
        .await
        .unwrap();

    assert!(journal.peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(journal.completed().len(), 6);
}

#[tokio::test]
async fn test_cancellation_surfaces_as_errors() {
    let journal = Journal::default();
    let descriptors: Vec<_> = (0..3)
        .map(|i| {
            let label = format!("slow-{}", i);
            TaskDescriptor::new(
                label.clone(),
                vec![CommandLine::terraform(["init"])],
                fake(&label, "1.0.0", "", Duration::from_secs(30), None, &journal),
            )
        })
        .collect();

    let (source, cancel) = cancel_channel();
    source.cancel_after(Duration::from_millis(20));

    let results = tokio::time::timeout(
        Duration::from_secs(5),
        Dispatcher::new().run_all(descriptors, &cancel),
    )
    .await
    .expect("cancellation must unblock workers")
    .unwrap();

    assert_eq!(results.len(), 3);
    assert!(results
        .iter()
        .all(|r| r.error.as_ref().map(TaskError::is_cancelled).unwrap_or(false)));
}

#[tokio::test]
async fn test_matrix_with_failing_factory_still_reports() {
    let journal = Journal::default();
    let versions = vec!["1.11.4".to_string(), "0.0.0".to_string()];
    let checks = vec![
        CheckDefinition::new("init", init_commands()),
        CheckDefinition::new("validate", vec![CommandLine::terraform(["validate"])]),
    ];

    let factory = {
        let journal = journal.clone();
        move |version: &str| -> Result<Arc<dyn ExecutionEnvironment>, EnvironmentError> {
            if version == "0.0.0" {
                return Err(EnvironmentError::Setup {
                    step: "install-terraform".into(),
                    message: "release not found".into(),
                });
            }
            Ok(fake(version, version, "ok", Duration::from_millis(1), None, &journal))
        }
    };

    let descriptors = build_matrix(&versions, &checks, &factory).unwrap();
    let results = Dispatcher::new()
        .run_all(descriptors, &CancelToken::never())
        .await
        .unwrap();

    assert_eq!(results.len(), 4);
    let setup_failures: Vec<_> = results
        .iter()
        .filter(|r| matches!(r.error, Some(TaskError::EnvironmentSetupFailed { .. })))
        .map(|r| r.label.clone())
        .collect();
    assert_eq!(setup_failures.len(), 2);
    assert!(setup_failures.iter().all(|l| l.starts_with("0.0.0.")));
}

struct PanickingEnvironment;

#[async_trait]
impl ExecutionEnvironment for PanickingEnvironment {
    async fn run(
        &self,
        _cancel: &CancelToken,
        _commands: &[CommandLine],
    ) -> Result<String, EnvironmentError> {
        panic!("environment exploded");
    }
}

#[tokio::test]
async fn test_panicking_worker_still_accounted_for() {
    let journal = Journal::default();
    let descriptors = vec![
        TaskDescriptor::new("boom", vec![], Arc::new(PanickingEnvironment)),
        TaskDescriptor::new(
            "fine",
            vec![],
            fake("fine", "1.0.0", "fine", Duration::from_millis(1), None, &journal),
        ),
    ];

    let results = Dispatcher::new()
        .run_all(descriptors, &CancelToken::never())
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    let boom = results.iter().find(|r| r.label == "boom").unwrap();
    match &boom.error {
        Some(TaskError::WorkerPanicked { message, .. }) => {
            assert!(message.contains("environment exploded"))
        }
        other => panic!("unexpected: {:?}", other),
    }
}

mock! {
    pub Env {}

    #[async_trait]
    impl ExecutionEnvironment for Env {
        async fn run(
            &self,
            cancel: &CancelToken,
            commands: &[CommandLine],
        ) -> Result<String, EnvironmentError>;
    }
}

#[tokio::test]
async fn test_environment_receives_commands_in_order() {
    let mut env = MockEnv::new();
    env.expect_run()
        .times(1)
        .withf(|_, commands| {
            commands.len() == 2
                && commands[0] == CommandLine::terraform(["init", "-backend=false"])
                && commands[1] == CommandLine::terraform(["validate"])
        })
        .returning(|_, _| Ok("Success! The configuration is valid.".to_string()));

    let descriptors = vec![TaskDescriptor::new(
        "1.12.0.validate",
        vec![
            CommandLine::terraform(["init", "-backend=false"]),
            CommandLine::terraform(["validate"]),
        ],
        Arc::new(env),
    )];

    let report = run_matrix(&CancelToken::never(), descriptors).await.unwrap();
    assert!(report.combined_output().contains("configuration is valid"));
}

#[tokio::test]
async fn test_duplicate_labels_fail_fast() {
    let mut env = MockEnv::new();
    env.expect_run().never();
    let env: Arc<dyn ExecutionEnvironment> = Arc::new(env);

    let descriptors = vec![
        TaskDescriptor::new("same", vec![], env.clone()),
        TaskDescriptor::new("same", vec![], env),
    ];

    let err = run_matrix(&CancelToken::never(), descriptors).await.unwrap_err();
    assert!(matches!(err, CoreError::DuplicateLabel(label) if label == "same"));
}
