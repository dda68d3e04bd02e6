//! Fan-out dispatcher.
//!
//! Every descriptor gets its own tokio task. Workers never talk to each other;
//! each sends exactly one [`TaskResult`] on a shared channel sized to the
//! number of tasks, so a send never blocks. A supervisor task holds its own
//! sender until every worker has been joined, which makes it the only party
//! that can end the stream.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::aggregator::{aggregate, AggregateReport};
use crate::cancel::CancelToken;
use crate::environment::EnvironmentError;
use crate::error::{CoreError, CoreResult, TaskError};
use crate::task::{TaskDescriptor, TaskResult};

/// Runs task descriptors concurrently.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    max_concurrency: Option<usize>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit how many tasks run at the same time. `0` means unbounded.
    pub fn max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = if limit == 0 { None } else { Some(limit) };
        self
    }

    /// Start one worker per descriptor.
    ///
    /// Returns the receiving end of the completion channel and the number of
    /// results that will arrive on it before it closes.
    pub fn dispatch(
        &self,
        descriptors: Vec<TaskDescriptor>,
        cancel: &CancelToken,
    ) -> CoreResult<(mpsc::Receiver<TaskResult>, usize)> {
        ensure_unique_labels(&descriptors)?;

        let expected = descriptors.len();
        let (tx, rx) = mpsc::channel(expected.max(1));
        let semaphore = self.max_concurrency.map(|n| Arc::new(Semaphore::new(n)));

        info!("Dispatching {} task(s)", expected);

        let mut workers = JoinSet::new();
        for descriptor in descriptors {
            let tx = tx.clone();
            let cancel = cancel.clone();
            let semaphore = semaphore.clone();

            workers.spawn(async move {
                let label = descriptor.label().to_string();
                let started = Instant::now();

                // The task body runs in its own tokio task so a panic inside an
                // environment still produces a result under this label.
                let body = tokio::spawn(async move {
                    let _permit = match semaphore {
                        Some(semaphore) => tokio::select! {
                            permit = semaphore.acquire_owned() => permit.ok(),
                            _ = cancel.cancelled() => {
                                return cancelled_before_start(descriptor, started);
                            }
                        },
                        None => None,
                    };
                    execute(descriptor, &cancel).await
                });

                let result = match body.await {
                    Ok(result) => result,
                    Err(join_error) => {
                        let message = panic_message(join_error);
                        warn!("Worker for task {} panicked: {}", label, message);
                        TaskResult::failure(
                            label.clone(),
                            TaskError::WorkerPanicked { label, message },
                            started.elapsed(),
                        )
                    }
                };

                if tx.send(result).await.is_err() {
                    debug!("Result receiver dropped before all tasks finished");
                }
            });
        }

        tokio::spawn(async move {
            let supervisor_tx = tx;
            while workers.join_next().await.is_some() {}
            debug!("All {} worker(s) finished, closing result channel", expected);
            drop(supervisor_tx);
        });

        Ok((rx, expected))
    }

    /// Dispatch every descriptor and collapse the results into one report.
    ///
    /// Returns the first failure observed, wrapped with its task label.
    pub async fn run_matrix(
        &self,
        descriptors: Vec<TaskDescriptor>,
        cancel: &CancelToken,
    ) -> CoreResult<AggregateReport> {
        if descriptors.is_empty() {
            return Ok(AggregateReport::default());
        }

        let (rx, expected) = self.dispatch(descriptors, cancel)?;
        aggregate(rx, expected).await
    }

    /// Dispatch every descriptor and return all results in arrival order.
    pub async fn run_all(
        &self,
        descriptors: Vec<TaskDescriptor>,
        cancel: &CancelToken,
    ) -> CoreResult<Vec<TaskResult>> {
        if descriptors.is_empty() {
            return Ok(Vec::new());
        }

        let (mut rx, expected) = self.dispatch(descriptors, cancel)?;
        let mut results = Vec::with_capacity(expected);
        while let Some(result) = rx.recv().await {
            results.push(result);
        }

        if results.len() != expected {
            return Err(CoreError::IncompleteResults {
                expected,
                received: results.len(),
            });
        }
        Ok(results)
    }
}

/// Run `descriptors` concurrently with an unbounded dispatcher.
pub async fn run_matrix(
    cancel: &CancelToken,
    descriptors: Vec<TaskDescriptor>,
) -> CoreResult<AggregateReport> {
    Dispatcher::new().run_matrix(descriptors, cancel).await
}

async fn execute(descriptor: TaskDescriptor, cancel: &CancelToken) -> TaskResult {
    let started = Instant::now();
    let (label, commands, environment) = descriptor.into_parts();

    let environment = match environment {
        Ok(environment) => environment,
        Err(cause) => {
            warn!("Task {} has no environment: {}", label, cause);
            return TaskResult::failure(
                label.clone(),
                TaskError::EnvironmentSetupFailed { label, cause },
                started.elapsed(),
            );
        }
    };

    if cancel.is_cancelled() {
        return TaskResult::failure(
            label.clone(),
            TaskError::from_environment(label, EnvironmentError::Cancelled),
            started.elapsed(),
        );
    }

    debug!("Task {} running {} command(s)", label, commands.len());

    match environment.run(cancel, &commands).await {
        Ok(output) => {
            info!("Task {} succeeded in {:?}", label, started.elapsed());
            TaskResult::success(label, output, started.elapsed())
        }
        Err(cause) => {
            warn!("Task {} failed: {}", label, cause);
            TaskResult::failure(
                label.clone(),
                TaskError::from_environment(label, cause),
                started.elapsed(),
            )
        }
    }
}

/// A task that never got a permit. A known setup failure outranks the cancellation.
fn cancelled_before_start(descriptor: TaskDescriptor, started: Instant) -> TaskResult {
    let (label, _, environment) = descriptor.into_parts();
    let error = match environment {
        Err(cause) => TaskError::EnvironmentSetupFailed {
            label: label.clone(),
            cause,
        },
        Ok(_) => TaskError::from_environment(label.clone(), EnvironmentError::Cancelled),
    };
    TaskResult::failure(label, error, started.elapsed())
}

fn ensure_unique_labels(descriptors: &[TaskDescriptor]) -> CoreResult<()> {
    let mut seen = HashSet::with_capacity(descriptors.len());
    for descriptor in descriptors {
        if !seen.insert(descriptor.label()) {
            return Err(CoreError::DuplicateLabel(descriptor.label().to_string()));
        }
    }
    Ok(())
}

fn panic_message(error: tokio::task::JoinError) -> String {
    if error.is_cancelled() {
        return "task was cancelled by the runtime".to_string();
    }
    match error.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string()),
        Err(error) => error.to_string(),
    }
}
