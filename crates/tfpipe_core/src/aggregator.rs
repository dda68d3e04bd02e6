//! Result aggregation.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::error::{CoreError, CoreResult, TaskError};
use crate::task::TaskResult;

/// Output of one successful task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub label: String,
    pub output: String,
}

/// Combined outputs of a fully successful run, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub entries: Vec<ReportEntry>,
}

impl AggregateReport {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.label.as_str()).collect()
    }

    /// Every task output joined by newlines.
    pub fn combined_output(&self) -> String {
        self.entries
            .iter()
            .map(|e| e.output.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for AggregateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "==> {}", entry.label)?;
            let output = entry.output.trim_end();
            if !output.is_empty() {
                writeln!(f, "{}", output)?;
            }
        }
        Ok(())
    }
}

/// Consume every result from `rx` and produce a report or the first failure.
///
/// The channel is drained until it closes even after a failure is known, so
/// no worker is left blocked on a send. `expected` is the number of tasks that
/// were dispatched; receiving a different count is an error.
pub async fn aggregate(
    mut rx: mpsc::Receiver<TaskResult>,
    expected: usize,
) -> CoreResult<AggregateReport> {
    if expected == 0 {
        return Ok(AggregateReport::default());
    }

    let mut report = AggregateReport {
        entries: Vec::with_capacity(expected),
    };
    let mut first_failure: Option<TaskError> = None;
    let mut received = 0usize;

    while let Some(result) = rx.recv().await {
        received += 1;
        debug!("Received result {}/{} from {}", received, expected, result.label);

        match result.error {
            None if first_failure.is_none() => report.entries.push(ReportEntry {
                label: result.label,
                output: result.output,
            }),
            None => {}
            Some(err) if first_failure.is_none() => {
                error!("{}", err);
                first_failure = Some(err);
            }
            Some(err) => warn!("Additional failure: {}", err),
        }
    }

    if received != expected {
        return Err(CoreError::IncompleteResults { expected, received });
    }

    match first_failure {
        Some(cause) => Err(CoreError::AggregationFailed {
            label: cause.label().to_string(),
            cause: Box::new(cause),
        }),
        None => Ok(report),
    }
}
