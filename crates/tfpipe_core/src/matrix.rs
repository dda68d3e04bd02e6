//! Version × check matrix expansion.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::command::CommandLine;
use crate::environment::EnvironmentFactory;
use crate::error::{CoreError, CoreResult};
use crate::task::TaskDescriptor;

/// A named command sequence run against every version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckDefinition {
    pub name: String,
    pub commands: Vec<CommandLine>,
}

impl CheckDefinition {
    pub fn new(name: impl Into<String>, commands: Vec<CommandLine>) -> Self {
        Self {
            name: name.into(),
            commands,
        }
    }
}

/// Label of the task running `check` against `version`.
pub fn matrix_label(version: &str, check: &str) -> String {
    format!("{}.{}", version, check)
}

/// Expand versions × checks into task descriptors.
///
/// The factory is called once per pair so no two descriptors share an
/// environment. Versions are de-duplicated keeping first occurrence; the
/// result order is versions-major, checks-minor. A factory failure becomes a
/// descriptor that reports the failure when dispatched.
///
/// Fails with [`CoreError::DuplicateLabel`] when two checks share a name or
/// two distinct version/check pairs render to the same label.
pub fn build_matrix<F>(
    versions: &[String],
    checks: &[CheckDefinition],
    factory: &F,
) -> CoreResult<Vec<TaskDescriptor>>
where
    F: EnvironmentFactory + ?Sized,
{
    let mut check_names = HashSet::new();
    for check in checks {
        if !check_names.insert(check.name.as_str()) {
            return Err(CoreError::DuplicateLabel(check.name.clone()));
        }
    }

    let mut seen_versions = HashSet::new();
    let mut labels = HashSet::new();
    let mut descriptors = Vec::with_capacity(versions.len() * checks.len());

    for version in versions {
        if !seen_versions.insert(version.as_str()) {
            debug!("Skipping repeated version {}", version);
            continue;
        }

        for check in checks {
            let label = matrix_label(version, &check.name);
            if !labels.insert(label.clone()) {
                return Err(CoreError::DuplicateLabel(label));
            }
            let descriptor = match factory.for_version(version) {
                Ok(environment) => {
                    TaskDescriptor::new(label, check.commands.clone(), environment)
                }
                Err(err) => {
                    warn!("Could not prepare environment for {}: {}", label, err);
                    TaskDescriptor::with_setup_error(label, check.commands.clone(), err)
                }
            };
            descriptors.push(descriptor);
        }
    }

    Ok(descriptors)
}
