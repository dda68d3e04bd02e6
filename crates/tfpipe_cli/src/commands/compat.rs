//! Compat command - init and validate across Terraform versions.

use anyhow::Result;
use clap::Args;
use tracing::info;

use super::{Invocation, SourceArgs};
use crate::output::RunSummary;

#[derive(Args, Debug)]
pub struct CompatArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Versions to test, replacing the configured list
    #[arg(long, value_delimiter = ',')]
    pub versions: Vec<String>,

    /// Versions added to the configured list
    #[arg(long = "extra-version", value_delimiter = ',')]
    pub extra_versions: Vec<String>,
}

impl CompatArgs {
    fn resolve_versions(&self, invocation: &Invocation) -> Vec<String> {
        if !self.versions.is_empty() {
            return self.versions.clone();
        }
        let extra: Vec<String> = invocation
            .file
            .extra_versions
            .iter()
            .chain(&self.extra_versions)
            .cloned()
            .collect();
        invocation.file.defaults.compat_versions_with(&extra)
    }
}

pub async fn execute(args: CompatArgs, invocation: &Invocation) -> Result<()> {
    let versions = args.resolve_versions(invocation);
    info!("Checking compatibility with {}", versions.join(", "));

    let pipeline = invocation.pipeline(&args.source).await?;
    let tasks = pipeline.compatibility_tasks(&versions)?;
    let results = pipeline.run_tasks(tasks, &invocation.cancel).await?;

    invocation.report(&RunSummary::from_results("compat", &results))
}
