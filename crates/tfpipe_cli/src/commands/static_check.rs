//! Static-check command - init, validate and fmt-check in parallel.

use anyhow::Result;
use clap::Args;
use tracing::info;

use super::{Invocation, SourceArgs};
use crate::output::RunSummary;

#[derive(Args, Debug)]
pub struct StaticCheckArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

pub async fn execute(args: StaticCheckArgs, invocation: &Invocation) -> Result<()> {
    let pipeline = invocation.pipeline(&args.source).await?;
    info!(
        "Running static checks with Terraform {}",
        pipeline.job().terraform_version()
    );

    let tasks = pipeline.static_check_tasks()?;
    let results = pipeline.run_tasks(tasks, &invocation.cancel).await?;

    invocation.report(&RunSummary::from_results("static-check", &results))
}
