//! Plan command - terraform init and plan.

use anyhow::Result;
use clap::Args;

use super::{Invocation, SourceArgs};
use crate::output;

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// `.tfvars` file under the fixtures directory
    #[arg(long)]
    pub fixture: Option<String>,

    #[command(flatten)]
    pub source: SourceArgs,
}

pub async fn execute(args: PlanArgs, invocation: &Invocation) -> Result<()> {
    let pipeline = invocation.pipeline(&args.source).await?;
    let out = pipeline
        .plan(args.fixture.as_deref(), &invocation.cancel)
        .await?;
    output::print_output("plan", &out, invocation.format())
}
