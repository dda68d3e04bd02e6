//! Docs command - regenerate README.md with terraform-docs.

use anyhow::Result;
use clap::Args;

use super::{Invocation, SourceArgs};
use crate::output;

#[derive(Args, Debug)]
pub struct DocsArgs {
    /// terraform-docs version
    #[arg(long)]
    pub terraform_docs_version: Option<String>,

    #[command(flatten)]
    pub source: SourceArgs,
}

pub async fn execute(args: DocsArgs, invocation: &Invocation) -> Result<()> {
    let mut pipeline = invocation.pipeline(&args.source).await?;
    if args.terraform_docs_version.is_some() {
        let job = pipeline
            .job()
            .clone()
            .with_terraform_docs(args.terraform_docs_version.as_deref());
        pipeline = pipeline.with_job(job);
    }

    let out = pipeline.docs(&invocation.cancel).await?;
    output::print_output("docs", &out, invocation.format())
}
