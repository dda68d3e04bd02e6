//! Lint command - run tflint.

use anyhow::Result;
use clap::Args;

use tfpipe_iac::ToolVersion;

use super::{Invocation, SourceArgs};
use crate::output;

#[derive(Args, Debug)]
pub struct LintArgs {
    /// tflint version (`latest` uses the install script)
    #[arg(long)]
    pub tflint_version: Option<String>,

    #[command(flatten)]
    pub source: SourceArgs,
}

pub async fn execute(args: LintArgs, invocation: &Invocation) -> Result<()> {
    let mut pipeline = invocation.pipeline(&args.source).await?;
    if let Some(version) = &args.tflint_version {
        let version = match version.as_str() {
            "latest" => ToolVersion::Latest,
            pinned => ToolVersion::from_option(Some(pinned)),
        };
        let job = pipeline.job().clone().with_tflint(version);
        pipeline = pipeline.with_job(job);
    }

    let out = pipeline.lint(&invocation.cancel).await?;
    output::print_output("lint", &out, invocation.format())
}
