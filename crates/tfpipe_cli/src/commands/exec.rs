//! Exec command - run one terraform command.

use anyhow::Result;
use clap::Args;

use tfpipe_iac::parse::parse_args;

use super::{Invocation, SourceArgs};
use crate::output;

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Terraform command, e.g. `validate` or `state list`
    pub command: String,

    /// Comma-separated arguments, e.g. `-upgrade,-backend=false`
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    pub args: String,

    #[command(flatten)]
    pub source: SourceArgs,
}

pub async fn execute(args: ExecArgs, invocation: &Invocation) -> Result<()> {
    let command_args = parse_args(&args.args)?;
    let pipeline = invocation.pipeline(&args.source).await?;

    let out = pipeline
        .exec(&args.command, &command_args, &invocation.cancel)
        .await?;
    output::print_output("exec", &out, invocation.format())
}
