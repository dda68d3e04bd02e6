//! Verify-files command - check mandatory module files on the host.

use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;

use super::{Invocation, SourceArgs};
use crate::output::OutputFormat;

#[derive(Args, Debug)]
pub struct VerifyFilesArgs {
    /// Additional required files (comma-separated or repeated)
    #[arg(long = "extra", value_delimiter = ',')]
    pub extra_files: Vec<String>,

    #[command(flatten)]
    pub source: SourceArgs,
}

pub async fn execute(args: VerifyFilesArgs, invocation: &Invocation) -> Result<()> {
    let job = invocation.job(&args.source)?;
    let dir = job
        .host_workdir()
        .context("No source directory configured")?;

    let extras: Vec<String> = invocation
        .file
        .extra_files
        .iter()
        .chain(&args.extra_files)
        .cloned()
        .collect();

    let result = tfpipe_iac::verify::verify_files(&dir, &extras);

    match invocation.format() {
        OutputFormat::Json => {
            let value = json!({
                "action": "verify-files",
                "directory": dir.display().to_string(),
                "passed": result.is_ok(),
                "error": result.as_ref().err().map(|e| e.to_string()),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text if result.is_ok() && !invocation.global.quiet => {
            println!("✅ All mandatory files present in {}", dir.display());
        }
        OutputFormat::Text => {}
    }

    Ok(result?)
}
