//! tfpipe CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error or cancelled run
//! - 2: Invalid arguments or configuration
//! - 3: Check failure
//! - 4: Container runtime error

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tfpipe_core::{cancel_channel, CoreError, EnvironmentError, TaskError};
use tfpipe_iac::IacError;
use tfpipe_runner::RunnerError;

mod commands;
mod config;
mod output;

use commands::{Cli, Commands, Invocation, RunError};
use config::{ConfigError, FileConfig};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const CHECK_FAILURE: u8 = 3;
    pub const RUNTIME_ERROR: u8 = 4;
}

fn init_logging(verbose: bool, quiet: bool) {
    let default_directive = if verbose {
        "tfpipe=debug,info"
    } else if quiet {
        "warn"
    } else {
        "tfpipe=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    // A subscriber installed earlier keeps receiving events.
    if let Err(e) = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init()
    {
        debug!("Logging already initialized: {}", e);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.global.verbose, cli.global.quiet);

    let file = match FileConfig::load(cli.global.config.as_deref()) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("❌ Error: {:#}", e);
            return ExitCode::from(ExitCodes::INVALID_ARGS);
        }
    };

    let (source, cancel) = cancel_channel();
    let interrupt = source.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling running containers");
            interrupt.cancel();
        }
    });
    if let Some(seconds) = cli.global.timeout.or(file.timeout) {
        info!("Run deadline: {}s", seconds);
        source.cancel_after(Duration::from_secs(seconds));
    }

    let invocation = Invocation {
        global: cli.global,
        file,
        cancel,
    };

    let result = match cli.command {
        Commands::StaticCheck(args) => commands::static_check::execute(args, &invocation).await,
        Commands::Compat(args) => commands::compat::execute(args, &invocation).await,
        Commands::Exec(args) => commands::exec::execute(args, &invocation).await,
        Commands::Lint(args) => commands::lint::execute(args, &invocation).await,
        Commands::Docs(args) => commands::docs::execute(args, &invocation).await,
        Commands::Plan(args) => commands::plan::execute(args, &invocation).await,
        Commands::VerifyFiles(args) => commands::verify_files::execute(args, &invocation).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Map a failure to its exit code by error type.
fn categorize_error(e: &anyhow::Error) -> u8 {
    if let Some(err) = e.downcast_ref::<RunError>() {
        return match err {
            RunError::ChecksFailed { .. } => ExitCodes::CHECK_FAILURE,
            RunError::Cancelled(_) => ExitCodes::GENERAL_ERROR,
        };
    }
    if let Some(err) = e.downcast_ref::<IacError>() {
        return categorize_iac(err);
    }
    if let Some(err) = e.downcast_ref::<CoreError>() {
        return categorize_core(err);
    }
    if e.downcast_ref::<ConfigError>().is_some() {
        return ExitCodes::INVALID_ARGS;
    }
    if e.downcast_ref::<RunnerError>().is_some() {
        return ExitCodes::RUNTIME_ERROR;
    }
    ExitCodes::GENERAL_ERROR
}

fn categorize_iac(err: &IacError) -> u8 {
    match err {
        IacError::InvalidEnvVar(_)
        | IacError::InvalidVariable(_)
        | IacError::InvalidArgs(_)
        | IacError::EmptyCommand
        | IacError::InvalidLogLevel(_)
        | IacError::InvalidVersion(_)
        | IacError::DotEnv(_)
        | IacError::InvalidSourceDir { .. }
        | IacError::Yaml(_) => ExitCodes::INVALID_ARGS,
        IacError::MissingFiles { .. } => ExitCodes::CHECK_FAILURE,
        IacError::Runner(_) => ExitCodes::RUNTIME_ERROR,
        IacError::Core(core) => categorize_core(core),
        IacError::Task(task) => categorize_task(task),
        IacError::Io(_) => ExitCodes::GENERAL_ERROR,
    }
}

fn categorize_core(err: &CoreError) -> u8 {
    match err {
        CoreError::AggregationFailed { cause, .. } => categorize_task(cause),
        CoreError::DuplicateLabel(_) | CoreError::EmptyCommand => ExitCodes::INVALID_ARGS,
        CoreError::IncompleteResults { .. } => ExitCodes::GENERAL_ERROR,
    }
}

fn categorize_task(err: &TaskError) -> u8 {
    match err {
        TaskError::CommandFailed {
            cause: EnvironmentError::Unavailable(_),
            ..
        } => ExitCodes::RUNTIME_ERROR,
        _ if err.is_cancelled() => ExitCodes::GENERAL_ERROR,
        _ => ExitCodes::CHECK_FAILURE,
    }
}
