//! Data quality monitor command-line interface.
//!
//! Profiles tables, manages and executes data quality rules, and reports
//! DAMA dimension scores. Results are printed as JSON.
//!
//! # Security Guarantees
//! - Read-only database operations only
//! - Identifiers are validated against the live schema before use
//! - No credentials printed or logged

use clap::Parser;
use dqm_cli::{Cli, output, run};
use dqm_core::logging::init_logging;
use std::process::ExitCode;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.global.verbose, cli.global.quiet) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let result = match run(&cli).await {
        Ok(value) => output::emit(&value, cli.global.output.as_deref()).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
