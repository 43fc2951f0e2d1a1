mod cli;
mod commands;
mod error;
mod logging;
mod metadata;
mod output;

use clap::Parser;
use std::process::ExitCode;

use crate::cli::Cli;
use crate::error::CliError;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, CliError> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_format)?;

    let envelope = commands::run(&cli).await?;
    output::render(&envelope, cli.pretty)?;

    if cli.strict && (!envelope.meta.warnings.is_empty() || !envelope.errors.is_empty()) {
        return Err(CliError::StrictModeViolation {
            warning_count: envelope.meta.warnings.len(),
            error_count: envelope.errors.len(),
        });
    }

    if let Some(error) = envelope.errors.first() {
        return Ok(ExitCode::from(error::exit_code_for(error.kind)));
    }

    Ok(ExitCode::SUCCESS)
}
