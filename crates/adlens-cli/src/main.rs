mod cli;
mod commands;
mod envelope;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::error::CliError;

fn main() {
    init_logging();

    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(error.exit_code());
    }
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();

    let outcome = commands::run(&cli)?;
    output::render(&outcome.envelope, cli.format, cli.pretty)?;

    match outcome.failure {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// Logs go to stderr so stdout carries only the envelope.
fn init_logging() {
    let filter = EnvFilter::try_from_env("ADLENS_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
