use std::process::ExitCode;

use clap::Parser;
use cli::{Cli, Command};
use error::AppError;
use tracing::error;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod error;
mod replay;

fn run(cli: Cli) -> Result<(), AppError> {
    let config = cli.dataset_config()?;

    match cli.command {
        Command::Build { force } => commands::build(config, force).map(|_| ()),
        Command::Stats => commands::stats(config),
        Command::Batch { start, dump } => commands::batch(config, start, dump),
        Command::Replay { run, output, every } => commands::replay_run(config, run, output, every),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
