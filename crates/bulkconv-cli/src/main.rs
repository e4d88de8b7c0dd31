//! `bulkconv`: submit documents, inspect jobs and run the conversion worker.

mod app;
mod args;
mod commands;

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use app::{from_lib, App, CliError};
use args::{Cli, Command};
use bulkconv::config::default_config;
use bulkconv::{init_logging, load_config, Config};

fn load(cli: &Cli) -> Result<Config, CliError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path),
        None => default_config(),
    }
    .map_err(from_lib)?;

    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    Ok(config)
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = load(&cli)?;
    init_logging(&config.logging)?;
    let app = App::open(config)?;

    match cli.command {
        Command::Submit { files, wait } => commands::submit(&app, &files, wait),
        Command::Status { job_id } => commands::status(&app, &job_id),
        Command::Download {
            job_id,
            file,
            output,
        } => commands::download(&app, &job_id, file.as_deref(), &output),
        Command::Worker { poll_secs, events } => {
            commands::worker(&app, Duration::from_secs(poll_secs.max(1)), events)
        }
    }
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
