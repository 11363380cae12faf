//! formsheet - evaluate form-like worksheets driven by formulas.

mod cli;
mod commands;
mod config;
mod error;
mod logging;

use clap::Parser;
use std::process::ExitCode;
use tracing::level_filters::LevelFilter;

use crate::cli::{Cli, Command};
use crate::config::{AppConfig, load_config};
use crate::logging::{LogConfig, init_logging};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&log_config_from_cli(&cli, &config));

    let result = match &cli.command {
        Command::Show { file } => commands::run_show(file, &config.engine),
        Command::Set {
            file,
            assignments,
            row,
        } => commands::run_set(file, assignments, row.as_deref(), &config.engine),
        Command::Eval { file, formula, row } => {
            commands::run_eval(file, formula, *row, &config.engine)
        }
        Command::Deps {
            file,
            path,
            kind,
            transitive,
        } => commands::run_deps(file, path, kind.as_deref(), *transitive, &config.engine),
        Command::Functions => {
            commands::run_functions();
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Flags win over the config file; `RUST_LOG` applies only when no
/// verbosity flag was given.
fn log_config_from_cli(cli: &Cli, config: &AppConfig) -> LogConfig {
    let flagged = cli.verbosity.is_present();
    let level_filter = if flagged {
        cli.verbosity.tracing_level_filter()
    } else {
        LevelFilter::from(config.log.level)
    };
    LogConfig {
        level_filter,
        format: cli.log_format.unwrap_or(config.log.format),
        use_env_filter: !flagged,
    }
}
