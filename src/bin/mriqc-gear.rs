// src/bin/mriqc-gear.rs

//! Command-line entry point.

use anyhow::Result;
use clap::Parser;
use colored::*;
use log::LevelFilter;
use mriqc_gear::cli::{Cli, handlers};

/// The main entry point of the gear.
/// It reads the configuration, sets up logging, runs the gear and performs
/// centralized error handling.
fn main() {
    match run_cli(&Cli::parse()) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            // Setup failures only; problems during the run are already in the log.
            eprintln!("\n{}: {:#}", "Error".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn run_cli(cli: &Cli) -> Result<i32> {
    // The log level may come from the config, so it is read first.
    let loaded = handlers::run::load_config(cli)?;
    init_logging(handlers::run::log_level(&loaded));
    handlers::run::handle(cli, &loaded)
}

/// `RUST_LOG` wins over the configured level when set.
fn init_logging(level: LevelFilter) {
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp_secs()
        .parse_default_env()
        .init();
}
