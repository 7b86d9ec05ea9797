// src/cli/mod.rs

//! Command-line surface.

use crate::constants::{CONFIG_FILENAME, ENVIRONMENT_FILENAME};
use crate::models::{AnalysisScope, DestinationScope};
use clap::Parser;

pub mod handlers;

/// mriqc-gear: runs MRIQC on BIDS data and files the image quality metrics.
///
/// Settings come from the gear's `config.json`; flags given here win over it.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = None,
    styles = clap::builder::Styles::styled()
        .header(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .usage(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .literal(clap::builder::styling::AnsiColor::Cyan.on_default().bold())
        .placeholder(clap::builder::styling::AnsiColor::Green.on_default()),
)]
pub struct Cli {
    /// Gear configuration file. Skipped silently if the default is absent.
    #[arg(long, value_name = "FILE", default_value = CONFIG_FILENAME)]
    pub config: String,

    /// BIDS input directory. Defaults to `<work-dir>/bids`.
    #[arg(long, value_name = "DIR")]
    pub bids_dir: Option<String>,

    /// Permanent output directory.
    #[arg(long, value_name = "DIR", default_value = "output")]
    pub output_dir: String,

    /// Scratch directory.
    #[arg(long, value_name = "DIR", default_value = "work")]
    pub work_dir: String,

    /// Id of the destination container. Overrides `destination.id`.
    #[arg(long, value_name = "ID")]
    pub destination_id: Option<String>,

    /// Level of the destination container.
    #[arg(long, value_name = "LEVEL", value_parser = parse_destination_scope)]
    pub destination_scope: Option<DestinationScope>,

    /// Analysis level to request (`participant` or `group`).
    #[arg(long, value_name = "LEVEL", value_parser = parse_analysis_scope)]
    pub analysis_level: Option<AnalysisScope>,

    /// JSON array of source records to attach metrics to.
    #[arg(long, value_name = "FILE")]
    pub records: Option<String>,

    /// Container environment file.
    #[arg(long, value_name = "FILE", default_value = ENVIRONMENT_FILENAME)]
    pub environment: String,

    /// Analysis tool binary.
    #[arg(long, value_name = "PATH")]
    pub binary: Option<String>,

    /// Log the tool commands instead of running them.
    #[arg(long)]
    pub dry_run: bool,

    /// Log level (DEBUG, INFO, WARNING, ERROR, CRITICAL). Overrides `gear-log-level`.
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

fn parse_destination_scope(s: &str) -> Result<DestinationScope, String> {
    s.parse().map_err(|e: crate::models::ScopeParseError| e.to_string())
}

fn parse_analysis_scope(s: &str) -> Result<AnalysisScope, String> {
    s.parse().map_err(|e: crate::models::ScopeParseError| e.to_string())
}

impl Cli {
    /// Whether `--config` still holds its default value.
    pub fn uses_default_config(&self) -> bool {
        self.config == CONFIG_FILENAME
    }
}
