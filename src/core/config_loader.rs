// src/core/config_loader.rs

//! # Config Loader
//!
//! Reads the gear's `config.json` and splits its flat `config` object into
//! two parts: the gear's own settings (`gear-*` keys and friends) and the
//! options forwarded to the analysis tool as a [`ConfigOptions`] mapping.

use crate::constants::{BIDS_APP_ARGS_KEY, GEAR_KEY_PREFIXES, GEAR_ONLY_KEYS};
use crate::models::{AnalysisScope, ConfigOptions, GearConfigFile, OptionValue, ScopeParseError};
use log::LevelFilter;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while reading the gear configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read configuration file '{path}': {source}")]
    Read {
        /// The configuration file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid JSON.
    #[error("Invalid JSON in '{path}': {source}")]
    Parse {
        /// The configuration file.
        path: String,
        /// Underlying parser error.
        #[source]
        source: serde_json::Error,
    },
    /// A tool option value has no command-line form.
    #[error("Option '{name}' has an unsupported value: {reason}")]
    UnsupportedValue {
        /// Option name.
        name: String,
        /// What is wrong with the value.
        reason: String,
    },
    /// `bids_app_args` could not be split.
    #[error("Could not split '{0}' into arguments: unbalanced quotes.")]
    UnbalancedQuotes(String),
    /// The environment file is not a flat object of strings.
    #[error("Environment file '{0}' must hold a flat object of strings.")]
    InvalidEnvironment(String),
    /// The log level name is unknown.
    #[error("Unknown log level '{0}'.")]
    InvalidLogLevel(String),
    /// A gear setting has the wrong type.
    #[error("Setting '{name}' must be {expected}.")]
    InvalidSetting {
        /// Setting name.
        name: String,
        /// The accepted type.
        expected: &'static str,
    },
    /// A scope name is unknown.
    #[error(transparent)]
    Scope(#[from] ScopeParseError),
}

/// Gear settings read from the `config` object. None of these reach the tool.
#[derive(Debug, Clone, PartialEq)]
pub struct GearSettings {
    /// Level the logger starts at.
    pub log_level: LevelFilter,
    /// Log the tool commands instead of running them.
    pub dry_run: bool,
    /// Writable area of the compute node, if the platform reports one.
    pub writable_dir: Option<PathBuf>,
    /// Analysis scope explicitly requested in the config.
    pub analysis_level: Option<AnalysisScope>,
    /// Skip the two-phase workaround for project destinations.
    pub disable_workarounds: bool,
}

impl Default for GearSettings {
    fn default() -> Self {
        Self {
            log_level: LevelFilter::Info,
            dry_run: false,
            writable_dir: None,
            analysis_level: None,
            disable_workarounds: false,
        }
    }
}

/// Reads and deserializes a gear config file.
pub fn load_config_file(path: &Path) -> Result<GearConfigFile, ConfigError> {
    log::debug!("Loading gear configuration from '{}'", path.display());
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Whether a config key configures the gear rather than the tool.
pub fn is_gear_key(name: &str) -> bool {
    GEAR_KEY_PREFIXES.iter().any(|p| name.starts_with(p)) || GEAR_ONLY_KEYS.contains(&name)
}

/// Converts one JSON config value into an option value.
///
/// Objects have no command-line form, and lists may only hold strings.
pub fn option_value_from_json(name: &str, value: &Value) -> Result<OptionValue, ConfigError> {
    match value {
        Value::Null => Ok(OptionValue::Unset),
        Value::Bool(b) => Ok(OptionValue::Flag(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(OptionValue::Integer(i)),
            None => n.as_f64().map(OptionValue::Float).ok_or_else(|| {
                ConfigError::UnsupportedValue {
                    name: name.to_string(),
                    reason: format!("number {} is out of range", n),
                }
            }),
        },
        Value::String(s) => Ok(OptionValue::Text(s.clone())),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                other => Err(ConfigError::UnsupportedValue {
                    name: name.to_string(),
                    reason: format!("list element {} is not a string", other),
                }),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(OptionValue::List),
        Value::Object(_) => Err(ConfigError::UnsupportedValue {
            name: name.to_string(),
            reason: "nested objects cannot be passed on a command line".to_string(),
        }),
    }
}

/// The options forwarded to the tool, in config order, without gear keys
/// and without values that emit nothing. Numeric zero is kept.
pub fn extract_tool_options(config: &Map<String, Value>) -> Result<ConfigOptions, ConfigError> {
    let mut options = ConfigOptions::new();
    for (name, value) in config {
        if is_gear_key(name) {
            log::trace!("Skipping gear setting '{}'", name);
            continue;
        }
        options.insert(name.clone(), option_value_from_json(name, value)?);
    }
    options.retain_present();
    log::debug!("{} tool options taken from configuration", options.len());
    Ok(options)
}

/// Free-form words from `bids_app_args`, split with shell quoting rules.
pub fn extract_passthrough(config: &Map<String, Value>) -> Result<Vec<String>, ConfigError> {
    match config.get(BIDS_APP_ARGS_KEY) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(raw)) => {
            shlex::split(raw).ok_or_else(|| ConfigError::UnbalancedQuotes(raw.clone()))
        }
        Some(_) => Err(ConfigError::InvalidSetting {
            name: BIDS_APP_ARGS_KEY.to_string(),
            expected: "a string",
        }),
    }
}

/// Reads the gear's own settings.
pub fn gear_settings(config: &Map<String, Value>) -> Result<GearSettings, ConfigError> {
    let mut settings = GearSettings::default();

    if let Some(level) = string_setting(config, "gear-log-level")? {
        settings.log_level = parse_log_level(level)?;
    }
    settings.dry_run = bool_setting(config, "gear-dry-run")?;
    settings.disable_workarounds = bool_setting(config, "gear-disable-workarounds")?;
    settings.writable_dir = string_setting(config, "gear-writable-dir")?
        .filter(|s| !s.is_empty())
        .map(PathBuf::from);
    settings.analysis_level = string_setting(config, "analysis_level")?
        .filter(|s| !s.is_empty())
        .map(str::parse::<AnalysisScope>)
        .transpose()?;

    Ok(settings)
}

/// Maps the platform's level names onto `log` filters. There is no
/// critical level in `log`, so it maps to `error`.
pub fn parse_log_level(level: &str) -> Result<LevelFilter, ConfigError> {
    match level.trim().to_ascii_uppercase().as_str() {
        "TRACE" => Ok(LevelFilter::Trace),
        "DEBUG" => Ok(LevelFilter::Debug),
        "INFO" => Ok(LevelFilter::Info),
        "WARNING" | "WARN" => Ok(LevelFilter::Warn),
        "ERROR" | "CRITICAL" => Ok(LevelFilter::Error),
        "OFF" => Ok(LevelFilter::Off),
        _ => Err(ConfigError::InvalidLogLevel(level.to_string())),
    }
}

fn string_setting<'a>(
    config: &'a Map<String, Value>,
    name: &str,
) -> Result<Option<&'a str>, ConfigError> {
    match config.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(ConfigError::InvalidSetting {
            name: name.to_string(),
            expected: "a string",
        }),
    }
}

fn bool_setting(config: &Map<String, Value>, name: &str) -> Result<bool, ConfigError> {
    match config.get(name) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(ConfigError::InvalidSetting {
            name: name.to_string(),
            expected: "true or false",
        }),
    }
}

// MARK: --- UNIT TESTS ---
