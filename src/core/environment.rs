// src/core/environment.rs

//! The environment the analysis tool runs with.
//!
//! Gear containers ship the environment they were built with as
//! `gear_environ.json`; when it is missing the current process environment is
//! used. On top of that base, `HOME` and `TMPDIR` are pointed at per-run
//! locations so runs sharing a node do not share caches.

use crate::core::config_loader::ConfigError;
use crate::core::paths::{self, PathError};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Reads the container environment from `path`, falling back to the process
/// environment when the file does not exist.
pub fn load_environment(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    if !path.is_file() {
        log::debug!(
            "'{}' not found; using the current process environment.",
            path.display()
        );
        return Ok(env::vars().collect());
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let raw: Map<String, Value> =
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

    raw.into_iter()
        .map(|(key, value)| match value {
            Value::String(s) => Ok((key, s)),
            _ => Err(ConfigError::InvalidEnvironment(path.display().to_string())),
        })
        .collect()
}

/// Per-run overrides applied on top of the base environment.
#[derive(Debug, Clone, Copy)]
pub struct WorkspaceOverrides<'a> {
    /// Becomes `HOME` when no writable dir is given.
    pub output_dir: &'a Path,
    /// Holds `tmp`, which becomes `TMPDIR`.
    pub work_dir: &'a Path,
    /// Platform-provided writable area; becomes `HOME` when set.
    pub writable_dir: Option<&'a Path>,
}

/// Points `HOME` and `TMPDIR` at per-run locations. `TMPDIR` is created if
/// needed. Returns the temp dir.
pub fn apply_workspace_overrides(
    environ: &mut HashMap<String, String>,
    overrides: &WorkspaceOverrides<'_>,
) -> Result<PathBuf, PathError> {
    if let Some(writable) = overrides.writable_dir {
        if overrides.output_dir.starts_with(writable) {
            let home = writable.join("bidsapp");
            log::debug!("Setting HOME to {}", home.display());
            environ.insert("HOME".to_string(), home.to_string_lossy().into_owned());
        }
    }

    let tmp = overrides.work_dir.join("tmp");
    paths::ensure_dir(&tmp)?;
    environ.insert("TMPDIR".to_string(), tmp.to_string_lossy().into_owned());
    Ok(tmp)
}

/// Logs the environment at debug level, one sorted `KEY=VALUE` per line.
pub fn log_environment(environ: &HashMap<String, String>) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    log::debug!("Environment:");
    let sorted: BTreeMap<_, _> = environ.iter().collect();
    for (key, value) in sorted {
        log::debug!("  {}={}", key, value);
    }
}
