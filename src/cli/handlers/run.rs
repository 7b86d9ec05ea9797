// src/cli/handlers/run.rs

//! The `run` handler: turns CLI flags and the config file into a gear run.

use crate::{
    cli::Cli,
    constants::DEFAULT_BIDS_APP_BINARY,
    core::{
        config_loader::{self, GearSettings},
        gear::{self, GearInputs},
        paths,
        performance::Resources,
    },
    models::{AnalysisScope, DestinationScope, GearConfigFile},
    system::{executor::SystemRunner, record_store::LocalRecordStore},
};
use anyhow::{Context, Result, anyhow};
use log::LevelFilter;

/// The configuration file and the gear settings it carries, with CLI
/// overrides applied. Read before logging is set up so the log level can
/// come from the config.
#[derive(Debug)]
pub struct LoadedConfig {
    /// The parsed file, or an empty one when the default file is absent.
    pub file: GearConfigFile,
    /// Settings with CLI overrides applied.
    pub settings: GearSettings,
}

/// Reads `--config` and applies `--dry-run` and `--log-level` on top.
pub fn load_config(cli: &Cli) -> Result<LoadedConfig> {
    let path = paths::expand_path(&cli.config)?;
    let file = if path.is_file() {
        config_loader::load_config_file(&path)?
    } else if cli.uses_default_config() {
        GearConfigFile::default()
    } else {
        return Err(anyhow!("Configuration file '{}' not found.", path.display()));
    };

    let mut settings = config_loader::gear_settings(&file.config)
        .with_context(|| format!("Invalid gear settings in '{}'", path.display()))?;
    settings.dry_run |= cli.dry_run;
    if let Some(level) = &cli.log_level {
        settings.log_level = config_loader::parse_log_level(level)?;
    }
    if let Some(scope) = cli.analysis_level {
        settings.analysis_level = Some(scope);
    }
    Ok(LoadedConfig { file, settings })
}

/// The level the logger should be initialized with.
pub fn log_level(loaded: &LoadedConfig) -> LevelFilter {
    loaded.settings.log_level
}

/// Picks the destination level: the CLI flag, then the config's destination,
/// then whatever the requested analysis level implies.
pub fn resolve_destination_scope(
    cli_scope: Option<DestinationScope>,
    file: &GearConfigFile,
    requested: Option<AnalysisScope>,
) -> DestinationScope {
    cli_scope
        .or_else(|| file.destination.as_ref().and_then(|d| d.level))
        .unwrap_or(match requested {
            Some(AnalysisScope::Group) => DestinationScope::Project,
            _ => DestinationScope::Session,
        })
}

/// Resolves everything a run needs from the CLI and the loaded config.
pub fn build_inputs(cli: &Cli, loaded: &LoadedConfig) -> Result<GearInputs> {
    let file = &loaded.file;
    let destination_id = cli
        .destination_id
        .clone()
        .or_else(|| file.destination.as_ref().map(|d| d.id.clone()))
        .ok_or_else(|| anyhow!("No destination id given (use --destination-id or set destination.id)."))?;

    let bids_dir = cli.bids_dir.as_deref().map(paths::expand_path).transpose()?;
    let layout = paths::build_layout(
        &paths::expand_path(&cli.output_dir)?,
        &paths::expand_path(&cli.work_dir)?,
        bids_dir.as_deref(),
        &destination_id,
    )?;

    let options = config_loader::extract_tool_options(&file.config)
        .context("Invalid tool options in configuration")?;
    let passthrough = config_loader::extract_passthrough(&file.config)?;
    let requested_scope = loaded.settings.analysis_level;

    Ok(GearInputs {
        layout,
        destination_scope: resolve_destination_scope(cli.destination_scope, file, requested_scope),
        destination_id,
        requested_scope,
        binary: cli
            .binary
            .clone()
            .unwrap_or_else(|| DEFAULT_BIDS_APP_BINARY.to_string()),
        options,
        passthrough,
        settings: loaded.settings.clone(),
        environment_file: paths::expand_path(&cli.environment)?,
    })
}

/// Main entry point for a gear run. Returns the process exit code.
pub fn handle(cli: &Cli, loaded: &LoadedConfig) -> Result<i32> {
    log::debug!("CLI args parsed: {:?}", cli);
    let inputs = build_inputs(cli, loaded)?;

    let mut store = match &cli.records {
        Some(records) => {
            let path = paths::expand_path(records)?;
            LocalRecordStore::load(&path)
                .with_context(|| format!("Failed to load source records from '{}'", path.display()))?
        }
        None => LocalRecordStore::empty(),
    };

    let mut runner = SystemRunner::with_cwd(&inputs.layout.work_dir);
    let outcome = gear::run_gear(&inputs, &mut runner, &mut store, Resources::detect())?;
    Ok(outcome.exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serde_json::{Value, json};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("mriqc-gear").chain(args.iter().copied())).unwrap()
    }

    fn write_config(dir: &Path, value: Value) -> String {
        let path = dir.join("config.json");
        fs::write(&path, value.to_string()).unwrap();
        path.display().to_string()
    }

    #[test]
    fn test_destination_scope_resolution_order() {
        let file: GearConfigFile = serde_json::from_value(json!({
            "config": {},
            "destination": {"id": "d", "type": "analysis", "level": "subject"}
        }))
        .unwrap();
        assert_eq!(
            resolve_destination_scope(Some(DestinationScope::Project), &file, None),
            DestinationScope::Project
        );
        assert_eq!(resolve_destination_scope(None, &file, None), DestinationScope::Subject);
        assert_eq!(
            resolve_destination_scope(None, &GearConfigFile::default(), Some(AnalysisScope::Group)),
            DestinationScope::Project
        );
        assert_eq!(
            resolve_destination_scope(None, &GearConfigFile::default(), None),
            DestinationScope::Session
        );
    }

    #[test]
    fn test_cli_overrides_config_settings() {
        let dir = TempDir::new().unwrap();
        let config = write_config(
            dir.path(),
            json!({"config": {"gear-log-level": "INFO", "gear-dry-run": false}}),
        );
        let loaded = load_config(&cli(&["--config", &config, "--dry-run", "--log-level", "debug"])).unwrap();
        assert!(loaded.settings.dry_run);
        assert_eq!(log_level(&loaded), LevelFilter::Debug);
    }

    #[test]
    fn test_explicit_missing_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.json").display().to_string();
        assert!(load_config(&cli(&["--config", &missing])).is_err());
    }

    #[test]
    fn test_missing_destination_id_is_an_error() {
        let dir = TempDir::new().unwrap();
        let config = write_config(dir.path(), json!({"config": {}}));
        let parsed = cli(&["--config", &config]);
        let loaded = load_config(&parsed).unwrap();
        assert!(build_inputs(&parsed, &loaded).is_err());
    }

    #[test]
    fn test_build_inputs_from_config() {
        let dir = TempDir::new().unwrap();
        let config = write_config(
            dir.path(),
            json!({
                "config": {
                    "gear-log-level": "INFO",
                    "bids_app_args": "--no-sub",
                    "verbose": "vv",
                    "anat-only": true
                },
                "destination": {"id": "abc", "type": "analysis"}
            }),
        );
        let out = dir.path().join("output").display().to_string();
        let work = dir.path().join("work").display().to_string();
        let parsed = cli(&["--config", &config, "--output-dir", &out, "--work-dir", &work]);
        let loaded = load_config(&parsed).unwrap();
        let inputs = build_inputs(&parsed, &loaded).unwrap();

        assert_eq!(inputs.destination_id, "abc");
        assert_eq!(inputs.binary, "mriqc");
        assert_eq!(inputs.passthrough, vec!["--no-sub"]);
        assert_eq!(inputs.options.len(), 2);
        assert_eq!(inputs.layout.analysis_output_dir, dir.path().join("output/abc"));
        assert_eq!(inputs.destination_scope, DestinationScope::Session);
    }

    #[test]
    fn test_dry_run_end_to_end() {
        let dir = TempDir::new().unwrap();
        let config = write_config(
            dir.path(),
            json!({
                "config": {"gear-dry-run": true, "verbose": "v"},
                "destination": {"id": "abc", "type": "analysis"}
            }),
        );
        let out = dir.path().join("output");
        let work = dir.path().join("work");
        let env_file = dir.path().join("gear_environ.json");
        fs::write(&env_file, r#"{"PATH": "/usr/bin"}"#).unwrap();
        let out_s = out.display().to_string();
        let work_s = work.display().to_string();
        let env_s = env_file.display().to_string();
        let parsed = cli(&[
            "--config",
            &config,
            "--output-dir",
            &out_s,
            "--work-dir",
            &work_s,
            "--environment",
            &env_s,
            "--binary",
            "definitely-not-installed-mriqc",
        ]);
        let loaded = load_config(&parsed).unwrap();

        let code = handle(&parsed, &loaded).unwrap();

        assert_eq!(code, 0);
        assert!(out.join(".metadata.json").is_file());
        assert!(work.join("tmp").is_dir());
    }
}
