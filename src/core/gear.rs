// src/core/gear.rs

//! # Gear Run
//!
//! One complete gear invocation, start to finish:
//!
//! 1. Fit `n_cpus`/`mem_gb` to the machine.
//! 2. Build the tool environment (container env plus per-run `HOME`/`TMPDIR`).
//! 3. Synthesize the tool command.
//! 4. Check upstream preconditions (the BIDS input must exist).
//! 5. Orchestrate the participant/group phases, or rehearse them on a dry run.
//! 6. Harvest results onto source records or into the batch document.
//! 7. Write the batch document, save the source records and report every
//!    problem at the end.
//!
//! Failures in steps 4 to 7 are collected in [`RunDiagnostics`] rather than
//! returned, so the run always reaches its report.

use crate::constants::GEAR_NAME;
use crate::core::config_loader::GearSettings;
use crate::core::diagnostics::RunDiagnostics;
use crate::core::environment::{self, WorkspaceOverrides};
use crate::core::harvester::{self, HarvestRequest};
use crate::core::orchestrator::{Orchestrator, PhaseState, WorkaroundPolicy};
use crate::core::paths::PathError;
use crate::core::performance::{self, Resources};
use crate::core::arg_builder;
use crate::core::dry_run::pretend_it_ran;
use crate::models::{AnalysisScope, ConfigOptions, DestinationScope, MetadataDocument, RunLayout};
use crate::system::executor::ProcessRunner;
use crate::system::record_store::SourceRecordStore;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Diagnostics category for problems found before the tool runs.
pub const UPSTREAM_ERROR: &str = "UpstreamError";
/// Diagnostics category for failures writing the run's own output.
pub const OUTPUT_ERROR: &str = "OutputError";

const DRY_RUN_WARNING: &str = "gear-dry-run is set: Command was NOT run.";

/// Everything a run needs, already resolved from CLI and config.
#[derive(Debug, Clone)]
pub struct GearInputs {
    /// Where inputs, outputs and scratch space live.
    pub layout: RunLayout,
    /// Id of the container the results are filed under.
    pub destination_id: String,
    /// Level of that container.
    pub destination_scope: DestinationScope,
    /// Scope requested by the user, if any.
    pub requested_scope: Option<AnalysisScope>,
    /// Analysis tool binary.
    pub binary: String,
    /// Options forwarded to the tool.
    pub options: ConfigOptions,
    /// Words from `bids_app_args`, passed through as-is.
    pub passthrough: Vec<String>,
    /// The gear's own settings.
    pub settings: GearSettings,
    /// Container environment file; the process environment is used when absent.
    pub environment_file: PathBuf,
}

impl GearInputs {
    /// The scope the run is carried out at. Project destinations are always
    /// summarized at group level.
    pub fn analysis_scope(&self) -> AnalysisScope {
        let default = self.destination_scope.default_analysis_scope();
        match self.requested_scope {
            Some(requested) if self.destination_scope == DestinationScope::Project => {
                if requested != AnalysisScope::Group {
                    log::warn!(
                        "analysis_level '{}' ignored: project destinations run at group level.",
                        requested
                    );
                }
                AnalysisScope::Group
            }
            Some(requested) => requested,
            None => default,
        }
    }
}

/// What a finished run produced.
#[derive(Debug)]
pub struct RunOutcome {
    /// Process exit code for the gear.
    pub exit_code: i32,
    /// Everything that went wrong, in order.
    pub diagnostics: RunDiagnostics,
    /// Terminal orchestration state; `None` when the tool was never started.
    pub final_state: Option<PhaseState>,
    /// The batch document, if one was written.
    pub metadata_path: Option<PathBuf>,
}

/// Runs the gear. Only setup failures (environment, temp dir) are returned as
/// errors; everything after that ends up in the outcome's diagnostics.
pub fn run_gear(
    inputs: &GearInputs,
    runner: &mut dyn ProcessRunner,
    store: &mut dyn SourceRecordStore,
    resources: Resources,
) -> Result<RunOutcome> {
    let layout = &inputs.layout;
    let dry_run = inputs.settings.dry_run;
    let scope = inputs.analysis_scope();
    let mut diagnostics = RunDiagnostics::new();

    log::info!(
        "Running at the {} level ({} analysis) for destination {}",
        inputs.destination_scope,
        scope,
        inputs.destination_id
    );

    // --- 1. Performance ---
    let mut options = inputs.options.clone();
    performance::apply_performance_config(&mut options, resources);

    // --- 2. Environment ---
    let mut environ = environment::load_environment(&inputs.environment_file)
        .context("Failed to load the tool environment")?;
    environment::apply_workspace_overrides(
        &mut environ,
        &WorkspaceOverrides {
            output_dir: &layout.output_dir,
            work_dir: &layout.work_dir,
            writable_dir: inputs.settings.writable_dir.as_deref(),
        },
    )
    .context("Failed to prepare the run workspace")?;
    environment::log_environment(&environ);

    // --- 3. Command ---
    let command =
        arg_builder::build_bids_command(&inputs.binary, layout, scope, &inputs.passthrough, &options);
    log::info!("command is: {}", command);

    // --- 4. Upstream checks ---
    if !dry_run && !layout.bids_dir.is_dir() {
        let msg = format!(
            "BIDS directory '{}' not found. Did not run {}",
            layout.bids_dir.display(),
            inputs.binary
        );
        log::error!("{}", msg);
        diagnostics.error(UPSTREAM_ERROR, msg);
    }

    // --- 5. Execution ---
    let policy = if inputs.settings.disable_workarounds {
        WorkaroundPolicy::disabled()
    } else {
        WorkaroundPolicy::default()
    };

    let mut final_state = None;
    let document = if diagnostics.has_errors() {
        log::info!("Command was NOT run because of previous errors.");
        harvest(inputs, scope, store)
    } else if dry_run {
        log::warn!("{}", DRY_RUN_WARNING);
        diagnostics.warning(DRY_RUN_WARNING);
        let mut orchestrator = Orchestrator::new(runner, &environ, true).with_policy(policy);
        final_state = Some(orchestrator.execute(
            &command,
            inputs.destination_scope,
            &layout.analysis_output_dir,
            &mut diagnostics,
        ));
        if let Err(e) = pretend_it_ran(&layout.analysis_output_dir) {
            log::warn!("Could not create fake output: {}", e);
        }
        Some(MetadataDocument::dry_run())
    } else {
        let mut orchestrator = Orchestrator::new(runner, &environ, false).with_policy(policy);
        final_state = Some(orchestrator.execute(
            &command,
            inputs.destination_scope,
            &layout.analysis_output_dir,
            &mut diagnostics,
        ));
        // --- 6. Harvest ---
        harvest(inputs, scope, store)
    };

    // --- 7. Metadata and report ---
    let mut metadata_path = None;
    if let Some(doc) = document.filter(MetadataDocument::has_content) {
        match write_metadata(&doc, &layout.metadata_path) {
            Ok(()) => metadata_path = Some(layout.metadata_path.clone()),
            Err(e) => {
                log::error!("{}", e);
                diagnostics.error(OUTPUT_ERROR, e.to_string());
            }
        }
    }

    if let Err(e) = store.save() {
        let msg = format!("Could not save updated source records: {}", e);
        log::error!("{}", msg);
        diagnostics.error(OUTPUT_ERROR, msg);
    }

    diagnostics.report();
    let exit_code = diagnostics.exit_code();
    log::info!("{} is done. Returning {}", GEAR_NAME, exit_code);

    Ok(RunOutcome {
        exit_code,
        diagnostics,
        final_state,
        metadata_path,
    })
}

fn harvest(
    inputs: &GearInputs,
    scope: AnalysisScope,
    store: &mut dyn SourceRecordStore,
) -> Option<MetadataDocument> {
    let request = HarvestRequest {
        analysis_output_dir: &inputs.layout.analysis_output_dir,
        output_dir: &inputs.layout.output_dir,
        destination_id: &inputs.destination_id,
        scope,
    };
    harvester::harvest(&request, store)
}

/// Writes the batch document as pretty JSON.
pub fn write_metadata(document: &MetadataDocument, path: &Path) -> Result<(), PathError> {
    let json = serde_json::to_string_pretty(document).map_err(|e| PathError::FileWrite {
        path: path.display().to_string(),
        source: e.into(),
    })?;
    fs::write(path, json).map_err(|source| PathError::FileWrite {
        path: path.display().to_string(),
        source,
    })?;
    log::info!("Wrote metadata to {}", path.display());
    Ok(())
}

// MARK: --- UNIT TESTS ---
