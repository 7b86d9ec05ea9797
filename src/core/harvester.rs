// src/core/harvester.rs

//! # Result Harvester
//!
//! Collects the per-scan JSON results the analysis tool leaves in its output
//! tree and routes each one either onto the source record it was computed
//! from, or into the batch [`MetadataDocument`] when no record matches.
//!
//! Failures are local: a bad file or a failed record write is logged and the
//! harvest moves on to the next file.

use crate::constants::{DATASET_SUMMARY_PREFIX, RESULT_FILE_EXTENSION};
use crate::core::{dir_tree, metrics, summaries};
use crate::models::{AnalysisScope, MetadataDocument, MetricTree};
use crate::system::record_store::SourceRecordStore;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Why a single result file was skipped.
#[derive(Error, Debug)]
pub enum HarvestError {
    /// The file could not be read.
    #[error("Could not read result file '{path}': {source}")]
    Io {
        /// The result file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file has no content.
    #[error("Result file '{0}' is empty.")]
    Empty(String),
    /// The file is not JSON.
    #[error("Result file '{path}' is not valid JSON: {source}")]
    Parse {
        /// The result file.
        path: String,
        /// Underlying parser error.
        #[source]
        source: serde_json::Error,
    },
    /// The file holds JSON, but not an object.
    #[error("Result file '{0}' does not hold a JSON object.")]
    NotAnObject(String),
}

/// Where to look and where to put things.
#[derive(Debug, Clone, Copy)]
pub struct HarvestRequest<'a> {
    /// Raw tool output (`<output_dir>/<destination_id>`).
    pub analysis_output_dir: &'a Path,
    /// Permanent output directory receiving relocated group summaries.
    pub output_dir: &'a Path,
    /// Suffix for relocated group summaries.
    pub destination_id: &'a str,
    /// Scope of the run being harvested.
    pub scope: AnalysisScope,
}

/// Harvests every result file under the request's output tree.
///
/// Returns the batch document only when at least one result could not be
/// attached to a source record; `None` means there is nothing to write.
pub fn harvest(
    request: &HarvestRequest<'_>,
    store: &mut dyn SourceRecordStore,
) -> Option<MetadataDocument> {
    log::debug!("Searching for IQMs to update metadata.");

    if request.scope == AnalysisScope::Group {
        summaries::relocate_group_summaries(
            request.analysis_output_dir,
            request.output_dir,
            request.destination_id,
        );
    }

    let result_files = find_output_files(request.analysis_output_dir, RESULT_FILE_EXTENSION);
    if result_files.is_empty() {
        log::info!("Did not find MRIQC output files to harvest.");
        log::debug!("{}", dir_tree::describe_tree(request.analysis_output_dir));
        return None;
    }

    let mut document = MetadataDocument::default();
    let mut attached = 0usize;
    let mut skipped = 0usize;

    for result_file in &result_files {
        log::debug!("Parsing {}", result_file.display());
        let data = match parse_result_file(result_file) {
            Ok(data) => data,
            Err(e) => {
                log::info!("Skipping result file: {}", e);
                skipped += 1;
                continue;
            }
        };

        let scan_id = scan_identifier(result_file);
        let tree = metrics::create_nested_metadata(&data);

        match store.find(&scan_id) {
            Some(record) => {
                let patch = derived_patch(tree);
                match store.update_metadata(&record, &patch) {
                    Ok(()) => {
                        log::info!("Updated {}", record.name);
                        attached += 1;
                    }
                    Err(e) => log::error!("Could not update metadata on '{}': {}", record.name, e),
                }
            }
            None => {
                log::info!(
                    "No matching, analyzed source record for {}; adding to batch metadata.",
                    scan_id
                );
                document.push_batch_entry(tree, &scan_id);
            }
        }
    }

    let batched = document.batch_entries().len();
    log::info!(
        "Harvested {} result files: {} attached to source records, {} batched, {} skipped.",
        result_files.len(),
        attached,
        batched,
        skipped
    );

    (batched > 0).then_some(document)
}

/// Recursively lists result files under `root` with extension `ext`, skipping
/// hidden files and dataset-level summaries. Order is stable (sorted by name
/// within each directory).
pub fn find_output_files(root: &Path, ext: &str) -> Vec<PathBuf> {
    let files: Vec<PathBuf> = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy();
            !name.starts_with('.') && !name.starts_with(DATASET_SUMMARY_PREFIX)
        })
        .filter(|entry| entry.path().extension().is_some_and(|e| e == ext))
        .map(|entry| entry.into_path())
        .collect();

    if !files.is_empty() {
        let listing = files
            .iter()
            .map(|f| f.display().to_string())
            .collect::<Vec<_>>()
            .join("\n  ");
        log::info!("Found IQM files:\n  {}", listing);
    }
    files
}

/// Reads one result file as a JSON object.
pub fn parse_result_file(path: &Path) -> Result<Map<String, Value>, HarvestError> {
    let display = path.display().to_string();
    let content = fs::read_to_string(path).map_err(|source| HarvestError::Io {
        path: display.clone(),
        source,
    })?;
    if content.trim().is_empty() {
        return Err(HarvestError::Empty(display));
    }
    match serde_json::from_str::<Value>(&content) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(HarvestError::NotAnObject(display)),
        Err(source) => Err(HarvestError::Parse {
            path: display,
            source,
        }),
    }
}

/// The scan a result file belongs to: its base name without extension.
pub fn scan_identifier(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Wraps metrics the way they are stored on a source record.
fn derived_patch(tree: MetricTree) -> Map<String, Value> {
    let mut iqm = Map::new();
    iqm.insert("IQM".to_string(), Value::Object(tree));
    let mut patch = Map::new();
    patch.insert("derived".to_string(), Value::Object(iqm));
    patch
}

// MARK: --- UNIT TESTS ---
