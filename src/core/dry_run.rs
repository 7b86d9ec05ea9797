// src/core/dry_run.rs

//! Rehearsal support for `gear-dry-run`.

use crate::core::paths::{self, PathError};
use std::fs;
use std::path::{Path, PathBuf};

/// Placeholder files a real run would leave in the analysis output directory,
/// relative to that directory.
const FAKE_OUTPUT_FILES: &[&str] = &[
    "logs/CITATION.md",
    "sub-TOME3024/anat/sub-TOME3024_desc-about_T1w.html",
    "sub-TOME3024_T1w.html",
];

/// Creates a small fake output tree so the rest of the pipeline has something
/// to look at when the tool was not actually run. Returns the created files.
pub fn pretend_it_ran(analysis_output_dir: &Path) -> Result<Vec<PathBuf>, PathError> {
    log::info!("Creating fake output in {}", analysis_output_dir.display());

    let mut created = Vec::with_capacity(FAKE_OUTPUT_FILES.len());
    for rel in FAKE_OUTPUT_FILES {
        let file = analysis_output_dir.join(rel);
        if let Some(parent) = file.parent() {
            paths::ensure_dir(parent)?;
        }
        fs::write(&file, "").map_err(|source| PathError::FileWrite {
            path: file.display().to_string(),
            source,
        })?;
        log::debug!("Creating: {}", file.display());
        created.push(file);
    }
    Ok(created)
}
