// src/core/paths.rs

//! Path expansion and the on-disk layout of a run.

use crate::constants::METADATA_FILENAME;
use crate::models::RunLayout;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while resolving or preparing paths.
#[derive(Error, Debug)]
pub enum PathError {
    /// `~` or a variable in the path could not be expanded.
    #[error("Failed to expand path '{path}': {reason}")]
    Expansion {
        /// The offending path.
        path: String,
        /// Why expansion failed.
        reason: String,
    },
    /// A directory could not be created.
    #[error("Could not create directory at '{path}': {source}")]
    DirCreation {
        /// The offending path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A file could not be written.
    #[error("Could not write file '{path}': {source}")]
    FileWrite {
        /// The offending path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The destination id cannot be used as a directory name.
    #[error("Destination id must not be empty or contain path separators: '{0}'")]
    InvalidDestination(String),
}

/// Expands `~` and environment variables (`$VAR`, `${VAR}`) in a path
/// given on the command line or in the config.
pub fn expand_path(raw: &str) -> Result<PathBuf, PathError> {
    // `shellexpand::full` handles both the home dir and env vars.
    let expanded = shellexpand::full(raw).map_err(|e| PathError::Expansion {
        path: raw.to_string(),
        reason: e.to_string(),
    })?;
    Ok(PathBuf::from(expanded.into_owned()))
}

/// Creates `path` and its parents if missing.
pub fn ensure_dir(path: &Path) -> Result<(), PathError> {
    if path.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(path).map_err(|source| PathError::DirCreation {
        path: path.display().to_string(),
        source,
    })
}

/// Derives every directory and file of a run from its three roots and the
/// destination id. Nothing is created here.
pub fn build_layout(
    output_dir: &Path,
    work_dir: &Path,
    bids_dir: Option<&Path>,
    destination_id: &str,
) -> Result<RunLayout, PathError> {
    let id = destination_id.trim();
    if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
        return Err(PathError::InvalidDestination(destination_id.to_string()));
    }

    let output_dir = dunce::simplified(output_dir).to_path_buf();
    let work_dir = dunce::simplified(work_dir).to_path_buf();
    let bids_dir = match bids_dir {
        Some(dir) => dunce::simplified(dir).to_path_buf(),
        None => RunLayout::default_bids_dir(&work_dir),
    };

    let layout = RunLayout {
        analysis_output_dir: output_dir.join(id),
        metadata_path: output_dir.join(METADATA_FILENAME),
        bids_dir,
        output_dir,
        work_dir,
    };
    log::info!("output_dir is {}", layout.output_dir.display());
    log::info!("work_dir is {}", layout.work_dir.display());
    log::debug!("bids_dir is {}", layout.bids_dir.display());
    Ok(layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_derivation() {
        let layout = build_layout(Path::new("/flywheel/v0/output"), Path::new("/flywheel/v0/work"), None, "abc123")
            .unwrap();
        assert_eq!(layout.analysis_output_dir, PathBuf::from("/flywheel/v0/output/abc123"));
        assert_eq!(layout.metadata_path, PathBuf::from("/flywheel/v0/output/.metadata.json"));
        assert_eq!(layout.bids_dir, PathBuf::from("/flywheel/v0/work/bids"));
    }

    #[test]
    fn test_explicit_bids_dir_wins() {
        let layout = build_layout(Path::new("/out"), Path::new("/work"), Some(Path::new("/data/bids")), "d").unwrap();
        assert_eq!(layout.bids_dir, PathBuf::from("/data/bids"));
    }

    #[test]
    fn test_bad_destination_ids_are_rejected() {
        for id in ["", "  ", "a/b", ".."] {
            assert!(matches!(
                build_layout(Path::new("/out"), Path::new("/work"), None, id),
                Err(PathError::InvalidDestination(_))
            ));
        }
    }

    #[test]
    fn test_expand_path_passes_plain_paths_through() {
        assert_eq!(expand_path("/plain/path").unwrap(), PathBuf::from("/plain/path"));
        assert!(matches!(
            expand_path("$SURELY_UNSET_GEAR_VARIABLE_42/x"),
            Err(PathError::Expansion { .. })
        ));
    }

    #[test]
    fn test_ensure_dir_creates_parents() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a/b/c");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
