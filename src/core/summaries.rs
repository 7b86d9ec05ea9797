// src/core/summaries.rs

//! Group-level summary tables.

use crate::constants::SUMMARY_FILE_EXTENSION;
use crate::core::dir_tree;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Moves the group-level tabular summaries from the raw output directory into
/// the run's permanent output directory, renaming `name.tsv` to
/// `name_<destination_id>.tsv` so repeated runs against one destination do
/// not collide. A summary that cannot be moved is logged and left behind.
///
/// Returns the summaries now present in `output_dir`.
pub fn relocate_group_summaries(
    analysis_output_dir: &Path,
    output_dir: &Path,
    destination_id: &str,
) -> Vec<PathBuf> {
    for summary in list_summaries(analysis_output_dir) {
        let Some(stem) = summary.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        let dest = output_dir.join(format!(
            "{}_{}.{}",
            stem, destination_id, SUMMARY_FILE_EXTENSION
        ));
        match move_file(&summary, &dest) {
            Ok(()) => log::debug!("Moved '{}' to '{}'", summary.display(), dest.display()),
            Err(e) => log::warn!(
                "Could not move group summary '{}' to '{}': {}",
                summary.display(),
                dest.display(),
                e
            ),
        }
    }

    let relocated = list_summaries(output_dir);
    if relocated.is_empty() {
        log::debug!(
            "No group-level tsv files found. Output directory contents:\n{}",
            dir_tree::describe_tree(output_dir)
        );
    } else {
        let listing = relocated
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join("\n  ");
        log::info!("Group-level tsv files:\n  {}", listing);
    }
    relocated
}

/// Summary files sitting directly in `dir`, sorted by name.
fn list_summaries(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut summaries: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext == SUMMARY_FILE_EXTENSION)
        })
        .collect();
    summaries.sort();
    summaries
}

/// Renames, falling back to copy-and-delete across filesystems.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)?;
    fs::remove_file(from)
}
