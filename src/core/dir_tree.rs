// src/core/dir_tree.rs

//! Directory listings for debug output.

use std::fmt::Write;
use std::path::Path;
use walkdir::WalkDir;

/// Renders an indented listing of everything under `root`, for debug dumps
/// when expected output is missing. Unreadable entries are skipped.
pub fn describe_tree(root: &Path) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", root.display());

    if !root.exists() {
        out.push_str("  (does not exist)\n");
        return out;
    }

    for entry in WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
    {
        let indent = "   ".repeat(entry.depth().saturating_sub(1));
        let marker = if entry.file_type().is_dir() { "/" } else { "" };
        let _ = writeln!(
            out,
            "{}├─ {}{}",
            indent,
            entry.file_name().to_string_lossy(),
            marker
        );
    }
    out
}
