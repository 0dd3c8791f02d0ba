//! Work-item enumeration: LAS files in one directory (non-recursive) or a single file.

use anyhow::{Context, Result, bail};
use log::{debug, warn};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::WorkItem;

fn is_las(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("las"))
}

/// `.las` files (case-insensitive) directly inside `dir`, sorted by path and deduplicated.
/// Unreadable entries are skipped with a warning.
pub fn find_las_files(dir: &Path) -> Result<Vec<WorkItem>> {
    if !dir.exists() {
        bail!("directory does not exist: {}", dir.display());
    }
    if !dir.is_dir() {
        bail!("not a directory: {}", dir.display());
    }
    let mut paths: Vec<PathBuf> = Vec::new();
    for entry_result in WalkDir::new(dir).min_depth(1).max_depth(1).into_iter() {
        match entry_result {
            Ok(entry) => {
                if entry.file_type().is_file() && is_las(entry.path()) {
                    paths.push(entry.into_path());
                }
            }
            Err(err) => warn!("Skipping unreadable entry: {}", err),
        }
    }
    paths.sort();
    paths.dedup();

    let mut items = Vec::with_capacity(paths.len());
    for path in paths {
        match WorkItem::from_path(&path) {
            Ok(item) => items.push(item),
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }
    debug!("Found {} LAS files in {}", items.len(), dir.display());
    Ok(items)
}

/// One explicit file as a batch of one.
pub fn single_file(path: &Path) -> Result<WorkItem> {
    if !path.is_file() {
        bail!("not a file: {}", path.display());
    }
    WorkItem::from_path(path).with_context(|| format!("read metadata of {}", path.display()))
}
