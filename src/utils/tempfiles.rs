use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::utils::config::PackagePaths;

/// Sibling temp path for `final_path` (`<name>.tmp`), so the rename stays on one filesystem.
pub fn temp_path_for(final_path: &Path) -> PathBuf {
    let name = final_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_else(|| PackagePaths::get().report_filename());
    final_path
        .parent()
        .unwrap_or(Path::new("."))
        .join(format!("{name}.tmp"))
}

pub fn rename_temp_to_final(temp_path: &Path, final_path: &Path) -> Result<()> {
    fs::rename(temp_path, final_path).with_context(|| {
        format!(
            "atomic rename temp report to final path ({} -> {})",
            temp_path.display(),
            final_path.display()
        )
    })
}

/// Write `bytes` to `final_path` via a temp file and rename. Readers never see a partial file.
/// A stale temp from an earlier crash is replaced; the temp is removed if the rename fails.
pub fn write_atomic(final_path: &Path, bytes: &[u8]) -> Result<()> {
    let temp_path = temp_path_for(final_path);
    if temp_path.exists() {
        fs::remove_file(&temp_path)
            .with_context(|| format!("remove stale temp at {}", temp_path.display()))?;
    }
    fs::write(&temp_path, bytes)
        .with_context(|| format!("write temp report {}", temp_path.display()))?;
    if let Err(e) = rename_temp_to_final(&temp_path, final_path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }
    Ok(())
}
