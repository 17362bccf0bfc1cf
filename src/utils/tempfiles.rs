use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Temp sibling of `out_path` that output is written to before the final rename.
pub fn temp_path_for(out_path: &Path) -> PathBuf {
    let name = out_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());
    out_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .join(format!(".{name}.tmp"))
}

/// Remove a stale temp left by an interrupted run and return the path to write to.
pub fn prepare_output_path(out_path: &Path) -> Result<PathBuf> {
    let temp_path = temp_path_for(out_path);
    if temp_path.exists() {
        log::debug!("Removing stale temp output {}", temp_path.display());
        fs::remove_file(&temp_path)
            .with_context(|| format!("remove stale temp output at {}", temp_path.display()))?;
    }
    Ok(temp_path)
}

pub fn rename_temp_to_final(temp_path: &Path, final_path: &Path) -> Result<()> {
    fs::rename(temp_path, final_path).with_context(|| {
        format!(
            "atomic rename temp output to final path ({} -> {})",
            temp_path.display(),
            final_path.display()
        )
    })
}

/// Best-effort cleanup after a failed run.
pub fn discard_temp(temp_path: &Path) {
    if let Err(e) = fs::remove_file(temp_path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        log::warn!("Could not remove {}: {}", temp_path.display(), e);
    }
}
