use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Replace a file's content in one step
///
/// The content goes to a uniquely named temporary file in the same directory,
/// which is synced and then persisted over `path`. Concurrent writers never
/// share a temporary file, and a failed write leaves the old content intact.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    ensure_directory_exists(dir)?;

    let mut temp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;

    temp.write_all(content)
        .context("Failed to write to temporary file")?;
    temp.as_file()
        .sync_all()
        .context("Failed to sync file to disk")?;

    // Dropping the error's file handle removes the temporary file
    temp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to replace {}", path.display()))?;

    Ok(())
}

/// Create `path` and its parents unless it already exists
pub fn ensure_directory_exists(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() || path.exists() {
        return Ok(());
    }

    std::fs::create_dir_all(path)
        .with_context(|| format!("Failed to create directory: {}", path.display()))
}
