//! Atomic file writes
//!
//! Content goes to a uniquely named sibling temp file which is then renamed
//! over the target, so readers see either the old file or the new one, never
//! a partial write. Concurrent writers to one target never share a temp file;
//! the last rename wins.

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::Builder;

use crate::error::{Result, StagingError};

/// Writes `content` to `path` via temp file + rename
///
/// `phase` names the operation for error reports (e.g., "write metadata").
pub fn atomic_write(path: &Path, content: &[u8], phase: &'static str) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| StagingError::io(phase, dir, e))?;

    let prefix = format!(
        ".{}.",
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    );
    let mut temp = Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| StagingError::io(phase, dir, e))?;

    temp.write_all(content)
        .map_err(|e| StagingError::io(phase, temp.path(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| StagingError::io(phase, temp.path(), e))?;

    // A failed persist drops the temp file, which removes it
    temp.persist(path)
        .map_err(|e| StagingError::io(phase, path, e.error))?;

    Ok(())
}
