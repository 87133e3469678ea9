//! Durable JSON records for router state.
//!
//! - Atomic writes using temp file + fsync + rename (no torn state after a crash)
//! - Missing files load as defaults
//! - Unparseable files are moved aside to `<name>.corrupt` and replaced by defaults
//! - Append-only JSON Lines log for archived records

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Serialize, de::DeserializeOwned};

use crate::error::{Result, RouterError};

/// Load a JSON record, falling back to `T::default()` when it is missing or corrupt.
pub fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match load(path) {
        Ok(Some(value)) => Ok(value),
        Ok(None) => {
            tracing::debug!(?path, "State file not found, using defaults");
            Ok(T::default())
        }
        Err(RouterError::StateCorrupt { message, .. }) => {
            let aside = corrupt_path(path);
            tracing::warn!(?path, ?aside, %message, "State file corrupt, starting from defaults");
            std::fs::rename(path, &aside)?;
            Ok(T::default())
        }
        Err(e) => Err(e),
    }
}

/// Load a JSON record. `Ok(None)` when the file does not exist.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| RouterError::StateCorrupt {
            path: path.display().to_string(),
            message: e.to_string(),
        })
}

/// Replace a JSON record wholesale, atomically.
pub fn save<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(value)?;
    write_atomic(path, content.as_bytes())?;
    Ok(())
}

/// Append one record as a JSON line. Existing lines are never rewritten.
pub fn append_line<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    file.sync_data()?;
    Ok(())
}

/// Read every record of a JSON Lines log, skipping lines that fail to parse.
pub fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str(line) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(?path, error = %e, "Skipping unreadable archive line");
                None
            }
        })
        .collect())
}

fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".corrupt");
    path.with_file_name(name)
}

/// Write bytes atomically using temp file + rename.
fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    // Temp file must share the target's directory for rename to be atomic.
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let temp_path = parent.join(format!(
        ".{}.tmp.{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("state"),
        std::process::id()
    ));

    {
        let mut file = std::fs::File::create(&temp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
    }

    std::fs::rename(&temp_path, path)?;

    Ok(())
}
