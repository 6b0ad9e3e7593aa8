//! Utility functions for the alpha shortlist services.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result, ResultExt};

/// Write `bytes` to `path` atomically.
///
/// The content goes to a sibling `*.tmp` file first, is flushed to disk, and
/// is then renamed over the destination, so readers never observe a partial
/// file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create directory {}", parent.display()))?;
        }
    }

    let tmp = temp_sibling(path);
    {
        let mut file = fs::File::create(&tmp)
            .context(format!("Failed to create {}", tmp.display()))?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    fs::rename(&tmp, path).context(format!("Failed to move {} into place", tmp.display()))?;
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes)
}

/// Read a JSON document. Returns `Ok(None)` when the file does not exist.
pub fn read_json_opt<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let content =
        fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
    let value = serde_json::from_str(&content)
        .map_err(Error::from)
        .context(format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", std::process::id()));
    path.with_file_name(name)
}

/// Round to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
