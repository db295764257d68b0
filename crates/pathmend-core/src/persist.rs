//! Atomic JSON files for settings, correction tables and reports.
//!
//! Writes go to a temp file in the target directory, are fsynced, optionally
//! back up the previous file as `.bak`, then rename over the target.

use crate::{PathmendError, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

/// Read and parse a JSON file.
///
/// Returns `None` if the file doesn't exist, or an error if parsing fails.
pub fn atomic_read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path).map_err(|e| PathmendError::Io {
        message: format!("Failed to read {}", path.display()),
        path: Some(path.to_path_buf()),
        source: Some(e),
    })?;

    let data: T = serde_json::from_str(&contents).map_err(|e| PathmendError::Json {
        message: format!("Failed to parse {}: {}", path.display(), e),
        source: Some(e),
    })?;

    Ok(Some(data))
}

/// Serialize `data` as pretty JSON and atomically replace `path`.
pub fn atomic_write_json<T: Serialize>(path: &Path, data: &T, keep_backup: bool) -> Result<()> {
    let serialized = serde_json::to_vec_pretty(data).map_err(|e| PathmendError::Json {
        message: format!("Failed to serialize data: {}", e),
        source: Some(e),
    })?;
    atomic_write_bytes(path, &serialized, keep_backup)
}

/// Atomically replace `path` with `bytes`.
pub fn atomic_write_bytes(path: &Path, bytes: &[u8], keep_backup: bool) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::env::current_dir()?,
    };
    if !parent.exists() {
        fs::create_dir_all(&parent).map_err(|e| PathmendError::Io {
            message: format!("Failed to create directory {}", parent.display()),
            path: Some(parent.clone()),
            source: Some(e),
        })?;
    }

    // Temp file must live in the same directory for the rename to be atomic
    let mut temp = tempfile::NamedTempFile::new_in(&parent)
        .map_err(|e| PathmendError::io_with_path(e, &parent))?;
    temp.write_all(bytes)
        .map_err(|e| PathmendError::io_with_path(e, temp.path()))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| PathmendError::io_with_path(e, temp.path()))?;

    if keep_backup && path.exists() {
        let backup_path = backup_path_for(path);
        if let Err(e) = fs::copy(path, &backup_path) {
            warn!("Failed to create backup {}: {}", backup_path.display(), e);
        } else {
            debug!("Created backup: {}", backup_path.display());
        }
    }

    temp.persist(path).map_err(|e| PathmendError::Io {
        message: format!("Failed to move temp file onto {}", path.display()),
        path: Some(path.to_path_buf()),
        source: Some(e.error),
    })?;

    debug!("Atomically wrote {}", path.display());
    Ok(())
}

fn backup_path_for(path: &Path) -> std::path::PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".bak");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct TestData {
        name: String,
        value: i32,
    }

    #[test]
    fn test_atomic_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("report.json");

        let data = TestData {
            name: "bars-dev".to_string(),
            value: 42,
        };

        atomic_write_json(&path, &data, false).unwrap();
        let read_back: Option<TestData> = atomic_read_json(&path).unwrap();
        assert_eq!(read_back, Some(data));
    }

    #[test]
    fn test_atomic_write_creates_backup() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("corrections.json");

        let first = TestData {
            name: "first".to_string(),
            value: 1,
        };
        let second = TestData {
            name: "second".to_string(),
            value: 2,
        };

        atomic_write_json(&path, &first, true).unwrap();
        atomic_write_json(&path, &second, true).unwrap();

        let backup: Option<TestData> =
            atomic_read_json(&temp_dir.path().join("corrections.json.bak")).unwrap();
        assert_eq!(backup, Some(first));
        let current: Option<TestData> = atomic_read_json(&path).unwrap();
        assert_eq!(current, Some(second));
    }

    #[test]
    fn test_atomic_read_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let result: Option<TestData> =
            atomic_read_json(&temp_dir.path().join("missing.json")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_atomic_read_malformed() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let result: Result<Option<TestData>> = atomic_read_json(&path);
        assert!(matches!(result, Err(PathmendError::Json { .. })));
    }

    #[test]
    fn test_atomic_write_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("dir").join("x.json");
        atomic_write_json(&path, &TestData { name: "n".into(), value: 1 }, false).unwrap();
        assert!(path.exists());
    }
}
