//! Declarative correction table.
//!
//! Known-bad folder names (truncated place ids, historical typos) and
//! legitimate cross-category placements are data, loaded once per run.

use crate::naming::normalize_segment;
use crate::persist::atomic_read_json;
use crate::{PathmendError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Correction table file contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionTable {
    /// Malformed folder -> canonical folder. Keys are either `{folder}` or
    /// `{album}/{folder}`; the album-scoped form wins.
    #[serde(default)]
    pub folders: BTreeMap<String, String>,
    /// Record external id or exact name -> album its images belong to.
    #[serde(default)]
    pub albums: BTreeMap<String, String>,
}

impl CorrectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file. A missing file yields an empty table.
    pub fn load(path: &Path) -> Result<Self> {
        let table: Option<CorrectionTable> = atomic_read_json(path).map_err(|e| {
            PathmendError::Config {
                message: format!("Invalid correction table {}: {}", path.display(), e),
            }
        })?;
        let table = table.unwrap_or_default();
        table.validate()?;
        info!(
            "Loaded correction table {}: {} folder corrections, {} album overrides",
            path.display(),
            table.folders.len(),
            table.albums.len()
        );
        Ok(table)
    }

    /// Canonical targets must themselves be canonical, otherwise they would be
    /// rewritten again on the next pass.
    pub fn validate(&self) -> Result<()> {
        for (from, to) in &self.folders {
            if to.is_empty() || to.contains('/') {
                return Err(PathmendError::Config {
                    message: format!("Correction for {:?} has invalid target {:?}", from, to),
                });
            }
            if normalize_segment(to) != *to {
                return Err(PathmendError::Config {
                    message: format!(
                        "Correction target {:?} is not canonical (expected {:?})",
                        to,
                        normalize_segment(to)
                    ),
                });
            }
        }
        for (record, album) in &self.albums {
            if album.trim().is_empty() || album.contains('/') {
                return Err(PathmendError::Config {
                    message: format!("Album override for {:?} is invalid: {:?}", record, album),
                });
            }
        }
        Ok(())
    }

    pub fn with_folder(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.folders.insert(from.into(), to.into());
        self
    }

    pub fn with_album(mut self, record: impl Into<String>, album: impl Into<String>) -> Self {
        self.albums.insert(record.into(), album.into());
        self
    }

    /// Explicit correction for a raw folder inside `album`, if any.
    pub fn folder_correction(&self, album: &str, folder: &str) -> Option<&str> {
        self.folders
            .get(&format!("{}/{}", album, folder))
            .or_else(|| self.folders.get(folder))
            .map(String::as_str)
    }

    /// Canonical form of a listed folder: the correction if one exists,
    /// otherwise the normalized name.
    pub fn canonical_folder(&self, album: &str, folder: &str) -> String {
        match self.folder_correction(album, folder) {
            Some(corrected) => corrected.to_string(),
            None => normalize_segment(folder),
        }
    }

    /// Album override for a record, looked up by external id then by name.
    pub fn album_override(&self, external_id: Option<&str>, name: &str) -> Option<&str> {
        external_id
            .and_then(|id| self.albums.get(id))
            .or_else(|| self.albums.get(name))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty() && self.albums.is_empty()
    }
}
