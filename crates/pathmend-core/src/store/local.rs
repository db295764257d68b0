//! Filesystem backend: a local mirror of the bucket.
//!
//! Keys map to paths relative to the root. Versions are SHA-256 digests of
//! the content, so `IfMatch` behaves like an ETag check.

use super::traits::{ObjectInfo, ObjectStore, ObjectVersion, PutCondition, StoredObject};
use crate::persist::atomic_write_bytes;
use crate::{PathmendError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Object store rooted at a local directory.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(PathmendError::Config {
                message: format!("Local store root is not a directory: {}", root.display()),
            });
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        let mut any = false;
        for segment in key.split('/') {
            match segment {
                "" => continue,
                "." | ".." => {
                    return Err(PathmendError::Config {
                        message: format!("Key escapes the store root: {:?}", key),
                    })
                }
                s => {
                    path.push(s);
                    any = true;
                }
            }
        }
        if !any {
            return Err(PathmendError::Config {
                message: format!("Empty object key: {:?}", key),
            });
        }
        Ok(path)
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }

    fn current_version(path: &Path) -> Result<Option<ObjectVersion>> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(Some(content_version(&bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PathmendError::io_with_path(e, path)),
        }
    }

    /// Remove empty directories between `path` and the root.
    fn prune_empty_parents(&self, path: &Path) {
        let mut dir = path.parent();
        while let Some(d) = dir {
            if d == self.root || !d.starts_with(&self.root) {
                break;
            }
            if std::fs::remove_dir(d).is_err() {
                break;
            }
            dir = d.parent();
        }
    }
}

/// SHA-256 of the content, hex encoded.
pub fn content_version(bytes: &[u8]) -> ObjectVersion {
    ObjectVersion(hex::encode(Sha256::digest(bytes)))
}

fn not_found_or_io(e: std::io::Error, key: &str, path: &Path) -> PathmendError {
    if e.kind() == std::io::ErrorKind::NotFound {
        PathmendError::NotFound {
            key: key.to_string(),
        }
    } else {
        PathmendError::io_with_path(e, path)
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = entry.map_err(|e| PathmendError::Io {
                message: format!("Failed to walk {}: {}", self.root.display(), e),
                path: e.path().map(Path::to_path_buf),
                source: None,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            // In-flight atomic writes
            if entry.file_name().to_string_lossy().starts_with(".tmp") {
                continue;
            }
            let Some(key) = self.key_for(entry.path()) else { continue };
            if !key.starts_with(prefix) {
                continue;
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            objects.push(ObjectInfo { key, size });
        }
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        debug!("Listed {} objects under {}", objects.len(), prefix);
        Ok(objects)
    }

    async fn get(&self, key: &str) -> Result<StoredObject> {
        let path = self.path_for(key)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| not_found_or_io(e, key, &path))?;
        let version = content_version(&bytes);
        Ok(StoredObject {
            body: Bytes::from(bytes),
            version,
        })
    }

    async fn put(&self, key: &str, body: Bytes, condition: PutCondition) -> Result<ObjectVersion> {
        let path = self.path_for(key)?;
        let current = Self::current_version(&path)?;
        let allowed = match (&condition, &current) {
            (PutCondition::Overwrite, _) => true,
            (PutCondition::IfMatch(expected), Some(actual)) => expected == actual,
            (PutCondition::IfMatch(_), None) => false,
            (PutCondition::IfAbsent, existing) => existing.is_none(),
        };
        if !allowed {
            return Err(PathmendError::Conflict {
                key: key.to_string(),
            });
        }
        atomic_write_bytes(&path, &body, false)?;
        Ok(content_version(&body))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| not_found_or_io(e, key, &path))?;
        self.prune_empty_parents(&path);
        Ok(())
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<()> {
        let src_path = self.path_for(src)?;
        let dst_path = self.path_for(dst)?;
        if let Some(parent) = dst_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PathmendError::io_with_path(e, parent))?;
        }
        tokio::fs::copy(&src_path, &dst_path)
            .await
            .map_err(|e| not_found_or_io(e, src, &src_path))?;
        Ok(())
    }
}
