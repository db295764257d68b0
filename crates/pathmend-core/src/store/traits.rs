//! Object store trait and types.

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Opaque version of a stored object (ETag for S3, content hash locally).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectVersion(pub String);

impl std::fmt::Display for ObjectVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One listed object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Full key, unescaped.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
}

/// A fetched object.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Bytes,
    pub version: ObjectVersion,
}

/// Precondition for a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutCondition {
    /// Unconditional replacement.
    Overwrite,
    /// Only replace the object if it is still at this version.
    IfMatch(ObjectVersion),
    /// Only create; fail if the key exists.
    IfAbsent,
}

/// Key/blob store holding albums and catalog documents.
///
/// Keys are store-native: unescaped, may contain spaces and Unicode.
/// Implementations map "object missing" to `PathmendError::NotFound`, failed
/// preconditions to `PathmendError::Conflict` and store or network failures
/// to `PathmendError::Transport`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Short description for logs, e.g. `s3://bucket`.
    fn describe(&self) -> String;

    /// All objects whose key starts with `prefix`, following pagination.
    /// An empty result is not an error.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>>;

    async fn get(&self, key: &str) -> Result<StoredObject>;

    async fn put(&self, key: &str, body: Bytes, condition: PutCondition) -> Result<ObjectVersion>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Server-side copy of `src` to `dst`, overwriting `dst`.
    async fn copy(&self, src: &str, dst: &str) -> Result<()>;
}

/// Content type to store an object with, from its extension.
pub fn content_type_for(key: &str) -> &'static str {
    let ext = key.rsplit('.').next().unwrap_or("").to_ascii_lowercase();
    match ext.as_str() {
        "json" => "application/json",
        "webp" => "image/webp",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}
