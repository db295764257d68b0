//! Catalog document client.
//!
//! Catalogs are JSON arrays stored under the catalog prefix. Writes always
//! replace the whole document. [`CatalogClient::commit`] adds the
//! optimistic-concurrency check: the write only lands if the document is still
//! at the version it was read at.

use super::model::{BusinessRecord, CatalogSnapshot};
use crate::cdn::{CacheInvalidator, NoopInvalidator};
use crate::config::StoreConfig;
use crate::store::{ObjectStore, ObjectVersion, PutCondition};
use crate::{PathmendError, Result};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reads and writes catalog documents.
pub struct CatalogClient {
    store: Arc<dyn ObjectStore>,
    invalidator: Arc<dyn CacheInvalidator>,
    prefix: String,
}

impl CatalogClient {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            invalidator: Arc::new(NoopInvalidator),
            prefix: StoreConfig::DEFAULT_CATALOG_PREFIX.to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into().trim_matches('/').to_string();
        self
    }

    pub fn with_invalidator(mut self, invalidator: Arc<dyn CacheInvalidator>) -> Self {
        self.invalidator = invalidator;
        self
    }

    /// Object key of a catalog file.
    pub fn key(&self, catalog: &str) -> String {
        if self.prefix.is_empty() {
            catalog.to_string()
        } else {
            format!("{}/{}", self.prefix, catalog)
        }
    }

    /// Load every record of `catalog`.
    pub async fn fetch(&self, catalog: &str) -> Result<Vec<BusinessRecord>> {
        Ok(self.snapshot(catalog).await?.records)
    }

    /// Load `catalog` together with its stored version.
    pub async fn snapshot(&self, catalog: &str) -> Result<CatalogSnapshot> {
        let key = self.key(catalog);
        let object = self.store.get(&key).await?;
        let records = parse_catalog(&key, &object.body)?;
        debug!(
            "Loaded {} records from {} at version {}",
            records.len(),
            key,
            object.version
        );
        Ok(CatalogSnapshot {
            name: catalog.to_string(),
            records,
            version: Some(object.version),
        })
    }

    /// Like [`snapshot`](Self::snapshot), but a missing catalog yields an
    /// empty snapshot that [`commit`](Self::commit) will create.
    pub async fn snapshot_or_empty(&self, catalog: &str) -> Result<CatalogSnapshot> {
        match self.snapshot(catalog).await {
            Err(PathmendError::NotFound { .. }) => Ok(CatalogSnapshot {
                name: catalog.to_string(),
                records: Vec::new(),
                version: None,
            }),
            other => other,
        }
    }

    /// Replace `catalog` unconditionally.
    pub async fn store(&self, catalog: &str, records: &[BusinessRecord]) -> Result<ObjectVersion> {
        self.write(catalog, records, PutCondition::Overwrite).await
    }

    /// Replace the catalog a snapshot was taken from, failing with
    /// `PathmendError::Conflict` if it changed in the meantime.
    pub async fn commit(
        &self,
        snapshot: &CatalogSnapshot,
        records: &[BusinessRecord],
    ) -> Result<ObjectVersion> {
        let condition = match &snapshot.version {
            Some(version) => PutCondition::IfMatch(version.clone()),
            None => PutCondition::IfAbsent,
        };
        self.write(&snapshot.name, records, condition).await
    }

    async fn write(
        &self,
        catalog: &str,
        records: &[BusinessRecord],
        condition: PutCondition,
    ) -> Result<ObjectVersion> {
        let key = self.key(catalog);
        let body = serde_json::to_vec_pretty(records)?;
        let version = self.store.put(&key, Bytes::from(body), condition).await?;
        info!("Wrote {} records to {} ({})", records.len(), key, version);

        let paths = vec![format!("/{}", key)];
        if let Err(e) = self.invalidator.invalidate(&paths).await {
            warn!("CDN invalidation for {} failed: {}", key, e);
        }
        Ok(version)
    }
}

/// Parse a catalog document. Anything other than an array of objects is a
/// JSON error.
pub fn parse_catalog(key: &str, body: &[u8]) -> Result<Vec<BusinessRecord>> {
    serde_json::from_slice(body).map_err(|e| PathmendError::Json {
        message: format!("{} is not a catalog document: {}", key, e),
        source: Some(e),
    })
}
