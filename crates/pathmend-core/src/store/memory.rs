//! In-process object store with fault injection, used by scenario tests and
//! dry runs against captured fixtures.

use super::traits::{ObjectInfo, ObjectStore, ObjectVersion, PutCondition, StoredObject};
use crate::{PathmendError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Which operation a fault applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultOp {
    Get,
    Put,
    Delete,
    Copy,
}

/// Object store held in memory. Versions come from a monotonic counter.
#[derive(Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, (Bytes, u64)>>,
    next_version: AtomicU64,
    faults: RwLock<HashSet<(FaultOp, String)>>,
    unreachable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object unconditionally.
    pub fn insert(&self, key: impl Into<String>, body: impl Into<Bytes>) -> ObjectVersion {
        let version = self.bump();
        self.write_objects()
            .insert(key.into(), (body.into(), version));
        ObjectVersion(version.to_string())
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.read_objects().keys().cloned().collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read_objects().contains_key(key)
    }

    /// Body of `key`, if present.
    pub fn contents(&self, key: &str) -> Option<Bytes> {
        self.read_objects().get(key).map(|(b, _)| b.clone())
    }

    /// Make `op` on `key` fail with a non-retryable transport error.
    pub fn fail_on(&self, op: FaultOp, key: impl Into<String>) {
        self.faults
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert((op, key.into()));
    }

    /// Make every call fail as if the store could not be reached.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn bump(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn read_objects(&self) -> RwLockReadGuard<'_, BTreeMap<String, (Bytes, u64)>> {
        self.objects.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_objects(&self) -> RwLockWriteGuard<'_, BTreeMap<String, (Bytes, u64)>> {
        self.objects.write().unwrap_or_else(|e| e.into_inner())
    }

    fn check(&self, op: Option<FaultOp>, key: &str) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(PathmendError::fatal_transport(format!(
                "memory store unreachable ({})",
                key
            )));
        }
        if let Some(op) = op {
            let faults = self.faults.read().unwrap_or_else(|e| e.into_inner());
            if faults.contains(&(op, key.to_string())) {
                return Err(PathmendError::fatal_transport(format!(
                    "injected {:?} failure for {}",
                    op, key
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn describe(&self) -> String {
        "memory://".to_string()
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        self.check(None, prefix)?;
        Ok(self
            .read_objects()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .filter(|(k, _)| !k.ends_with('/'))
            .map(|(k, (body, _))| ObjectInfo {
                key: k.clone(),
                size: body.len() as u64,
            })
            .collect())
    }

    async fn get(&self, key: &str) -> Result<StoredObject> {
        self.check(Some(FaultOp::Get), key)?;
        self.read_objects()
            .get(key)
            .map(|(body, version)| StoredObject {
                body: body.clone(),
                version: ObjectVersion(version.to_string()),
            })
            .ok_or_else(|| PathmendError::NotFound {
                key: key.to_string(),
            })
    }

    async fn put(&self, key: &str, body: Bytes, condition: PutCondition) -> Result<ObjectVersion> {
        self.check(Some(FaultOp::Put), key)?;
        let mut objects = self.write_objects();
        let current = objects.get(key).map(|(_, v)| ObjectVersion(v.to_string()));
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
        let version = self.bump();
        objects.insert(key.to_string(), (body, version));
        Ok(ObjectVersion(version.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check(Some(FaultOp::Delete), key)?;
        match self.write_objects().remove(key) {
            Some(_) => Ok(()),
            None => Err(PathmendError::NotFound {
                key: key.to_string(),
            }),
        }
    }

    async fn copy(&self, src: &str, dst: &str) -> Result<()> {
        self.check(Some(FaultOp::Copy), src)?;
        let body = self
            .read_objects()
            .get(src)
            .map(|(b, _)| b.clone())
            .ok_or_else(|| PathmendError::NotFound {
                key: src.to_string(),
            })?;
        let version = self.bump();
        self.write_objects().insert(dst.to_string(), (body, version));
        Ok(())
    }
}
