//! Environment promotion (dev -> prod).
//!
//! Copies the images a source catalog references into the destination album,
//! points the records at the destination album and merges them into the
//! destination catalog. Destination records are matched by external id, then
//! by exact name; unmatched records are appended.
//!
//! The destination catalog is only committed once every promoted reference
//! exists in a fresh listing of the destination album. A missing source image
//! stops the apply before anything is copied.

use super::moves::{apply_moves, MoveOutcome, ObjectMove};
use crate::catalog::{BusinessRecord, CatalogClient};
use crate::config::{RunConfig, Target};
use crate::references::ImageRef;
use crate::scanner::Scanner;
use crate::store::ObjectStore;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionReport {
    pub run_id: Uuid,
    pub source: Target,
    pub dest: Target,
    pub started_at: DateTime<Utc>,
    pub applied: bool,
    pub promoted: usize,
    pub replaced: usize,
    pub appended: usize,
    /// Referenced images already present in the destination album.
    pub already_present: usize,
    /// Referenced images missing from the source album.
    pub missing_sources: Vec<String>,
    pub planned_copies: Vec<ObjectMove>,
    pub copies: Vec<MoveOutcome>,
    /// Promoted references absent from the destination album after copying.
    #[serde(default)]
    pub unverified: Vec<String>,
    pub committed: bool,
}

impl PromotionReport {
    pub fn summary(&self) -> String {
        format!(
            "{} -> {}: {} records ({} replaced, {} appended), {} image(s) to copy, {} already present, {} missing, {} unverified{}",
            self.source,
            self.dest,
            self.promoted,
            self.replaced,
            self.appended,
            self.planned_copies.len(),
            self.already_present,
            self.missing_sources.len(),
            self.unverified.len(),
            if self.committed { ", catalog committed" } else { "" }
        )
    }
}

/// Promotes catalogs and their images between environments.
pub struct Promoter {
    store: Arc<dyn ObjectStore>,
    catalogs: CatalogClient,
    scanner: Scanner,
    apply: bool,
    concurrency: usize,
}

impl Promoter {
    pub fn new(store: Arc<dyn ObjectStore>, catalogs: CatalogClient) -> Self {
        Self {
            scanner: Scanner::new(store.clone()),
            store,
            catalogs,
            apply: false,
            concurrency: RunConfig::DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_apply(mut self, apply: bool) -> Self {
        self.apply = apply;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub async fn promote(&self, source: &Target, dest: &Target) -> Result<PromotionReport> {
        let mut report = PromotionReport {
            run_id: Uuid::new_v4(),
            source: source.clone(),
            dest: dest.clone(),
            started_at: Utc::now(),
            applied: self.apply,
            promoted: 0,
            replaced: 0,
            appended: 0,
            already_present: 0,
            missing_sources: Vec::new(),
            planned_copies: Vec::new(),
            copies: Vec::new(),
            unverified: Vec::new(),
            committed: false,
        };

        // Phase 1: GATHER
        let source_catalog = self.catalogs.snapshot(&source.catalog).await?;
        let dest_catalog = self.catalogs.snapshot_or_empty(&dest.catalog).await?;
        let source_listing = self.scanner.listing(&source.album).await?;
        let dest_listing = self.scanner.listing(&dest.album).await?;

        // Phase 2: PLAN
        let mut promoted_keys = BTreeSet::new();
        let mut promoted = Vec::with_capacity(source_catalog.records.len());
        for record in &source_catalog.records {
            let mut out = record.clone();
            for (field, raw) in record.references() {
                let Some(r) = ImageRef::parse(raw) else { continue };
                if r.album() != source.album {
                    continue;
                }
                let src = r.object_key();
                let dst = format!("{}/{}/{}", dest.album, r.folder(), r.filename());
                if promoted_keys.insert(dst.clone()) {
                    if dest_listing.contains_key(&dst) {
                        report.already_present += 1;
                    } else if source_listing.contains_key(&src) {
                        report.planned_copies.push(ObjectMove::copy(src, dst));
                    } else {
                        report.missing_sources.push(src);
                    }
                }
                out.set_reference(field, r.with_location(&dest.album, r.folder()));
            }
            promoted.push(out);
        }

        let mut merged = dest_catalog.records.clone();
        for record in promoted {
            match find_match(&merged, &record) {
                Some(i) => {
                    merged[i] = record;
                    report.replaced += 1;
                }
                None => {
                    merged.push(record);
                    report.appended += 1;
                }
            }
            report.promoted += 1;
        }

        if !self.apply {
            info!("{}", report.summary());
            return Ok(report);
        }
        if !report.missing_sources.is_empty() {
            warn!(
                "Not promoting into {}: {} source image(s) missing",
                dest.catalog,
                report.missing_sources.len()
            );
            info!("{}", report.summary());
            return Ok(report);
        }

        // Phase 3: COPY
        report.copies = apply_moves(self.store.as_ref(), &report.planned_copies, self.concurrency).await;

        // Phase 4: VERIFY
        let landed = self.scanner.listing(&dest.album).await?;
        report.unverified = promoted_keys
            .into_iter()
            .filter(|key| !landed.contains_key(key))
            .collect();

        // Phase 5: COMMIT
        if report.unverified.is_empty() {
            self.catalogs.commit(&dest_catalog, &merged).await?;
            report.committed = true;
        } else {
            warn!(
                "Not committing {}: {} promoted reference(s) missing from {}",
                dest.catalog,
                report.unverified.len(),
                dest.album
            );
        }

        info!("{}", report.summary());
        Ok(report)
    }
}

/// Position of the destination record `record` replaces: same external id,
/// otherwise same non-empty name.
fn find_match(records: &[BusinessRecord], record: &BusinessRecord) -> Option<usize> {
    if let Some(id) = record.external_id() {
        if let Some(i) = records.iter().position(|r| r.external_id() == Some(id)) {
            return Some(i);
        }
    }
    let name = record.name();
    if name.is_empty() {
        return None;
    }
    records.iter().position(|r| r.name() == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_match_prefers_external_id() {
        let dest = vec![
            BusinessRecord::new("Miss Fish", None, &[], None),
            BusinessRecord::new("Miss Fish Bali", Some("ChIJmissfish0000000012"), &[], None),
        ];
        let incoming = BusinessRecord::new("Miss Fish", Some("ChIJmissfish0000000012"), &[], None);
        assert_eq!(find_match(&dest, &incoming), Some(1));

        let by_name = BusinessRecord::new("Miss Fish", Some("ChIJother"), &[], None);
        assert_eq!(find_match(&dest, &by_name), Some(0));

        let unnamed = BusinessRecord::new("", None, &[], None);
        assert_eq!(find_match(&dest, &unnamed), None);
    }
}
