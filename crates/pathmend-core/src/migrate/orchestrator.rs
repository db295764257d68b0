//! Reconciliation pipeline for one (catalog, album) pair.
//!
//! # Algorithm (Phased Mutation)
//!
//! 1. **Scanning**: snapshot the catalog, list the album plus every album a
//!    record points into or is assigned to. Optional consolidation of
//!    non-canonical folders copies objects only; sources stay in place.
//! 2. **Resolving**: find each record's folder. Ambiguous and unmatched
//!    records are set aside untouched.
//! 3. **Rewriting**: point every resolved record's references at its folder.
//!    Images referenced from a foreign album are copied into the record's
//!    album.
//! 4. **Verifying**: every rewritten reference must exist in a fresh listing.
//!    Records that fail are reverted and reported as mismatches.
//! 5. **Done**: commit the catalog once, with the version check, if applying
//!    and nothing is held back. Then delete consolidation sources that the
//!    stored catalog no longer references.
//!
//! The catalog is only mutated in memory until the single commit at the end.

use super::moves::{apply_moves, copy_phase, delete_sources, plan_consolidation, MoveStatus, ObjectMove};
use crate::catalog::{BusinessRecord, CatalogClient, CatalogSnapshot};
use crate::config::{RunConfig, Target};
use crate::corrections::CorrectionTable;
use crate::report::{Failure, MigrationReport, RecordNote, RunState};
use crate::resolver::{Confidence, Resolver};
use crate::rewrite::{referenced_albums, referenced_keys, rewrite, ResolvedTarget};
use crate::scanner::{duplicate_groups, AlbumListing, Scanner};
use crate::store::ObjectStore;
use crate::{PathmendError, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Switches for a run. The default is a dry run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Write objects and the catalog. Without it nothing in the store changes.
    pub apply: bool,
    /// Rename non-canonical folders whose canonical name is free.
    pub consolidate: bool,
    /// Upload the catalog even when some records failed verification.
    pub accept_mismatches: bool,
    pub concurrency: usize,
    pub sample_limit: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            apply: false,
            consolidate: false,
            accept_mismatches: false,
            concurrency: RunConfig::DEFAULT_CONCURRENCY,
            sample_limit: RunConfig::DEFAULT_SAMPLE_LIMIT,
        }
    }
}

/// A record that resolved to a folder.
struct Placement {
    index: usize,
    album: String,
    folder: String,
}

/// Drives reconciliation runs.
pub struct Orchestrator {
    store: Arc<dyn ObjectStore>,
    catalogs: CatalogClient,
    scanner: Scanner,
    corrections: CorrectionTable,
    options: RunOptions,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        catalogs: CatalogClient,
        corrections: CorrectionTable,
        options: RunOptions,
    ) -> Self {
        Self {
            scanner: Scanner::new(store.clone()),
            store,
            catalogs,
            corrections,
            options,
        }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Reconcile one target. Failures are recorded in the report, never returned.
    pub async fn run(&self, target: &Target) -> MigrationReport {
        let mut report = MigrationReport::new(
            &target.catalog,
            &target.album,
            self.options.sample_limit,
            self.options.apply,
        );
        info!(
            "Reconciling {} ({}) run {}",
            target,
            if self.options.apply { "apply" } else { "dry run" },
            report.run_id
        );

        if let Err(e) = self.run_phases(target, &mut report).await {
            warn!("{} failed while {}: {}", target, report.state, e);
            report.failure = Some(Failure {
                phase: report.state,
                message: e.to_string(),
                transport: e.is_transport(),
            });
            report.state = RunState::Failed;
        }
        report.finished_at = Some(chrono::Utc::now());
        info!("{}", report.summary());
        report
    }

    /// Reconcile targets in order. A store outage while scanning stops the
    /// remaining targets; any other failure only affects its own target.
    pub async fn run_all(&self, targets: &[Target]) -> Vec<MigrationReport> {
        let mut reports = Vec::with_capacity(targets.len());
        for (i, target) in targets.iter().enumerate() {
            let report = self.run(target).await;
            let abort = report
                .failure
                .as_ref()
                .is_some_and(|f| f.transport && f.phase == RunState::Scanning);
            reports.push(report);
            if abort {
                let skipped: Vec<String> = targets[i + 1..].iter().map(Target::to_string).collect();
                warn!(
                    "Store unreachable, skipping {} remaining target(s): {:?}",
                    skipped.len(),
                    skipped
                );
                break;
            }
        }
        reports
    }

    async fn run_phases(&self, target: &Target, report: &mut MigrationReport) -> Result<()> {
        // Phase 1: SCANNING
        let snapshot = self.catalogs.snapshot(&target.catalog).await?;
        report.total_records = snapshot.records.len();
        let mut listings = self.scan(target, &snapshot, report).await?;

        // Phase 2: RESOLVING
        transition(report, RunState::Resolving);
        let placements = self.resolve_all(target, &snapshot, &listings, report);

        // Phase 3: REWRITING
        transition(report, RunState::Rewriting);
        let mut records = snapshot.records.clone();
        let copies = self.rewrite_all(&snapshot, &placements, &listings, &mut records, report);
        if !copies.is_empty() {
            report.planned_moves.extend(copies.iter().cloned());
            if self.options.apply {
                let outcomes = apply_moves(self.store.as_ref(), &copies, self.options.concurrency).await;
                report.moves.extend(outcomes);
            }
        }

        // Phase 4: VERIFYING
        transition(report, RunState::Verifying);
        if self.options.apply {
            for (album, listing) in listings.iter_mut() {
                *listing = self.scanner.listing(album).await?;
            }
            // Consolidation sources are going away and must not satisfy verification
            for pending in report.moves.iter().filter(|o| o.status == MoveStatus::SourceKept) {
                if let Some(listing) = album_of(&pending.planned.src).and_then(|a| listings.get_mut(a)) {
                    listing.remove_key(&pending.planned.src);
                }
            }
        } else {
            for copy in &copies {
                if let Some(listing) = album_of(&copy.dst).and_then(|a| listings.get_mut(a)) {
                    listing.insert_key(&copy.dst);
                }
            }
        }
        self.verify_all(&snapshot, &placements, &listings, &mut records, report);
        self.report_orphans(target, &placements, &listings, report);

        // Phase 5: DONE
        transition(report, RunState::Done);
        let changed = snapshot
            .records
            .iter()
            .zip(&records)
            .filter(|(before, after)| before != after)
            .count();
        report.rewritten = changed;

        if !self.options.apply {
            info!("Dry run: {} record(s) would be rewritten", changed);
        } else if changed == 0 {
            info!("{} already consistent, nothing to upload", target.catalog);
        } else if !report.mismatch.is_empty() && !self.options.accept_mismatches {
            warn!(
                "Holding back {}: {} record(s) failed verification",
                target.catalog, report.mismatch.count
            );
        } else {
            self.catalogs.commit(&snapshot, &records).await?;
            report.uploaded = true;
        }

        if self.options.apply {
            let stored = if report.uploaded { &records } else { &snapshot.records };
            let keep: BTreeSet<String> = stored
                .iter()
                .flat_map(referenced_keys)
                .map(|(_, key)| key)
                .collect();
            delete_sources(self.store.as_ref(), &mut report.moves, &keep, self.options.concurrency).await;
        }
        Ok(())
    }

    async fn scan(
        &self,
        target: &Target,
        snapshot: &CatalogSnapshot,
        report: &mut MigrationReport,
    ) -> Result<BTreeMap<String, AlbumListing>> {
        let mut primary = self.scanner.listing(&target.album).await?;

        if self.options.consolidate {
            let moves = plan_consolidation(&primary, &self.corrections);
            if !moves.is_empty() {
                report.planned_moves.extend(moves.iter().cloned());
                let landed: Vec<ObjectMove> = if self.options.apply {
                    let outcomes = copy_phase(self.store.as_ref(), &moves, self.options.concurrency).await;
                    let landed = outcomes
                        .iter()
                        .filter(|o| o.copied())
                        .map(|o| o.planned.clone())
                        .collect();
                    report.moves.extend(outcomes);
                    landed
                } else {
                    moves.clone()
                };
                for mv in &landed {
                    primary.remove_key(&mv.src);
                    primary.insert_key(&mv.dst);
                }
            }
        }
        report.duplicate_groups = duplicate_groups(&primary, &self.corrections);
        if !report.duplicate_groups.is_empty() {
            warn!(
                "{} has {} duplicate folder group(s); they need review",
                target.album,
                report.duplicate_groups.len()
            );
        }

        let mut albums = BTreeSet::new();
        for record in &snapshot.records {
            if let Some(album) = self.assigned_album(target, record) {
                albums.insert(album.to_string());
            }
            albums.extend(referenced_albums(record));
        }
        albums.remove(&target.album);

        let mut listings = BTreeMap::new();
        listings.insert(target.album.clone(), primary);
        for album in albums {
            let listing = self.scanner.listing(&album).await?;
            listings.insert(album, listing);
        }
        Ok(listings)
    }

    fn resolve_all(
        &self,
        target: &Target,
        snapshot: &CatalogSnapshot,
        listings: &BTreeMap<String, AlbumListing>,
        report: &mut MigrationReport,
    ) -> Vec<Placement> {
        let resolver = Resolver::new(&self.corrections);
        let mut placements = Vec::new();

        for (index, record) in snapshot.records.iter().enumerate() {
            let album = self
                .assigned_album(target, record)
                .unwrap_or(&target.album)
                .to_string();
            let Some(listing) = listings.get(&album) else {
                report.missing.push(note(record, format!("album {} not scanned", album)));
                continue;
            };

            match resolver.resolve(record, listing) {
                Ok(resolution) => {
                    *report.confidence.entry(resolution.confidence).or_default() += 1;
                    match resolution.folder {
                        Some(folder) => {
                            debug!("{} -> {}/{} ({})", record.label(), album, folder, resolution.confidence);
                            placements.push(Placement { index, album, folder });
                        }
                        None => report
                            .missing
                            .push(note(record, format!("no folder in {}", album))),
                    }
                }
                Err(e @ PathmendError::AmbiguousMatch { .. }) => {
                    *report.confidence.entry(Confidence::None).or_default() += 1;
                    report.ambiguous.push(note(record, e.to_string()));
                }
                Err(e) => report.missing.push(note(record, e.to_string())),
            }
        }

        info!(
            "Resolved {}/{} records ({} missing, {} ambiguous)",
            placements.len(),
            snapshot.records.len(),
            report.missing.count,
            report.ambiguous.count
        );
        placements
    }

    /// Rewrite resolved records in place. Returns the copies needed to bring
    /// images from foreign albums into each record's album.
    fn rewrite_all(
        &self,
        snapshot: &CatalogSnapshot,
        placements: &[Placement],
        listings: &BTreeMap<String, AlbumListing>,
        records: &mut [BusinessRecord],
        report: &mut MigrationReport,
    ) -> Vec<ObjectMove> {
        let mut copies: Vec<ObjectMove> = Vec::new();
        let mut destinations = BTreeSet::new();

        for placement in placements {
            let original = &snapshot.records[placement.index];
            let foreign: Vec<String> = referenced_albums(original)
                .into_iter()
                .filter(|a| *a != placement.album)
                .collect();
            if !foreign.is_empty() {
                report.cross_album.push(note(
                    original,
                    format!("references {} but belongs to {}", foreign.join(", "), placement.album),
                ));
            }

            let outcome = rewrite(original, &ResolvedTarget::new(&placement.album, &placement.folder));
            for (field, raw) in &outcome.unparsed {
                report.unparsed.push(note(original, format!("{}: {:?}", field, raw)));
            }

            for change in &outcome.changes {
                if !change.cross_album || !destinations.insert(change.target_key.clone()) {
                    continue;
                }
                let target_listing = &listings[&placement.album];
                let source_present = album_of(&change.source_key)
                    .and_then(|a| listings.get(a))
                    .is_some_and(|l| l.contains_key(&change.source_key));
                if source_present && !target_listing.contains_key(&change.target_key) {
                    copies.push(ObjectMove::copy(&change.source_key, &change.target_key));
                }
            }

            for change in outcome.changes {
                report.changes.push(change);
            }
            records[placement.index] = outcome.record;
        }

        if !copies.is_empty() {
            info!("{} image(s) to copy in from foreign albums", copies.len());
        }
        copies
    }

    fn verify_all(
        &self,
        snapshot: &CatalogSnapshot,
        placements: &[Placement],
        listings: &BTreeMap<String, AlbumListing>,
        records: &mut [BusinessRecord],
        report: &mut MigrationReport,
    ) {
        for placement in placements {
            let record = &records[placement.index];
            let missing: Vec<String> = referenced_keys(record)
                .into_iter()
                .filter(|(_, key)| {
                    !album_of(key)
                        .and_then(|a| listings.get(a))
                        .is_some_and(|l| l.contains_key(key))
                })
                .map(|(field, key)| format!("{} -> {}", field, key))
                .collect();

            let original = &snapshot.records[placement.index];
            if missing.is_empty() {
                report.matched.push(note(
                    original,
                    format!("{}/{}", placement.album, placement.folder),
                ));
            } else {
                let err = PathmendError::Validation {
                    record: original.label(),
                    message: format!("missing objects: {}", missing.join(", ")),
                };
                debug!("{}", err);
                report.mismatch.push(note(original, err.to_string()));
                records[placement.index] = original.clone();
            }
        }
        info!(
            "Verified {} record(s): {} matched, {} mismatch",
            placements.len(),
            report.matched.count,
            report.mismatch.count
        );
    }

    fn report_orphans(
        &self,
        target: &Target,
        placements: &[Placement],
        listings: &BTreeMap<String, AlbumListing>,
        report: &mut MigrationReport,
    ) {
        let Some(listing) = listings.get(&target.album) else { return };
        let used: BTreeSet<&str> = placements
            .iter()
            .filter(|p| p.album == target.album)
            .map(|p| p.folder.as_str())
            .collect();
        for folder in listing.folders().filter(|f| !used.contains(f)) {
            report.orphaned_folders.push(folder.to_string());
        }
    }

    fn assigned_album<'r>(&'r self, target: &'r Target, record: &'r BusinessRecord) -> Option<&'r str> {
        self.corrections
            .album_override(record.external_id(), record.name())
            .filter(|album| *album != target.album)
    }
}

fn transition(report: &mut MigrationReport, next: RunState) {
    info!("{} -> {} ({})", report.state, next, report.catalog);
    report.state = next;
}

/// Album segment of an object key.
fn album_of(key: &str) -> Option<&str> {
    key.split_once('/').map(|(album, _)| album)
}

fn note(record: &BusinessRecord, detail: String) -> RecordNote {
    RecordNote {
        record: record.label(),
        external_id: record.external_id().map(str::to_string),
        detail,
    }
}
