//! Object moves between folders and albums.
//!
//! A move is a server-side copy followed by a delete of the source. Moves run
//! with bounded parallelism; outcomes are returned in plan order.
//!
//! Consolidation splits a move in two: [`copy_phase`] runs before the catalog
//! is committed, [`delete_sources`] afterwards, so a source key the stored
//! catalog still references is never removed.

use crate::config::RunConfig;
use crate::corrections::CorrectionTable;
use crate::scanner::AlbumListing;
use crate::store::ObjectStore;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// One planned object operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMove {
    pub src: String,
    pub dst: String,
    /// Delete `src` after a successful copy. `false` for plain copies.
    pub delete_source: bool,
}

impl ObjectMove {
    pub fn relocate(src: impl Into<String>, dst: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            delete_source: true,
        }
    }

    pub fn copy(src: impl Into<String>, dst: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            delete_source: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum MoveStatus {
    /// Copied, and the source deleted when requested.
    Done,
    /// Copy failed; the source is untouched.
    CopyFailed(String),
    /// Copy succeeded but the source could not be deleted.
    DeleteFailed(String),
    /// Copied; the source is still in place, either pending deletion or
    /// because a stored catalog still references it.
    SourceKept,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOutcome {
    #[serde(flatten)]
    pub planned: ObjectMove,
    #[serde(flatten)]
    pub status: MoveStatus,
}

impl MoveOutcome {
    /// Whether the destination object now exists.
    pub fn copied(&self) -> bool {
        !matches!(self.status, MoveStatus::CopyFailed(_))
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.status, MoveStatus::Done | MoveStatus::SourceKept)
    }
}

/// Moves that rename non-canonical folders to their canonical form.
///
/// A folder is only moved when its canonical name is free: not already listed
/// and not claimed by another folder. Duplicate groups are left for review.
pub fn plan_consolidation(listing: &AlbumListing, corrections: &CorrectionTable) -> Vec<ObjectMove> {
    let album = listing.album();
    let mut claims: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for folder in listing.folders() {
        claims
            .entry(corrections.canonical_folder(album, folder))
            .or_default()
            .push(folder);
    }

    let mut moves = Vec::new();
    for (canonical, folders) in &claims {
        let [folder] = folders.as_slice() else {
            debug!("Not consolidating {:?} into {}: shared canonical name", folders, canonical);
            continue;
        };
        if canonical.is_empty() || canonical == folder || listing.has_folder(canonical) {
            continue;
        }
        for file in listing.files(folder) {
            moves.push(ObjectMove::relocate(
                format!("{}/{}/{}", album, folder, file),
                format!("{}/{}/{}", album, canonical, file),
            ));
        }
    }
    info!("Planned {} object moves in {}", moves.len(), album);
    moves
}

/// Run `moves` with at most `concurrency` in flight.
pub async fn apply_moves(
    store: &dyn ObjectStore,
    moves: &[ObjectMove],
    concurrency: usize,
) -> Vec<MoveOutcome> {
    let concurrency = concurrency.clamp(1, RunConfig::MAX_CONCURRENCY);
    let mut outcomes: Vec<(usize, MoveOutcome)> = stream::iter(moves.iter().enumerate())
        .map(|(index, planned)| async move { (index, apply_one(store, planned).await) })
        .buffer_unordered(concurrency)
        .collect()
        .await;
    outcomes.sort_by_key(|(index, _)| *index);

    let failed = outcomes.iter().filter(|(_, o)| !o.succeeded()).count();
    if failed > 0 {
        warn!("{} of {} object moves failed", failed, moves.len());
    } else if !moves.is_empty() {
        info!("Applied {} object moves", moves.len());
    }
    outcomes.into_iter().map(|(_, o)| o).collect()
}

/// Copy half of `moves`. Relocations come back as [`MoveStatus::SourceKept`]
/// until [`delete_sources`] runs.
pub async fn copy_phase(
    store: &dyn ObjectStore,
    moves: &[ObjectMove],
    concurrency: usize,
) -> Vec<MoveOutcome> {
    let copies: Vec<ObjectMove> = moves
        .iter()
        .map(|m| ObjectMove::copy(&m.src, &m.dst))
        .collect();
    apply_moves(store, &copies, concurrency)
        .await
        .into_iter()
        .zip(moves)
        .map(|(outcome, planned)| MoveOutcome {
            status: match outcome.status {
                MoveStatus::Done if planned.delete_source => MoveStatus::SourceKept,
                other => other,
            },
            planned: planned.clone(),
        })
        .collect()
}

/// Delete the sources of copied relocations, except keys in `keep`.
pub async fn delete_sources(
    store: &dyn ObjectStore,
    outcomes: &mut [MoveOutcome],
    keep: &BTreeSet<String>,
    concurrency: usize,
) {
    let concurrency = concurrency.clamp(1, RunConfig::MAX_CONCURRENCY);
    let pending: Vec<(usize, String)> = outcomes
        .iter()
        .enumerate()
        .filter(|(_, o)| o.status == MoveStatus::SourceKept && o.planned.delete_source)
        .filter(|(_, o)| {
            let referenced = keep.contains(&o.planned.src);
            if referenced {
                info!("Keeping {}: still referenced by the stored catalog", o.planned.src);
            }
            !referenced
        })
        .map(|(i, o)| (i, o.planned.src.clone()))
        .collect();

    let results: Vec<(usize, MoveStatus)> = stream::iter(pending)
        .map(|(index, src)| async move {
            let status = match store.delete(&src).await {
                Ok(()) => MoveStatus::Done,
                Err(e) => {
                    warn!("Delete of {} after copy failed: {}", src, e);
                    MoveStatus::DeleteFailed(e.to_string())
                }
            };
            (index, status)
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;
    for (index, status) in results {
        outcomes[index].status = status;
    }
}

async fn apply_one(store: &dyn ObjectStore, planned: &ObjectMove) -> MoveOutcome {
    let status = match store.copy(&planned.src, &planned.dst).await {
        Err(e) => {
            warn!("Copy {} -> {} failed: {}", planned.src, planned.dst, e);
            MoveStatus::CopyFailed(e.to_string())
        }
        Ok(()) if !planned.delete_source => MoveStatus::Done,
        Ok(()) => match store.delete(&planned.src).await {
            Ok(()) => MoveStatus::Done,
            Err(e) => {
                warn!("Delete of {} after copy failed: {}", planned.src, e);
                MoveStatus::DeleteFailed(e.to_string())
            }
        },
    };
    debug!("{} -> {}: {:?}", planned.src, planned.dst, status);
    MoveOutcome {
        planned: planned.clone(),
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_copy_phase_then_delete_respects_keep() {
        let store = MemoryStore::new();
        store.insert("bar-image-dev/The Shady Fox/1.webp", "a");
        store.insert("bar-image-dev/The Shady Fox/2.webp", "b");
        let moves = vec![
            ObjectMove::relocate("bar-image-dev/The Shady Fox/1.webp", "bar-image-dev/the-shady-fox/1.webp"),
            ObjectMove::relocate("bar-image-dev/The Shady Fox/2.webp", "bar-image-dev/the-shady-fox/2.webp"),
        ];

        let mut outcomes = copy_phase(&store, &moves, 2).await;
        assert!(outcomes.iter().all(|o| o.status == MoveStatus::SourceKept));
        assert_eq!(outcomes[0].planned, moves[0]);
        assert!(store.contains("bar-image-dev/The Shady Fox/1.webp"));
        assert!(store.contains("bar-image-dev/the-shady-fox/2.webp"));

        let keep = BTreeSet::from(["bar-image-dev/The Shady Fox/2.webp".to_string()]);
        delete_sources(&store, &mut outcomes, &keep, 2).await;
        assert_eq!(outcomes[0].status, MoveStatus::Done);
        assert_eq!(outcomes[1].status, MoveStatus::SourceKept);
        assert!(!store.contains("bar-image-dev/The Shady Fox/1.webp"));
        assert!(store.contains("bar-image-dev/The Shady Fox/2.webp"));
    }

    #[test]
    fn test_plan_skips_duplicates_and_taken_names() {
        let listing = AlbumListing::from_keys(
            "bar-image-dev",
            [
                "bar-image-dev/Honeycomb Hookah & Eatery/a.webp",
                "bar-image-dev/honeycomb-hookah-eatery/a.webp",
                "bar-image-dev/The Shady Fox/1.webp",
                "bar-image-dev/The Shady Fox/2.webp",
                "bar-image-dev/platonic/1.webp",
            ],
        );
        let moves = plan_consolidation(&listing, &CorrectionTable::new());
        assert_eq!(
            moves,
            vec![
                ObjectMove::relocate("bar-image-dev/The Shady Fox/1.webp", "bar-image-dev/the-shady-fox/1.webp"),
                ObjectMove::relocate("bar-image-dev/The Shady Fox/2.webp", "bar-image-dev/the-shady-fox/2.webp"),
            ]
        );
    }

    #[test]
    fn test_plan_uses_corrections() {
        let listing = AlbumListing::from_keys("bar-image-dev", ["bar-image-dev/single-fin-bali_ChIJ0aNPQ/1.webp"]);
        let table = CorrectionTable::new().with_folder("single-fin-bali_ChIJ0aNPQ", "single-fin-bali");
        let moves = plan_consolidation(&listing, &table);
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].dst, "bar-image-dev/single-fin-bali/1.webp");
    }

    #[test]
    fn test_outcome_serializes_flat() {
        let outcome = MoveOutcome {
            planned: ObjectMove::copy("a/b/c", "d/b/c"),
            status: MoveStatus::CopyFailed("boom".into()),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["src"], "a/b/c");
        assert_eq!(json["status"], "copy_failed");
        assert_eq!(json["error"], "boom");
    }
}
