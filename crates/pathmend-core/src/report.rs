//! Run reports.
//!
//! Every bucket keeps a full count and a bounded sample for manual review.
//! Reports are only written to disk on request.

use crate::migrate::{MoveOutcome, ObjectMove};
use crate::persist::atomic_write_json;
use crate::resolver::Confidence;
use crate::rewrite::RefChange;
use crate::scanner::DuplicateGroup;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

/// Pipeline state of a reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Scanning,
    Resolving,
    Rewriting,
    Verifying,
    Done,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Scanning => "scanning",
            RunState::Resolving => "resolving",
            RunState::Rewriting => "rewriting",
            RunState::Verifying => "verifying",
            RunState::Done => "done",
            RunState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Count plus the first few entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sampled<T> {
    pub count: usize,
    pub samples: Vec<T>,
    #[serde(skip)]
    limit: usize,
}

impl<T> Sampled<T> {
    pub fn new(limit: usize) -> Self {
        Self {
            count: 0,
            samples: Vec::new(),
            limit,
        }
    }

    pub fn push(&mut self, item: T) {
        self.count += 1;
        if self.samples.len() < self.limit {
            self.samples.push(item);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// A record as it appears in a report bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordNote {
    pub record: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub detail: String,
}

/// Why a run ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// State the run was in when it failed.
    pub phase: RunState,
    pub message: String,
    /// The store could not be reached.
    pub transport: bool,
}

/// Result of reconciling one (catalog, album) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    pub run_id: Uuid,
    pub catalog: String,
    pub album: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
    pub applied: bool,
    pub total_records: usize,
    pub confidence: BTreeMap<Confidence, usize>,
    pub matched: Sampled<RecordNote>,
    pub mismatch: Sampled<RecordNote>,
    pub missing: Sampled<RecordNote>,
    pub ambiguous: Sampled<RecordNote>,
    pub cross_album: Sampled<RecordNote>,
    pub unparsed: Sampled<RecordNote>,
    /// Records whose references changed and survived verification.
    pub rewritten: usize,
    pub changes: Sampled<RefChange>,
    /// Listed folders no record resolved to.
    pub orphaned_folders: Sampled<String>,
    pub duplicate_groups: Vec<DuplicateGroup>,
    pub planned_moves: Vec<ObjectMove>,
    pub moves: Vec<MoveOutcome>,
    pub uploaded: bool,
}

impl MigrationReport {
    pub fn new(catalog: &str, album: &str, sample_limit: usize, applied: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            catalog: catalog.to_string(),
            album: album.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            state: RunState::Scanning,
            failure: None,
            applied,
            total_records: 0,
            confidence: BTreeMap::new(),
            matched: Sampled::new(sample_limit),
            mismatch: Sampled::new(sample_limit),
            missing: Sampled::new(sample_limit),
            ambiguous: Sampled::new(sample_limit),
            cross_album: Sampled::new(sample_limit),
            unparsed: Sampled::new(sample_limit),
            rewritten: 0,
            changes: Sampled::new(sample_limit),
            orphaned_folders: Sampled::new(sample_limit),
            duplicate_groups: Vec::new(),
            planned_moves: Vec::new(),
            moves: Vec::new(),
            uploaded: false,
        }
    }

    /// Mismatched, missing or ambiguous records need a human.
    pub fn needs_review(&self) -> bool {
        !self.mismatch.is_empty() || !self.missing.is_empty() || !self.ambiguous.is_empty()
    }

    pub fn failed(&self) -> bool {
        self.state == RunState::Failed
    }

    /// Fraction of records that matched, 1.0 for an empty catalog.
    pub fn match_rate(&self) -> f64 {
        if self.total_records == 0 {
            1.0
        } else {
            self.matched.count as f64 / self.total_records as f64
        }
    }

    /// One-line summary for logs and terminal output.
    pub fn summary(&self) -> String {
        format!(
            "{} <-> {}: {} | {} records, {} matched ({:.1}%), {} mismatch, {} missing, {} ambiguous, {} cross-album, {} rewritten, {} orphaned folders{}",
            self.catalog,
            self.album,
            self.state,
            self.total_records,
            self.matched.count,
            self.match_rate() * 100.0,
            self.mismatch.count,
            self.missing.count,
            self.ambiguous.count,
            self.cross_album.count,
            self.rewritten,
            self.orphaned_folders.count,
            if self.uploaded { ", catalog uploaded" } else { "" }
        )
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        atomic_write_json(path, self, false)
    }
}

/// Process exit code for a set of runs: 1 if any failed, 2 if any needs
/// review, 0 otherwise.
pub fn exit_code(reports: &[MigrationReport]) -> i32 {
    if reports.iter().any(MigrationReport::failed) {
        1
    } else if reports.iter().any(MigrationReport::needs_review) {
        2
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn note(name: &str) -> RecordNote {
        RecordNote {
            record: name.to_string(),
            external_id: None,
            detail: String::new(),
        }
    }

    #[test]
    fn test_sampled_bounds_samples_not_count() {
        let mut bucket = Sampled::new(2);
        for i in 0..5 {
            bucket.push(i);
        }
        assert_eq!(bucket.count, 5);
        assert_eq!(bucket.samples, vec![0, 1]);
    }

    #[test]
    fn test_exit_code() {
        let mut clean = MigrationReport::new("bars-dev.json", "bar-image-dev", 10, false);
        clean.state = RunState::Done;
        assert_eq!(exit_code(&[clean.clone()]), 0);

        let mut review = clean.clone();
        review.missing.push(note("Bali Beer Cycle"));
        assert_eq!(exit_code(&[clean.clone(), review.clone()]), 2);

        let mut failed = clean.clone();
        failed.state = RunState::Failed;
        assert_eq!(exit_code(&[review, failed]), 1);
    }

    #[test]
    fn test_write_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.json");
        let mut report = MigrationReport::new("bars-dev.json", "bar-image-dev", 10, false);
        report.total_records = 1;
        report.matched.push(note("The Shady Fox"));
        report.confidence.insert(Confidence::High, 1);
        report.write_json(&path).unwrap();

        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["matched"]["count"], 1);
        assert_eq!(json["confidence"]["high"], 1);
        assert_eq!(json["state"], "scanning");
    }
}
