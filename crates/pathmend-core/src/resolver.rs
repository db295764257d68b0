//! Record to folder resolution.
//!
//! Tiers are tried in priority order and the first one that yields a result
//! wins:
//!
//! 1. **Exact**: the folder derived from the record's external id is listed.
//! 2. **High**: exactly one listed folder has the canonical form of the
//!    record's name, or of a folder the record already references.
//! 3. **Medium**: exactly one listed folder name contains the external id.
//! 4. **None**: nothing matched.
//!
//! Two or more candidates within a tier is an `AmbiguousMatch` error. The
//! resolver never picks one of several equally plausible folders.

use crate::catalog::BusinessRecord;
use crate::corrections::CorrectionTable;
use crate::naming::{id_folder, normalize_segment};
use crate::references::ImageRef;
use crate::scanner::AlbumListing;
use crate::{PathmendError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How the folder was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Exact,
    High,
    Medium,
    None,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Exact => "exact",
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::None => "none",
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of resolving one record against one album listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Listed folder name, verbatim.
    pub folder: Option<String>,
    pub confidence: Confidence,
}

impl Resolution {
    fn found(folder: &str, confidence: Confidence) -> Self {
        Self {
            folder: Some(folder.to_string()),
            confidence,
        }
    }

    pub fn none() -> Self {
        Self {
            folder: None,
            confidence: Confidence::None,
        }
    }
}

/// Resolver bound to a correction table.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    corrections: &'a CorrectionTable,
}

impl<'a> Resolver<'a> {
    pub fn new(corrections: &'a CorrectionTable) -> Self {
        Self { corrections }
    }

    /// Find the folder in `listing` holding `record`'s images.
    pub fn resolve(&self, record: &BusinessRecord, listing: &AlbumListing) -> Result<Resolution> {
        if let Some(id) = record.external_id() {
            let folder = id_folder(id);
            if !folder.is_empty() && listing.has_folder(&folder) {
                return Ok(Resolution::found(&folder, Confidence::Exact));
            }
        }

        let keys = self.canonical_keys(record);
        if !keys.is_empty() {
            let candidates: Vec<&str> = listing
                .folders()
                .filter(|f| keys.contains(&self.corrections.canonical_folder(listing.album(), f)))
                .collect();
            if let Some(folder) = single(record, candidates)? {
                return Ok(Resolution::found(folder, Confidence::High));
            }
        }

        if let Some(id) = record.external_id() {
            let candidates: Vec<&str> = listing.folders().filter(|f| f.contains(id)).collect();
            if let Some(folder) = single(record, candidates)? {
                return Ok(Resolution::found(folder, Confidence::Medium));
            }
        }

        Ok(Resolution::none())
    }

    /// Canonical forms the record's folder may go by: its normalized name and
    /// the canonical form of every folder it currently references.
    fn canonical_keys(&self, record: &BusinessRecord) -> BTreeSet<String> {
        let mut keys = BTreeSet::new();
        let from_name = normalize_segment(record.name());
        if !from_name.is_empty() {
            keys.insert(from_name);
        }
        for (_, raw) in record.references() {
            if let Some(r) = ImageRef::parse(raw) {
                let canonical = self.corrections.canonical_folder(r.album(), r.folder());
                if !canonical.is_empty() {
                    keys.insert(canonical);
                }
            }
        }
        keys
    }
}

/// Resolve without a correction table.
pub fn resolve(record: &BusinessRecord, listing: &AlbumListing) -> Result<Resolution> {
    Resolver::new(&CorrectionTable::default()).resolve(record, listing)
}

fn single<'l>(record: &BusinessRecord, candidates: Vec<&'l str>) -> Result<Option<&'l str>> {
    match candidates.as_slice() {
        [] => Ok(None),
        [one] => Ok(Some(*one)),
        _ => Err(PathmendError::AmbiguousMatch {
            record: record.label(),
            candidates: candidates.iter().map(|c| c.to_string()).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLACE_ID: &str = "ChIJj0tRmpH0i0RP5hAbCd12";

    fn listing(keys: &[&str]) -> AlbumListing {
        AlbumListing::from_keys("bar-image-dev", keys)
    }

    #[test]
    fn test_exact_by_external_id_folder() {
        let l = listing(&[&format!("bar-image-dev/{}/1.webp", PLACE_ID), "bar-image-dev/la-baracca/1.webp"]);
        let record = BusinessRecord::new("La Baracca", Some(PLACE_ID), &[], None);
        let res = resolve(&record, &l).unwrap();
        assert_eq!(res.confidence, Confidence::Exact);
        assert_eq!(res.folder.as_deref(), Some(PLACE_ID));
    }

    #[test]
    fn test_high_by_normalized_name() {
        let l = listing(&["bar-image-dev/honeycomb-hookah-eatery/photo_a.webp"]);
        let record = BusinessRecord::new(
            "Honeycomb Hookah & Eatery",
            Some("X1"),
            &["https://cdn/bar-image-dev/Honeycomb Hookah & Eatery/photo_a.webp"],
            None,
        );
        let res = resolve(&record, &l).unwrap();
        assert_eq!(res, Resolution::found("honeycomb-hookah-eatery", Confidence::High));
    }

    #[test]
    fn test_high_by_legacy_id_suffixed_folder() {
        let l = listing(&[&format!("bar-image-dev/la-baracca_{}/1.webp", PLACE_ID)]);
        let record = BusinessRecord::new("La Baracca", None, &[], None);
        let res = resolve(&record, &l).unwrap();
        assert_eq!(res.confidence, Confidence::High);
        assert_eq!(res.folder, Some(format!("la-baracca_{}", PLACE_ID)));
    }

    #[test]
    fn test_high_by_referenced_folder_when_name_differs() {
        let l = listing(&["bar-image-dev/la-baracca-bali-seminyak/1.webp"]);
        let record = BusinessRecord::new(
            "La Baracca",
            None,
            &["https://cdn/bar-image-dev/La Baracca Bali Seminyak/1.webp"],
            None,
        );
        assert_eq!(resolve(&record, &l).unwrap().confidence, Confidence::High);
    }

    #[test]
    fn test_case_and_spacing_duplicates_are_ambiguous() {
        let l = listing(&["bar-image-dev/PLATONIC/1.webp", "bar-image-dev/platonic/2.webp"]);
        let record = BusinessRecord::new("Platonic", None, &[], None);
        match resolve(&record, &l) {
            Err(PathmendError::AmbiguousMatch { record, candidates }) => {
                assert_eq!(record, "Platonic");
                assert_eq!(candidates, vec!["PLATONIC".to_string(), "platonic".to_string()]);
            }
            other => panic!("expected ambiguous match, got {:?}", other),
        }
    }

    #[test]
    fn test_medium_by_id_containment() {
        let l = listing(&[&format!("bar-image-dev/old_{}_v2/1.webp", PLACE_ID)]);
        let record = BusinessRecord::new("Renamed Place", Some(PLACE_ID), &[], None);
        let res = resolve(&record, &l).unwrap();
        assert_eq!(res.confidence, Confidence::Medium);
    }

    #[test]
    fn test_medium_multiple_matches_is_ambiguous() {
        let l = listing(&[
            &format!("bar-image-dev/a_{}_x/1.webp", PLACE_ID),
            &format!("bar-image-dev/b_{}_y/1.webp", PLACE_ID),
        ]);
        let record = BusinessRecord::new("Renamed Place", Some(PLACE_ID), &[], None);
        assert!(matches!(resolve(&record, &l), Err(PathmendError::AmbiguousMatch { .. })));
    }

    #[test]
    fn test_truncated_id_needs_correction() {
        let l = listing(&["bar-image-dev/single-fin-bali_ChIJ0aNPQ/1.webp"]);
        let record = BusinessRecord::new("Single Fin Bali", None, &[], None);
        assert_eq!(resolve(&record, &l).unwrap(), Resolution::none());

        let table = CorrectionTable::new().with_folder("single-fin-bali_ChIJ0aNPQ", "single-fin-bali");
        let res = Resolver::new(&table).resolve(&record, &l).unwrap();
        assert_eq!(res, Resolution::found("single-fin-bali_ChIJ0aNPQ", Confidence::High));
    }

    #[test]
    fn test_no_match() {
        let l = listing(&["bar-image-dev/the-shady-fox/1.webp"]);
        let record = BusinessRecord::new("Bali Beer Cycle", None, &[], None);
        assert_eq!(resolve(&record, &l).unwrap(), Resolution::none());
    }
}
