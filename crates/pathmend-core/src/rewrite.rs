//! Reference rewriting.
//!
//! Given the folder a record resolved to, every photo and map reference is
//! pointed at `{album}/{folder}`. Host prefix, filename, query and the order
//! and count of `photos` are kept. Strings that are not references are left
//! alone and reported.

use crate::catalog::{BusinessRecord, RefField};
use crate::references::ImageRef;
use serde::{Deserialize, Serialize};

/// Where a record's images should live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTarget {
    pub album: String,
    pub folder: String,
}

impl ResolvedTarget {
    pub fn new(album: impl Into<String>, folder: impl Into<String>) -> Self {
        Self {
            album: album.into(),
            folder: folder.into(),
        }
    }
}

/// One rewritten reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefChange {
    pub field: RefField,
    pub before: String,
    pub after: String,
    /// Object key the reference pointed at before the rewrite.
    pub source_key: String,
    /// Object key it points at now.
    pub target_key: String,
    /// The reference moved to a different album.
    pub cross_album: bool,
}

/// Rewritten record plus what changed.
#[derive(Debug, Clone)]
pub struct RewriteOutcome {
    pub record: BusinessRecord,
    pub changes: Vec<RefChange>,
    /// References that could not be parsed and were left untouched.
    pub unparsed: Vec<(RefField, String)>,
}

impl RewriteOutcome {
    pub fn changed(&self) -> bool {
        !self.changes.is_empty()
    }
}

/// Point every reference of `record` at `target`.
pub fn rewrite(record: &BusinessRecord, target: &ResolvedTarget) -> RewriteOutcome {
    let mut out = record.clone();
    let mut changes = Vec::new();
    let mut unparsed = Vec::new();

    for (field, raw) in record.references() {
        let Some(parsed) = ImageRef::parse(raw) else {
            unparsed.push((field, raw.to_string()));
            continue;
        };
        let after = parsed.with_location(&target.album, &target.folder);
        if after == raw {
            continue;
        }
        out.set_reference(field, after.clone());
        changes.push(RefChange {
            field,
            before: raw.to_string(),
            after,
            source_key: parsed.object_key(),
            target_key: format!("{}/{}/{}", target.album, target.folder, parsed.filename()),
            cross_album: parsed.album() != target.album,
        });
    }

    RewriteOutcome {
        record: out,
        changes,
        unparsed,
    }
}

/// Object keys every parseable reference of `record` points at.
pub fn referenced_keys(record: &BusinessRecord) -> Vec<(RefField, String)> {
    record
        .references()
        .into_iter()
        .filter_map(|(field, raw)| ImageRef::parse(raw).map(|r| (field, r.object_key())))
        .collect()
}

/// Distinct albums the record's references point into.
pub fn referenced_albums(record: &BusinessRecord) -> Vec<String> {
    let mut albums: Vec<String> = record
        .references()
        .into_iter()
        .filter_map(|(_, raw)| ImageRef::parse(raw).map(|r| r.album().to_string()))
        .collect();
    albums.sort();
    albums.dedup();
    albums
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_honeycomb_rewrite() {
        let record = BusinessRecord::new(
            "Honeycomb Hookah & Eatery",
            Some("X1"),
            &["https://cdn/bar-image-dev/Honeycomb Hookah & Eatery/photo_a.webp"],
            None,
        );
        let out = rewrite(&record, &ResolvedTarget::new("bar-image-dev", "honeycomb-hookah-eatery"));
        assert_eq!(
            out.record.photo_refs(),
            vec!["https://cdn/bar-image-dev/honeycomb-hookah-eatery/photo_a.webp"]
        );
        assert_eq!(out.changes.len(), 1);
        assert_eq!(out.changes[0].target_key, "bar-image-dev/honeycomb-hookah-eatery/photo_a.webp");
        assert!(!out.changes[0].cross_album);
    }

    #[test]
    fn test_preserves_photo_order_and_count() {
        let photos = [
            "https://cdn/bar-image-dev/Miss Fish/3.webp",
            "not a reference",
            "https://cdn/bar-image-dev/miss-fish/1.webp",
            "bar-image-dev/MISS FISH/2.webp",
        ];
        let record = BusinessRecord::new("Miss Fish", None, &photos, None);
        let out = rewrite(&record, &ResolvedTarget::new("bar-image-dev", "miss-fish"));

        let refs = out.record.photo_refs();
        assert_eq!(refs.len(), photos.len());
        assert_eq!(
            refs,
            vec![
                "https://cdn/bar-image-dev/miss-fish/3.webp",
                "not a reference",
                "https://cdn/bar-image-dev/miss-fish/1.webp",
                "bar-image-dev/miss-fish/2.webp",
            ]
        );
        assert_eq!(out.changes.len(), 2);
        assert_eq!(out.unparsed, vec![(RefField::Photo(1), "not a reference".to_string())]);
    }

    #[test]
    fn test_cross_album_map_is_moved_into_target_album() {
        let record = BusinessRecord::new(
            "Miss Fish",
            None,
            &["https://cdn/bar-image-dev/miss-fish/1.webp"],
            Some("https://cdn/dining-image-dev/miss-fish/staticmap.webp"),
        );
        assert_eq!(referenced_albums(&record), vec!["bar-image-dev", "dining-image-dev"]);

        let out = rewrite(&record, &ResolvedTarget::new("bar-image-dev", "miss-fish"));
        assert_eq!(
            out.record.map_image_ref(),
            Some("https://cdn/bar-image-dev/miss-fish/staticmap.webp")
        );
        assert_eq!(out.changes.len(), 1);
        assert!(out.changes[0].cross_album);
        assert_eq!(out.changes[0].source_key, "dining-image-dev/miss-fish/staticmap.webp");
        assert_eq!(referenced_albums(&out.record), vec!["bar-image-dev"]);
    }

    #[test]
    fn test_already_canonical_is_unchanged() {
        let record = BusinessRecord::new(
            "The Shady Fox",
            None,
            &["https://cdn/bar-image-dev/the-shady-fox/1.webp"],
            None,
        );
        let out = rewrite(&record, &ResolvedTarget::new("bar-image-dev", "the-shady-fox"));
        assert!(!out.changed());
        assert_eq!(out.record, record);
    }
}
