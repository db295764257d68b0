//! Album listing.
//!
//! An album is a prefix in the bucket. Its keys are grouped into merchant
//! folders (`{album}/{folder}/{filename}`) so the resolver can work on a
//! snapshot without further store calls.

use crate::corrections::CorrectionTable;
use crate::naming::normalize_segment;
use crate::store::ObjectStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Snapshot of an album's keys grouped by folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlbumListing {
    album: String,
    folders: BTreeMap<String, BTreeSet<String>>,
    /// Keys directly under the album, outside any folder.
    loose: Vec<String>,
}

impl AlbumListing {
    pub fn new(album: impl Into<String>) -> Self {
        Self {
            album: album.into(),
            ..Self::default()
        }
    }

    /// Build a listing from full object keys. Keys outside the album are ignored.
    pub fn from_keys<I, S>(album: &str, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut listing = Self::new(album);
        for key in keys {
            listing.insert_key(key.as_ref());
        }
        listing
    }

    /// Add one full object key. Returns false if the key is not in this album.
    pub fn insert_key(&mut self, key: &str) -> bool {
        let Some(rest) = key
            .strip_prefix(self.album.as_str())
            .and_then(|r| r.strip_prefix('/'))
        else {
            return false;
        };
        match rest.split_once('/') {
            Some((folder, filename)) if !folder.is_empty() && !filename.is_empty() => {
                self.folders
                    .entry(folder.to_string())
                    .or_default()
                    .insert(filename.to_string());
            }
            _ => self.loose.push(rest.to_string()),
        }
        true
    }

    /// Drop one full object key. Returns whether it was listed.
    pub fn remove_key(&mut self, key: &str) -> bool {
        let Some((folder, filename)) = key
            .strip_prefix(self.album.as_str())
            .and_then(|r| r.strip_prefix('/'))
            .and_then(|r| r.split_once('/'))
        else {
            return false;
        };
        let Some(files) = self.folders.get_mut(folder) else {
            return false;
        };
        let removed = files.remove(filename);
        if files.is_empty() {
            self.folders.remove(folder);
        }
        removed
    }

    pub fn album(&self) -> &str {
        &self.album
    }

    pub fn contains(&self, folder: &str, filename: &str) -> bool {
        self.folders
            .get(folder)
            .is_some_and(|files| files.contains(filename))
    }

    /// Whether the full object key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        key.strip_prefix(self.album.as_str())
            .and_then(|r| r.strip_prefix('/'))
            .and_then(|r| r.split_once('/'))
            .is_some_and(|(folder, filename)| self.contains(folder, filename))
    }

    pub fn has_folder(&self, folder: &str) -> bool {
        self.folders.contains_key(folder)
    }

    /// Folder names, sorted.
    pub fn folders(&self) -> impl Iterator<Item = &str> {
        self.folders.keys().map(String::as_str)
    }

    /// Filenames inside `folder`, sorted.
    pub fn files(&self, folder: &str) -> impl Iterator<Item = &str> {
        self.folders
            .get(folder)
            .into_iter()
            .flat_map(|files| files.iter().map(String::as_str))
    }

    pub fn loose_keys(&self) -> &[String] {
        &self.loose
    }

    pub fn folder_count(&self) -> usize {
        self.folders.len()
    }

    pub fn object_count(&self) -> usize {
        self.folders.values().map(BTreeSet::len).sum::<usize>() + self.loose.len()
    }
}

/// Folders of one album that share a canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub canonical: String,
    pub folders: Vec<String>,
}

/// Lists albums through an object store.
pub struct Scanner {
    store: Arc<dyn ObjectStore>,
}

impl Scanner {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Every object key under `album`, verbatim.
    pub async fn list(&self, album: &str) -> Result<Vec<String>> {
        let prefix = format!("{}/", album.trim_end_matches('/'));
        let keys: Vec<String> = self
            .store
            .list(&prefix)
            .await?
            .into_iter()
            .map(|o| o.key)
            .collect();
        debug!("{} objects under {}", keys.len(), prefix);
        Ok(keys)
    }

    /// Folder-grouped snapshot of `album`.
    pub async fn listing(&self, album: &str) -> Result<AlbumListing> {
        let album = album.trim_end_matches('/');
        let keys = self.list(album).await?;
        let listing = AlbumListing::from_keys(album, &keys);
        info!(
            "Scanned {}: {} folders, {} objects",
            album,
            listing.folder_count(),
            listing.object_count()
        );
        Ok(listing)
    }
}

/// Groups of two or more folders whose canonical forms coincide, e.g.
/// `Honeycomb Hookah & Eatery` and `honeycomb-hookah-eatery`.
pub fn duplicate_groups(listing: &AlbumListing, corrections: &CorrectionTable) -> Vec<DuplicateGroup> {
    let mut by_canonical: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for folder in listing.folders() {
        by_canonical
            .entry(corrections.canonical_folder(listing.album(), folder))
            .or_default()
            .push(folder.to_string());
    }
    by_canonical
        .into_iter()
        .filter(|(_, folders)| folders.len() > 1)
        .map(|(canonical, folders)| DuplicateGroup { canonical, folders })
        .collect()
}

/// Folders whose name is not already canonical.
pub fn non_canonical_folders(listing: &AlbumListing) -> Vec<String> {
    listing
        .folders()
        .filter(|f| normalize_segment(f) != *f)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn listing() -> AlbumListing {
        AlbumListing::from_keys(
            "bar-image-dev",
            [
                "bar-image-dev/Honeycomb Hookah & Eatery/photo_a.webp",
                "bar-image-dev/honeycomb-hookah-eatery/photo_a.webp",
                "bar-image-dev/honeycomb-hookah-eatery/photo_b.webp",
                "bar-image-dev/platonic/thumbs/1.webp",
                "bar-image-dev/README.txt",
                "cafe-image-dev/other/1.webp",
            ],
        )
    }

    #[test]
    fn test_grouping() {
        let l = listing();
        assert_eq!(l.folder_count(), 3);
        assert_eq!(l.object_count(), 5);
        assert_eq!(l.loose_keys(), ["README.txt".to_string()]);
        assert!(l.contains("platonic", "thumbs/1.webp"));
        assert!(l.contains_key("bar-image-dev/Honeycomb Hookah & Eatery/photo_a.webp"));
        assert!(!l.contains_key("cafe-image-dev/other/1.webp"));
        assert_eq!(
            l.files("honeycomb-hookah-eatery").collect::<Vec<_>>(),
            vec!["photo_a.webp", "photo_b.webp"]
        );
    }

    #[test]
    fn test_duplicate_groups_and_non_canonical() {
        let l = listing();
        let groups = duplicate_groups(&l, &CorrectionTable::new());
        assert_eq!(
            groups,
            vec![DuplicateGroup {
                canonical: "honeycomb-hookah-eatery".into(),
                folders: vec!["Honeycomb Hookah & Eatery".into(), "honeycomb-hookah-eatery".into()],
            }]
        );
        assert_eq!(non_canonical_folders(&l), vec!["Honeycomb Hookah & Eatery".to_string()]);
    }

    #[test]
    fn test_duplicate_groups_respect_corrections() {
        let l = AlbumListing::from_keys(
            "bar-image-dev",
            ["bar-image-dev/single-fin-bali_ChIJ0aNPQ/1.webp", "bar-image-dev/single-fin-bali/2.webp"],
        );
        assert!(duplicate_groups(&l, &CorrectionTable::new()).is_empty());
        let table = CorrectionTable::new().with_folder("single-fin-bali_ChIJ0aNPQ", "single-fin-bali");
        assert_eq!(duplicate_groups(&l, &table).len(), 1);
    }

    #[tokio::test]
    async fn test_scanner_lists_verbatim_keys() {
        let store = Arc::new(MemoryStore::new());
        store.insert("bar-image-dev/Café Ubud/ñ 1.webp", "x");
        store.insert("bar-image-dev/", "");
        let scanner = Scanner::new(store);

        assert_eq!(
            scanner.list("bar-image-dev").await.unwrap(),
            vec!["bar-image-dev/Café Ubud/ñ 1.webp".to_string()]
        );
        let empty = scanner.listing("cowork-image-prod").await.unwrap();
        assert_eq!(empty.object_count(), 0);
    }
}
