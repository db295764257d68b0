//! Image reference strings.
//!
//! A reference is either a CDN URL `https://{host}/{album}/{folder}/{filename}`
//! or a bare object key `{album}/{folder}/{filename}`. Parsing keeps the byte
//! ranges of the album and folder segments so a rewrite can splice new
//! segments in without touching anything else in the string.

use std::borrow::Cow;
use std::ops::Range;

/// A parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    raw: String,
    is_url: bool,
    album_range: Range<usize>,
    folder_range: Range<usize>,
    album: String,
    folder: String,
    filename: String,
}

impl ImageRef {
    /// Parse a reference. Returns `None` when there are fewer than three path
    /// segments (album, folder, filename).
    pub fn parse(raw: &str) -> Option<Self> {
        let (is_url, path_start, path_end) = match raw.find("://") {
            Some(idx) => {
                let host_start = idx + 3;
                let slash = raw[host_start..].find('/')? + host_start;
                let end = raw[slash..]
                    .find(['?', '#'])
                    .map(|i| i + slash)
                    .unwrap_or(raw.len());
                (true, slash, end)
            }
            None => (false, 0, raw.len()),
        };

        let album_range = next_segment(raw, path_start, path_end)?;
        let folder_range = next_segment(raw, album_range.end, path_end)?;
        let filename_raw = raw[folder_range.end..path_end].trim_start_matches('/');
        if filename_raw.is_empty() {
            return None;
        }

        Some(Self {
            album: decode(&raw[album_range.clone()], is_url),
            folder: decode(&raw[folder_range.clone()], is_url),
            filename: decode(filename_raw, is_url),
            raw: raw.to_string(),
            is_url,
            album_range,
            folder_range,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn is_url(&self) -> bool {
        self.is_url
    }

    /// Album segment, percent-decoded.
    pub fn album(&self) -> &str {
        &self.album
    }

    /// Folder segment, percent-decoded.
    pub fn folder(&self) -> &str {
        &self.folder
    }

    /// Everything after the folder, percent-decoded.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Store-native object key (unescaped).
    pub fn object_key(&self) -> String {
        format!("{}/{}/{}", self.album, self.folder, self.filename)
    }

    /// The reference string with album and folder replaced. Segments that do
    /// not change keep their original bytes, as does everything else.
    pub fn with_location(&self, album: &str, folder: &str) -> String {
        let album_text = if album == self.album {
            Cow::Borrowed(&self.raw[self.album_range.clone()])
        } else {
            encode(album, self.is_url)
        };
        let folder_text = if folder == self.folder {
            Cow::Borrowed(&self.raw[self.folder_range.clone()])
        } else {
            encode(folder, self.is_url)
        };

        let mut out = String::with_capacity(self.raw.len() + album.len() + folder.len());
        out.push_str(&self.raw[..self.album_range.start]);
        out.push_str(&album_text);
        out.push_str(&self.raw[self.album_range.end..self.folder_range.start]);
        out.push_str(&folder_text);
        out.push_str(&self.raw[self.folder_range.end..]);
        out
    }
}

fn next_segment(s: &str, from: usize, end: usize) -> Option<Range<usize>> {
    let bytes = s.as_bytes();
    let mut i = from;
    while i < end && bytes[i] == b'/' {
        i += 1;
    }
    if i >= end {
        return None;
    }
    let start = i;
    while i < end && bytes[i] != b'/' {
        i += 1;
    }
    Some(start..i)
}

fn decode(segment: &str, is_url: bool) -> String {
    if !is_url {
        return segment.to_string();
    }
    match urlencoding::decode(segment) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => segment.to_string(),
    }
}

fn encode(segment: &str, is_url: bool) -> Cow<'_, str> {
    if is_url {
        urlencoding::encode(segment)
    } else {
        Cow::Borrowed(segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url_with_literal_spaces() {
        let r = ImageRef::parse("https://cdn/bar-image-dev/Honeycomb Hookah & Eatery/photo_a.webp").unwrap();
        assert!(r.is_url());
        assert_eq!(r.album(), "bar-image-dev");
        assert_eq!(r.folder(), "Honeycomb Hookah & Eatery");
        assert_eq!(r.filename(), "photo_a.webp");
        assert_eq!(r.object_key(), "bar-image-dev/Honeycomb Hookah & Eatery/photo_a.webp");
    }

    #[test]
    fn test_parse_percent_encoded_url() {
        let r = ImageRef::parse("https://d2cmxnft4myi1k.cloudfront.net/bar-image-prod/The%20Shady%20Fox/1.webp").unwrap();
        assert_eq!(r.folder(), "The Shady Fox");
        assert_eq!(r.object_key(), "bar-image-prod/The Shady Fox/1.webp");
    }

    #[test]
    fn test_parse_bare_key_and_nested_filename() {
        let r = ImageRef::parse("cafe-image-dev/some cafe/thumbs/1.webp").unwrap();
        assert!(!r.is_url());
        assert_eq!(r.folder(), "some cafe");
        assert_eq!(r.filename(), "thumbs/1.webp");
    }

    #[test]
    fn test_parse_rejects_short_paths() {
        assert!(ImageRef::parse("https://cdn/bar-image-dev/photo.webp").is_none());
        assert!(ImageRef::parse("https://cdn").is_none());
        assert!(ImageRef::parse("bar-image-dev/folder/").is_none());
        assert!(ImageRef::parse("").is_none());
    }

    #[test]
    fn test_with_location_preserves_host_and_filename() {
        let r = ImageRef::parse("https://cdn/bar-image-dev/Honeycomb Hookah & Eatery/photo_a.webp").unwrap();
        assert_eq!(
            r.with_location("bar-image-dev", "honeycomb-hookah-eatery"),
            "https://cdn/bar-image-dev/honeycomb-hookah-eatery/photo_a.webp"
        );
    }

    #[test]
    fn test_with_location_encodes_url_segments() {
        let r = ImageRef::parse("https://cdn/bar-image-dev/x/photo%20a.webp?v=1").unwrap();
        assert_eq!(
            r.with_location("dining-image-dev", "miss fish"),
            "https://cdn/dining-image-dev/miss%20fish/photo%20a.webp?v=1"
        );
    }

    #[test]
    fn test_with_location_unchanged_is_identical() {
        let raw = "https://cdn//bar-image-dev/The%20Shady%20Fox/1.webp";
        let r = ImageRef::parse(raw).unwrap();
        assert_eq!(r.with_location("bar-image-dev", "The Shady Fox"), raw);
    }

    #[test]
    fn test_with_location_bare_key_unescaped() {
        let r = ImageRef::parse("bar-image-dev/PLATONIC/a.webp").unwrap();
        assert_eq!(r.with_location("bar-image-dev", "platonic dining"), "bar-image-dev/platonic dining/a.webp");
    }
}
