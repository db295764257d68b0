//! Canonical path and folder-name normalization.
//!
//! Historical album folders were named in several incompatible ways: raw
//! business names with spaces and capitals (`Honeycomb Hookah & Eatery`),
//! legacy `{name}_{placeId}` folders, and kebab-case. Everything is compared
//! through [`normalize_segment`] / [`normalize_path`].
//!
//! # Rules Applied (per segment)
//! 1. Drop URL scheme and host, percent-decode the path (URL input only)
//! 2. Lowercase
//! 3. Strip a trailing `_<opaque id>` suffix
//! 4. Replace separator runs with `-`, drop unsafe punctuation, collapse and
//!    trim hyphens
//!
//! Each segment is normalized to a fixpoint, so normalizing twice is a no-op.
//! Truncated identifiers are not repaired here; they belong in the correction
//! table.

use crate::config::NamingConfig;
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

/// Whitespace and punctuation that separate words in business names.
static SEPARATOR_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s|&+,\\/()\[\]]+").unwrap());

/// Characters that are removed outright.
static DROPPED_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"['’‘"?#:*<>!@]"#).unwrap());

static HYPHEN_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-{2,}").unwrap());

/// Normalize a raw path or URL to its canonical form.
///
/// # Examples
///
/// ```
/// use pathmend_core::naming::normalize_path;
///
/// assert_eq!(
///     normalize_path("https://cdn/bar-image-dev/Honeycomb Hookah & Eatery/photo_a.webp"),
///     "bar-image-dev/honeycomb-hookah-eatery/photo_a.webp"
/// );
/// assert_eq!(normalize_path("bar-image-dev//PLATONIC/"), "bar-image-dev/platonic");
/// ```
pub fn normalize_path(raw: &str) -> String {
    let path = strip_scheme_and_host(raw);
    path.split('/')
        .map(normalize_segment)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Normalize a single name or folder segment. `/` counts as a word separator.
///
/// ```
/// use pathmend_core::naming::normalize_segment;
///
/// assert_eq!(
///     normalize_segment("LONGTIME | Modern Asian Restaurant & Bar Bali"),
///     "longtime-modern-asian-restaurant-bar-bali"
/// );
/// ```
pub fn normalize_segment(raw: &str) -> String {
    // Every pass after the first only shrinks the string, so this terminates.
    let mut current = segment_pass(raw);
    loop {
        let next = segment_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn segment_pass(raw: &str) -> String {
    let lower = raw.to_lowercase();
    let stripped = strip_id_suffix(&lower);
    let dropped = DROPPED_CHARS.replace_all(stripped, "");
    let separated = SEPARATOR_RUN.replace_all(&dropped, "-");
    let collapsed = HYPHEN_RUN.replace_all(&separated, "-");
    collapsed.trim_matches('-').to_string()
}

/// Remove scheme and host from URL input and percent-decode the remaining path.
/// Plain keys are returned unchanged.
pub fn strip_scheme_and_host(raw: &str) -> Cow<'_, str> {
    let Some(idx) = raw.find("://") else {
        return Cow::Borrowed(raw);
    };
    let after_scheme = &raw[idx + 3..];
    let path = match after_scheme.find('/') {
        Some(slash) => &after_scheme[slash..],
        None => "",
    };
    let path = path.split(['?', '#']).next().unwrap_or("");
    match urlencoding::decode(path) {
        Ok(decoded) => Cow::Owned(decoded.into_owned()),
        Err(_) => Cow::Owned(path.to_string()),
    }
}

/// Strip a trailing `_<id>` suffix from an already-lowercased segment.
fn strip_id_suffix(segment: &str) -> &str {
    for (idx, c) in segment.char_indices() {
        if c != '_' || idx == 0 {
            continue;
        }
        if looks_like_external_id(&segment[idx + 1..]) {
            return &segment[..idx];
        }
    }
    segment
}

/// Heuristic for opaque upstream place identifiers (length and charset only;
/// the id scheme belongs to a third party).
pub fn looks_like_external_id(token: &str) -> bool {
    let len = token.chars().count();
    if !(NamingConfig::ID_TOKEN_MIN_LEN..=NamingConfig::ID_TOKEN_MAX_LEN).contains(&len) {
        return false;
    }
    let mut digits = 0;
    let mut letters = 0;
    let mut underscores = 0;
    let mut hyphens = 0;
    for c in token.chars() {
        match c {
            '0'..='9' => digits += 1,
            'a'..='z' | 'A'..='Z' => letters += 1,
            '_' => underscores += 1,
            '-' => hyphens += 1,
            _ => return false,
        }
    }
    letters > 0
        && digits >= NamingConfig::ID_TOKEN_MIN_DIGITS
        && underscores <= NamingConfig::ID_TOKEN_MAX_UNDERSCORES
        && hyphens <= NamingConfig::ID_TOKEN_MAX_HYPHENS
}

/// Whether a raw folder name still carries a legacy `_<id>` suffix.
pub fn has_id_suffix(raw: &str) -> bool {
    let lower = raw.to_lowercase();
    strip_id_suffix(&lower).len() != lower.len()
}

/// Folder name derived from an upstream identifier.
pub fn id_folder(external_id: &str) -> String {
    external_id.trim().to_string()
}

/// Whether a raw segment is already in canonical form.
pub fn is_canonical_segment(raw: &str) -> bool {
    normalize_segment(raw) == raw
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_segment_basic() {
        assert_eq!(normalize_segment("Honeycomb Hookah & Eatery"), "honeycomb-hookah-eatery");
        assert_eq!(normalize_segment("The Shady Fox"), "the-shady-fox");
        assert_eq!(normalize_segment("bali beer cycle"), "bali-beer-cycle");
        assert_eq!(normalize_segment("PLATONIC"), "platonic");
    }

    #[test]
    fn test_normalize_segment_punctuation() {
        assert_eq!(normalize_segment("Luigi's Hot Pizza | Canggu"), "luigis-hot-pizza-canggu");
        assert_eq!(normalize_segment("Bar / Grill"), "bar-grill");
        assert_eq!(normalize_segment("  --Café  Organic-- "), "café-organic");
    }

    #[test]
    fn test_case_insensitive_equivalence() {
        assert_eq!(normalize_segment("Foo Bar & Co"), normalize_segment("foo bar & co"));
        assert_eq!(normalize_segment("Foo Bar & Co"), normalize_segment("foo-bar-&-co"));
        assert_eq!(normalize_segment("Foo Bar & Co"), "foo-bar-co");
    }

    #[test]
    fn test_strips_full_place_id() {
        assert_eq!(
            normalize_segment("alma-tapas-bar-canggu_ChIJTTj8Ts9H0i0R2XwcfS"),
            "alma-tapas-bar-canggu"
        );
        assert_eq!(
            normalize_segment("Black Sand Brewery_ChIJNzjyIBI50i0RpFdnd1234"),
            "black-sand-brewery"
        );
    }

    #[test]
    fn test_keeps_truncated_place_id() {
        // Too short to be recognised; these go through the correction table.
        assert_eq!(normalize_segment("single-fin-bali_ChIJ0aNPQ"), "single-fin-bali_chij0anpq");
        assert_eq!(normalize_segment("potato-head-beach-club_ChIJ_XZL"), "potato-head-beach-club_chij_xzl");
    }

    #[test]
    fn test_keeps_filenames() {
        assert_eq!(normalize_segment("photo_a.webp"), "photo_a.webp");
        assert_eq!(normalize_segment("staticmap.webp"), "staticmap.webp");
    }

    #[test]
    fn test_normalize_path_url() {
        assert_eq!(
            normalize_path("https://d2cmxnft4myi1k.cloudfront.net/bar-image-dev/The%20Shady%20Fox/IMG_1.webp"),
            "bar-image-dev/the-shady-fox/img_1.webp"
        );
        assert_eq!(normalize_path("https://cdn"), "");
        assert_eq!(normalize_path("https://cdn/a/b.webp?v=2"), "a/b.webp");
    }

    #[test]
    fn test_normalize_path_duplicate_separators() {
        assert_eq!(normalize_path("/cafe-image-dev///Some Cafe//x.webp/"), "cafe-image-dev/some-cafe/x.webp");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            "https://cdn/bar-image-dev/Honeycomb Hookah & Eatery/photo_a.webp",
            "LONGTIME | Modern Asian Restaurant & Bar Bali",
            "x_abc def123456789012345678",
            "la-baracca-bali_ChIJj0tR_mpH0i0RP5hABCDEF12",
            "---",
            "",
            "İstanbul Kebab & Grill",
            "foo_bar_baz_qux_long_name_2024-01",
        ];
        let stacked = format!("name{}", "_abcdefghij0123456789 ".repeat(40));
        for input in inputs.iter().copied().chain([stacked.as_str()]) {
            let once = normalize_path(input);
            assert_eq!(normalize_path(&once), once, "path not idempotent for {input:?}");
            let seg = normalize_segment(input);
            assert_eq!(normalize_segment(&seg), seg, "segment not idempotent for {input:?}");
        }
    }

    #[test]
    fn test_stacked_id_suffixes_reach_fixpoint() {
        let stacked = format!("name{}", "_abcdefghij0123456789 ".repeat(40));
        assert_eq!(normalize_segment(&stacked), "name");
        assert_eq!(normalize_path(&stacked), "name");
    }

    #[test]
    fn test_looks_like_external_id() {
        assert!(looks_like_external_id("ChIJTTj8Ts9H0i0R2XwcfS"));
        assert!(looks_like_external_id("chijk4manpo50i0r4vfuhdwz"));
        assert!(!looks_like_external_id("ChIJ0aNPQ"));
        assert!(!looks_like_external_id("modern-asian-restaurant-bar"));
        assert!(!looks_like_external_id("abcdefghijklmnopqrstuvwxyz"));
    }

    #[test]
    fn test_has_id_suffix() {
        assert!(has_id_suffix("uma-garden-seminyak_ChIJXxe2rXNH0i0Rnt12"));
        assert!(!has_id_suffix("uma-garden-seminyak"));
    }

    #[test]
    fn test_is_canonical_segment() {
        assert!(is_canonical_segment("honeycomb-hookah-eatery"));
        assert!(!is_canonical_segment("Honeycomb Hookah & Eatery"));
    }
}
