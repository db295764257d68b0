//! Catalog record model.
//!
//! Records are kept as ordered JSON objects. The fields this crate reads and
//! rewrites have typed accessors; everything else round-trips untouched and
//! in its original position.

use crate::store::ObjectVersion;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON keys of the fields this crate understands.
pub struct RecordFields;

impl RecordFields {
    pub const NAME: &'static str = "name";
    pub const EXTERNAL_ID: &'static str = "placeId";
    pub const PHOTOS: &'static str = "photos";
    pub const MAP_IMAGE: &'static str = "staticMapS3Url";
}

/// Which field of a record a reference lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefField {
    /// `photos[index]`
    Photo(usize),
    MapImage,
}

impl std::fmt::Display for RefField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefField::Photo(i) => write!(f, "{}[{}]", RecordFields::PHOTOS, i),
            RefField::MapImage => f.write_str(RecordFields::MAP_IMAGE),
        }
    }
}

/// One business entry of a catalog document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusinessRecord(Map<String, Value>);

impl BusinessRecord {
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Convenience constructor used by fixtures and tools.
    pub fn new(name: &str, external_id: Option<&str>, photos: &[&str], map_image: Option<&str>) -> Self {
        let mut fields = Map::new();
        fields.insert(RecordFields::NAME.into(), Value::from(name));
        if let Some(id) = external_id {
            fields.insert(RecordFields::EXTERNAL_ID.into(), Value::from(id));
        }
        fields.insert(
            RecordFields::PHOTOS.into(),
            Value::Array(photos.iter().map(|p| Value::from(*p)).collect()),
        );
        if let Some(map) = map_image {
            fields.insert(RecordFields::MAP_IMAGE.into(), Value::from(map));
        }
        Self(fields)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }

    /// Business name; empty when absent.
    pub fn name(&self) -> &str {
        self.0
            .get(RecordFields::NAME)
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    /// Upstream place identifier, if present and non-blank.
    pub fn external_id(&self) -> Option<&str> {
        self.0
            .get(RecordFields::EXTERNAL_ID)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Photo references in display order. Non-string entries are skipped.
    pub fn photo_refs(&self) -> Vec<&str> {
        self.photos()
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    pub fn map_image_ref(&self) -> Option<&str> {
        self.0
            .get(RecordFields::MAP_IMAGE)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Every reference with the field it came from, photos first.
    pub fn references(&self) -> Vec<(RefField, &str)> {
        let mut refs: Vec<(RefField, &str)> = self
            .photos()
            .map(|items| {
                items
                    .iter()
                    .enumerate()
                    .filter_map(|(i, v)| v.as_str().map(|s| (RefField::Photo(i), s)))
                    .collect()
            })
            .unwrap_or_default();
        if let Some(map) = self.map_image_ref() {
            refs.push((RefField::MapImage, map));
        }
        refs
    }

    /// Replace the reference at `field`. Returns false if the slot does not
    /// hold a string.
    pub fn set_reference(&mut self, field: RefField, value: String) -> bool {
        let slot = match field {
            RefField::Photo(i) => self
                .0
                .get_mut(RecordFields::PHOTOS)
                .and_then(Value::as_array_mut)
                .and_then(|items| items.get_mut(i)),
            RefField::MapImage => self.0.get_mut(RecordFields::MAP_IMAGE),
        };
        match slot {
            Some(v @ Value::String(_)) => {
                *v = Value::String(value);
                true
            }
            _ => false,
        }
    }

    /// Name for reports: the business name, or the id when the name is blank.
    pub fn label(&self) -> String {
        match (self.name(), self.external_id()) {
            ("", Some(id)) => id.to_string(),
            ("", None) => "<unnamed>".to_string(),
            (name, _) => name.to_string(),
        }
    }

    fn photos(&self) -> Option<&Vec<Value>> {
        self.0.get(RecordFields::PHOTOS).and_then(Value::as_array)
    }
}

/// A catalog as loaded, with the version it was read at.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    /// Catalog file name, e.g. `bars-dev.json`.
    pub name: String,
    pub records: Vec<BusinessRecord>,
    /// `None` when the catalog did not exist yet.
    pub version: Option<ObjectVersion>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> BusinessRecord {
        serde_json::from_str(
            r#"{"name":"Miss Fish","placeId":"ChIJ1234567890abcdefgh","rating":4.6,
                "photos":["https://cdn/bar-image-dev/miss-fish/1.webp",7,"https://cdn/bar-image-dev/miss-fish/2.webp"],
                "staticMapS3Url":"https://cdn/dining-image-dev/miss-fish/staticmap.webp"}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_accessors() {
        let r = record();
        assert_eq!(r.name(), "Miss Fish");
        assert_eq!(r.external_id(), Some("ChIJ1234567890abcdefgh"));
        assert_eq!(r.photo_refs().len(), 2);
        assert_eq!(
            r.map_image_ref(),
            Some("https://cdn/dining-image-dev/miss-fish/staticmap.webp")
        );
    }

    #[test]
    fn test_references_keep_photo_indices() {
        let r = record();
        let fields: Vec<RefField> = r.references().into_iter().map(|(f, _)| f).collect();
        assert_eq!(fields, vec![RefField::Photo(0), RefField::Photo(2), RefField::MapImage]);
    }

    #[test]
    fn test_set_reference() {
        let mut r = record();
        assert!(r.set_reference(RefField::Photo(2), "x/y/z.webp".into()));
        assert!(!r.set_reference(RefField::Photo(1), "x/y/z.webp".into()));
        assert_eq!(r.photo_refs()[1], "x/y/z.webp");
    }

    #[test]
    fn test_unknown_fields_keep_order() {
        let raw = r#"{"zeta":1,"name":"A","alpha":[1,2],"photos":[]}"#;
        let r: BusinessRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(serde_json::to_string(&r).unwrap(), raw);
    }

    #[test]
    fn test_label_falls_back_to_id() {
        let r = BusinessRecord::new("", Some("ChIJabc"), &[], None);
        assert_eq!(r.label(), "ChIJabc");
    }
}
