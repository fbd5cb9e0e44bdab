//! Catalog document model
//!
//! Catalog records are loosely shaped: collections from different eras
//! carry different fields, and every field the pipeline does not own must
//! survive a round trip untouched. Items are therefore kept as raw JSON
//! objects, and every accessor checks for presence and type.

mod slug;

use std::fs;
use std::path::Path;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{AppError, AppResult, ResultExt};
use crate::utils::write_atomic;

pub use slug::{assign_item_ids, pointer_suffix, slugify, MAX_SLUG_CHARS};

pub(crate) const FIELD_ID: &str = "id";
pub(crate) const FIELD_TITLE: &str = "title";
pub(crate) const FIELD_MANIFEST: &str = "manifest";
pub(crate) const FIELD_MANIFEST_URI: &str = "manifest_uri";
pub(crate) const FIELD_IMAGE_URL: &str = "image_url";
pub(crate) const FIELD_VISUAL_TAGS: &str = "visual_tags";
pub(crate) const FIELD_SIMILAR_ITEMS: &str = "similar_items";
pub(crate) const FIELD_FOUND_BY: &str = "found_by";
pub(crate) const FIELD_DETECTION_CONFIDENCE: &str = "detection_confidence";

pub(crate) const FIELD_ITEMS: &str = "items";

/// A catalog document: `items` plus any other top-level fields, kept
/// verbatim and in their original order.
#[derive(Debug, Clone)]
pub struct Catalog {
    /// Top-level object; the `items` slot is a placeholder that marks where
    /// the items are written back.
    fields: Map<String, Value>,
    pub items: Vec<CatalogItem>,
}

impl Catalog {
    pub fn load(path: &Path) -> AppResult<Self> {
        let raw = fs::read(path)?;
        let value: Value = serde_json::from_slice(&raw)
            .catalog_err(&format!("{} is not valid JSON", path.display()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> AppResult<Self> {
        let Value::Object(mut fields) = value else {
            return Err(missing_items());
        };
        let items = match fields.get_mut(FIELD_ITEMS) {
            Some(items) if items.is_array() => items.take(),
            _ => return Err(missing_items()),
        };
        let items = serde_json::from_value(items).catalog_err("catalog items must be objects")?;
        Ok(Self { fields, items })
    }

    /// Top-level field other than `items`
    pub fn field(&self, name: &str) -> Option<&Value> {
        if name == FIELD_ITEMS {
            return None;
        }
        self.fields.get(name)
    }

    pub fn save(&self, path: &Path) -> AppResult<()> {
        let mut json = serde_json::to_vec_pretty(self)?;
        json.push(b'\n');
        write_atomic(path, &json)?;
        Ok(())
    }
}

impl Serialize for Catalog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, value) in &self.fields {
            if key == FIELD_ITEMS {
                map.serialize_entry(key, &self.items)?;
            } else {
                map.serialize_entry(key, value)?;
            }
        }
        map.end()
    }
}

fn missing_items() -> AppError {
    AppError::Catalog("catalog must be an object with an `items` array".to_string())
}

/// One catalog record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogItem {
    fields: Map<String, Value>,
}

impl CatalogItem {
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// String-valued field, `None` when absent, not a string, or blank.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn id(&self) -> Option<&str> {
        self.str_field(FIELD_ID)
    }

    pub fn title(&self) -> Option<&str> {
        self.str_field(FIELD_TITLE)
    }

    pub fn manifest_uri(&self) -> Option<&str> {
        self.str_field(FIELD_MANIFEST)
            .or_else(|| self.str_field(FIELD_MANIFEST_URI))
    }

    pub fn image_url(&self) -> Option<&str> {
        self.str_field(FIELD_IMAGE_URL)
    }

    /// Tags as a list of strings. `None` when the field is absent or not a
    /// list; non-string entries are skipped.
    pub fn visual_tags(&self) -> Option<Vec<&str>> {
        self.fields
            .get(FIELD_VISUAL_TAGS)
            .and_then(Value::as_array)
            .map(|tags| tags.iter().filter_map(Value::as_str).collect())
    }

    pub fn has_visual_tags(&self) -> bool {
        self.fields.contains_key(FIELD_VISUAL_TAGS)
    }

    pub fn similar_items(&self) -> Option<Vec<&str>> {
        self.fields
            .get(FIELD_SIMILAR_ITEMS)
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_str).collect())
    }

    /// Joined text of a field that may be a string or a list of strings.
    pub fn text_of(&self, name: &str) -> Option<String> {
        match self.fields.get(name)? {
            Value::String(text) => Some(text.clone()),
            Value::Array(values) => Some(
                values
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            _ => None,
        }
    }

    pub fn set_id(&mut self, id: &str) {
        self.set(FIELD_ID, Value::String(id.to_string()));
    }

    pub fn set_image_url(&mut self, url: &str) {
        self.set(FIELD_IMAGE_URL, Value::String(url.to_string()));
    }

    pub fn clear_image_url(&mut self) {
        self.fields.shift_remove(FIELD_IMAGE_URL);
    }

    pub fn set_visual_tags(&mut self, tags: &[String]) {
        self.set(FIELD_VISUAL_TAGS, string_array(tags));
    }

    pub fn set_similar_items(&mut self, ids: &[String]) {
        self.set(FIELD_SIMILAR_ITEMS, string_array(ids));
    }

    pub fn clear_similar_items(&mut self) {
        self.fields.shift_remove(FIELD_SIMILAR_ITEMS);
    }

    pub fn set_detection(&mut self, found_by: &[&str], confidence: f32) {
        self.set(
            FIELD_FOUND_BY,
            Value::Array(found_by.iter().map(|s| Value::String(s.to_string())).collect()),
        );
        let rounded = (f64::from(confidence) * 10_000.0).round() / 10_000.0;
        self.set(FIELD_DETECTION_CONFIDENCE, Value::from(rounded));
    }

    fn set(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
    }
}

fn string_array(values: &[String]) -> Value {
    Value::Array(values.iter().cloned().map(Value::String).collect())
}
