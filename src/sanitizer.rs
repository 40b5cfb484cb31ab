//! Metadata normalization.
//!
//! Events carry free-form metadata (`serde_json::Value` per key). Records may
//! only store strings, so [`MetadataSanitizer`] flattens every value into its
//! textual form and drops absent ones.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

/// A metadata value stored on a [`Record`](crate::Record).
///
/// Sanitized event metadata is always [`MetaValue::Text`]. The only nested
/// value is the actor sub-mapping stored under the reserved `user_meta` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaValue {
    /// A flat string value
    Text(String),
    /// A nested mapping
    Map(Metadata),
}

impl MetaValue {
    /// Returns the string value, if this is a text entry.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetaValue::Text(s) => Some(s),
            MetaValue::Map(_) => None,
        }
    }

    /// Returns the nested mapping, if this is a map entry.
    pub fn as_map(&self) -> Option<&Metadata> {
        match self {
            MetaValue::Text(_) => None,
            MetaValue::Map(m) => Some(m),
        }
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        MetaValue::Text(s)
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        MetaValue::Text(s.to_string())
    }
}

impl From<Metadata> for MetaValue {
    fn from(m: Metadata) -> Self {
        MetaValue::Map(m)
    }
}

impl Serialize for MetaValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MetaValue::Text(s) => serializer.serialize_str(s),
            MetaValue::Map(m) => m.serialize(serializer),
        }
    }
}

/// An insertion-ordered mapping of string keys to metadata values.
///
/// Keys are unique. Inserting an existing key replaces its value in place,
/// so the original position is kept.
///
/// # Examples
///
/// ```
/// use audit_core::{Metadata, MetaValue};
///
/// let mut meta = Metadata::new();
/// meta.insert("post_title", "Hello");
/// meta.insert("post_type", "page");
/// meta.insert("post_title", "Hello again");
///
/// let keys: Vec<&str> = meta.keys().collect();
/// assert_eq!(keys, vec!["post_title", "post_type"]);
/// assert_eq!(meta.get_text("post_title"), Some("Hello again"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<(String, MetaValue)>,
}

impl Metadata {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, replacing any existing value for the key.
    ///
    /// Returns the previous value, if there was one.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<MetaValue>,
    ) -> Option<MetaValue> {
        let key = key.into();
        let value = value.into();

        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Returns the value for a key.
    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Returns the value for a key when it is a text entry.
    pub fn get_text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(MetaValue::as_text)
    }

    /// Removes a key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<MetaValue> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    /// Returns `true` if the key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Iterates over the keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Iterates over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetaValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Converts the mapping into a JSON object, nesting sub-mappings.
    pub fn to_json(&self) -> Map<String, Value> {
        self.entries
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    MetaValue::Text(s) => Value::String(s.clone()),
                    MetaValue::Map(m) => Value::Object(m.to_json()),
                };
                (k.clone(), value)
            })
            .collect()
    }
}

impl<K, V> FromIterator<(K, V)> for Metadata
where
    K: Into<String>,
    V: Into<MetaValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut meta = Metadata::new();
        for (k, v) in iter {
            meta.insert(k, v);
        }
        meta
    }
}

impl Serialize for Metadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Flattens event metadata into string values.
///
/// - `null` values are dropped
/// - strings pass through unchanged
/// - numbers and booleans use their textual form
/// - arrays and objects are encoded as compact JSON, preserving key order
///
/// Sanitization is pure and keeps the order of the surviving keys.
///
/// # Examples
///
/// ```
/// use audit_core::MetadataSanitizer;
/// use serde_json::json;
///
/// let raw = json!({ "tags": ["a", "b"], "empty": null, "count": 3 });
/// let meta = MetadataSanitizer.sanitize(raw.as_object().unwrap());
///
/// assert_eq!(meta.get_text("tags"), Some(r#"["a","b"]"#));
/// assert_eq!(meta.get_text("count"), Some("3"));
/// assert!(!meta.contains_key("empty"));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataSanitizer;

impl MetadataSanitizer {
    /// Sanitizes a raw metadata mapping.
    pub fn sanitize(&self, raw: &Map<String, Value>) -> Metadata {
        raw.iter()
            .filter_map(|(key, value)| stringify(value).map(|s| (key.clone(), s)))
            .collect()
    }
}

/// Returns the stored text for a metadata value, or `None` when it is absent.
pub(crate) fn stringify(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        // Value's Display is the compact serde_json encoding and cannot fail.
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}
