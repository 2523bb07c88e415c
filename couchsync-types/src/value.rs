//! Typed document values.
//!
//! Documents in the store are schema-less JSON objects. Instead of passing
//! raw `serde_json::Value` maps around, every field is decoded into a
//! [`FieldValue`] and kept in an insertion-ordered [`Document`], so a
//! document re-serializes with the same field order it was read with.

use chrono::{DateTime, FixedOffset, SecondsFormat};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Number, Value};
use std::borrow::Cow;

use crate::{Error, ID_FIELD, REV_FIELD, Result};

/// A single field value inside a [`Document`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    /// JSON number, kept exactly as decoded (integer vs float preserved).
    Number(Number),
    Bool(bool),
    /// RFC 3339 timestamp. Only strings whose canonical RFC 3339 form
    /// round-trips exactly decode into this variant.
    Timestamp(DateTime<FixedOffset>),
    Null,
    /// Nested arrays and objects, passed through verbatim.
    Structured(Value),
}

impl FieldValue {
    /// Returns true for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Returns the string contents if this is a `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Textual form of the value, as a host would print it.
    /// `Null` renders as the empty string.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            FieldValue::String(s) => Cow::Borrowed(s),
            FieldValue::Number(n) => Cow::Owned(n.to_string()),
            FieldValue::Bool(b) => Cow::Owned(b.to_string()),
            FieldValue::Timestamp(ts) => Cow::Owned(format_timestamp(ts)),
            FieldValue::Null => Cow::Borrowed(""),
            FieldValue::Structured(v) => Cow::Owned(v.to_string()),
        }
    }

    /// String form used when the value identifies a document.
    /// Returns `None` for `Null`.
    pub fn to_key_string(&self) -> Option<String> {
        if self.is_null() {
            return None;
        }
        Some(self.as_text().into_owned())
    }

    /// Converts back into a plain JSON value.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Number(n) => Value::Number(n.clone()),
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Timestamp(ts) => Value::String(format_timestamp(ts)),
            FieldValue::Null => Value::Null,
            FieldValue::Structured(v) => v.clone(),
        }
    }

    /// Short name of the variant, for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::String(_) => "string",
            FieldValue::Number(_) => "number",
            FieldValue::Bool(_) => "bool",
            FieldValue::Timestamp(_) => "timestamp",
            FieldValue::Null => "null",
            FieldValue::Structured(_) => "structured",
        }
    }
}

fn format_timestamp(ts: &DateTime<FixedOffset>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_timestamp(s: &str) -> Option<DateTime<FixedOffset>> {
    let ts = DateTime::parse_from_rfc3339(s).ok()?;
    (format_timestamp(&ts) == s).then_some(ts)
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => FieldValue::Number(n),
            Value::String(s) => match parse_timestamp(&s) {
                Some(ts) => FieldValue::Timestamp(ts),
                None => FieldValue::String(s),
            },
            other @ (Value::Array(_) | Value::Object(_)) => FieldValue::Structured(other),
        }
    }
}

impl From<&FieldValue> for Value {
    fn from(value: &FieldValue) -> Self {
        value.to_json()
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Number(n.into())
    }
}

impl From<f64> for FieldValue {
    /// Non-finite floats have no JSON form and become `Null`.
    fn from(n: f64) -> Self {
        Number::from_f64(n).map_or(FieldValue::Null, FieldValue::Number)
    }
}

impl From<DateTime<FixedOffset>> for FieldValue {
    fn from(ts: DateTime<FixedOffset>) -> Self {
        FieldValue::Timestamp(ts)
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            FieldValue::String(s) => serializer.serialize_str(s),
            FieldValue::Number(n) => n.serialize(serializer),
            FieldValue::Bool(b) => serializer.serialize_bool(*b),
            FieldValue::Timestamp(ts) => serializer.serialize_str(&format_timestamp(ts)),
            FieldValue::Null => serializer.serialize_unit(),
            FieldValue::Structured(v) => v.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Value::deserialize(deserializer).map(FieldValue::from)
    }
}

/// A flat, insertion-ordered mapping from field name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(IndexMap<String, FieldValue>);

impl Document {
    /// Creates an empty document.
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Parses a document from JSON text. The text must be a JSON object.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_json_value(value)
    }

    /// Converts a JSON object into a document.
    pub fn from_json_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(map
                .into_iter()
                .map(|(k, v)| (k, FieldValue::from(v)))
                .collect()),
            other => Err(Error::NotAnObject(json_kind(&other).to_string())),
        }
    }

    /// Converts the document back into a JSON object.
    pub fn to_json_value(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field)
    }

    /// Inserts a field, keeping the original position if it already exists.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Option<FieldValue> {
        self.0.insert(field.into(), value.into())
    }

    /// Removes a field, preserving the order of the remaining ones.
    pub fn remove(&mut self, field: &str) -> Option<FieldValue> {
        self.0.shift_remove(field)
    }

    pub fn contains_key(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, FieldValue> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// The store-assigned identity, if present.
    pub fn id(&self) -> Option<&str> {
        self.get(ID_FIELD).and_then(FieldValue::as_str)
    }

    /// The current revision token, if present.
    pub fn rev(&self) -> Option<&str> {
        self.get(REV_FIELD).and_then(FieldValue::as_str)
    }

    /// Drops the reserved identity and revision fields.
    pub fn strip_reserved(&mut self) {
        self.remove(ID_FIELD);
        self.remove(REV_FIELD);
    }

    /// Returns a copy of this document carrying the given revision token.
    pub fn with_revision(mut self, rev: impl Into<String>) -> Self {
        self.insert(REV_FIELD, FieldValue::String(rev.into()));
        self
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl FromIterator<(String, FieldValue)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Document {
    type Item = (String, FieldValue);
    type IntoIter = indexmap::map::IntoIter<String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = (&'a String, &'a FieldValue);
    type IntoIter = indexmap::map::Iter<'a, String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
