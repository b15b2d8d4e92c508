// Member records and their field values

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Candidate field values keyed by field id (the shape `add`/`update` accept)
pub type Payload = BTreeMap<String, FieldValue>;

/// Value stored under a field id
///
/// Serialized untagged, so a record reads as plain JSON strings and booleans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Flag(bool),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Flag(_) => None,
        }
    }

    /// True for the empty string; booleans are never empty
    pub fn is_empty(&self) -> bool {
        matches!(self, FieldValue::Text(s) if s.is_empty())
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Flag(b)
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::Flag(b) => write!(f, "{}", b),
        }
    }
}

/// One member entry: a store-assigned id plus field values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(flatten)]
    pub values: Payload,
}

impl Record {
    pub fn new(id: impl Into<String>, values: Payload) -> Self {
        Self { id: id.into(), values }
    }

    pub fn get(&self, field_id: &str) -> Option<&FieldValue> {
        self.values.get(field_id)
    }

    /// Shallow merge: every key in `patch` replaces the current value
    pub fn merge(&mut self, patch: Payload) {
        self.values.extend(patch);
    }
}

/// Build a payload from `(field id, value)` pairs
pub fn payload<I, K, V>(pairs: I) -> Payload
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<FieldValue>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}
