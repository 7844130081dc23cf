//! Keyed records and record batches.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The stable unique key of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordKey(String);

impl RecordKey {
    /// Creates a key from its string form.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RecordKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Location of the unique key inside a record, as a JSON pointer.
///
/// Flat records use `/id`; the message list nests its key as `/message/id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPath(String);

impl KeyPath {
    /// Creates a key path from a JSON pointer.
    ///
    /// A bare field name such as `id` is accepted and treated as `/id`.
    pub fn new(pointer: impl Into<String>) -> Self {
        let pointer = pointer.into();
        if pointer.is_empty() || pointer.starts_with('/') {
            Self(pointer)
        } else {
            Self(format!("/{pointer}"))
        }
    }

    /// Returns the JSON pointer.
    pub fn as_pointer(&self) -> &str {
        &self.0
    }

    /// Extracts the key from a record.
    ///
    /// String keys are used verbatim and integer keys in decimal form.
    /// Empty strings and any other value shape count as missing.
    pub fn extract(&self, record: &Value) -> Option<RecordKey> {
        match record.pointer(&self.0)? {
            Value::String(s) if !s.is_empty() => Some(RecordKey::new(s.as_str())),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(RecordKey::new(n.to_string())),
            _ => None,
        }
    }

    /// Extracts the key from a record, failing if it is absent.
    pub fn require(&self, index: usize, record: &Value) -> ProtocolResult<RecordKey> {
        self.extract(record).ok_or_else(|| ProtocolError::MissingKey {
            index,
            path: self.0.clone(),
        })
    }
}

impl Default for KeyPath {
    fn default() -> Self {
        Self::new("/id")
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An ordered batch of records delivered by push or pull.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordBatch {
    records: Vec<Value>,
}

impl RecordBatch {
    /// Creates a batch from records.
    pub fn new(records: Vec<Value>) -> Self {
        Self { records }
    }

    /// Builds a batch from a normalized payload.
    ///
    /// An array yields one record per element; anything else is a single record.
    pub fn from_payload(payload: Value) -> Self {
        match payload {
            Value::Array(records) => Self { records },
            other => Self {
                records: vec![other],
            },
        }
    }

    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the batch has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates over the records in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.records.iter()
    }

    /// Returns the records as a slice.
    pub fn records(&self) -> &[Value] {
        &self.records
    }

    /// Consumes the batch, returning its records.
    pub fn into_records(self) -> Vec<Value> {
        self.records
    }
}

impl From<Vec<Value>> for RecordBatch {
    fn from(records: Vec<Value>) -> Self {
        Self::new(records)
    }
}

impl IntoIterator for RecordBatch {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a RecordBatch {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
