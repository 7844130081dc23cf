//! Opaque pull cursor.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A server-issued bookmark for the pull endpoint.
///
/// The client never interprets a cursor; it only hands it back on the next
/// fetch. The server currently issues integers, but strings are accepted
/// as well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(Value);

impl Cursor {
    /// Wraps a raw cursor value.
    ///
    /// Returns `None` for JSON `null`, which means "from the beginning".
    pub fn from_value(value: Value) -> Option<Self> {
        if value.is_null() {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Returns the raw cursor value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Renders the cursor for use as a query parameter value.
    pub fn to_query_value(&self) -> String {
        match &self.0 {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query_value())
    }
}

impl From<&str> for Cursor {
    fn from(value: &str) -> Self {
        Self(Value::String(value.to_string()))
    }
}

impl From<i64> for Cursor {
    fn from(value: i64) -> Self {
        Self(Value::from(value))
    }
}
