//! Structural validation of records before submission.

use serde_json::Value;
use thiserror::Error;

/// A record failed validation.
///
/// Carries every violation found, not just the first.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("record validation failed: {}", .errors.join("; "))]
pub struct ValidationError {
    /// Human-readable violations, in rule order.
    pub errors: Vec<String>,
}

/// Presence rules for an outgoing record.
///
/// Rules are JSON pointers. A required field must exist and be neither
/// `null` nor an empty string. An element rule requires an array whose
/// elements are all non-null.
///
/// ```
/// use tablesync_protocol::RequiredFields;
/// use serde_json::json;
///
/// let rules = RequiredFields::new()
///     .require("/id")
///     .require("/customer")
///     .require_elements("/items");
///
/// let err = rules.check(&json!({"id": "", "items": [null]})).unwrap_err();
/// assert_eq!(err.errors.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredFields {
    fields: Vec<String>,
    elements: Vec<String>,
}

impl RequiredFields {
    /// Creates an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires a field to be present and non-empty.
    pub fn require(mut self, pointer: impl Into<String>) -> Self {
        self.fields.push(pointer.into());
        self
    }

    /// Requires an array whose elements are all non-null.
    pub fn require_elements(mut self, pointer: impl Into<String>) -> Self {
        self.elements.push(pointer.into());
        self
    }

    /// Returns true if no rules are configured.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.elements.is_empty()
    }

    /// Checks a record against every rule.
    pub fn check(&self, record: &Value) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        for pointer in &self.fields {
            match record.pointer(pointer) {
                None | Some(Value::Null) => errors.push(format!("{pointer} is missing")),
                Some(Value::String(s)) if s.is_empty() => {
                    errors.push(format!("{pointer} is empty"))
                }
                Some(_) => {}
            }
        }

        for pointer in &self.elements {
            match record.pointer(pointer) {
                Some(Value::Array(items)) => {
                    for (i, item) in items.iter().enumerate() {
                        if item.is_null() {
                            errors.push(format!("{pointer}/{i} is null"));
                        }
                    }
                }
                _ => errors.push(format!("{pointer} is not a list")),
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { errors })
        }
    }
}
