//! Endpoint messages.

use crate::cursor::Cursor;
use crate::error::{ProtocolError, ProtocolResult};
use crate::record::RecordBatch;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Push channel coordinates returned by the connection-info endpoint.
///
/// The URL may embed short-lived credentials, so it is fetched again for
/// every connect attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Channel URL (`ws://` or `wss://`).
    pub url: String,
    /// Sub-protocol to negotiate, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

impl ConnectionInfo {
    /// Creates connection info without a sub-protocol.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            protocol: None,
        }
    }

    /// Sets the sub-protocol.
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }
}

/// Result of one pull cycle.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PullResponse {
    /// Records changed since the requested cursor.
    pub records: RecordBatch,
    /// Cursor to send on the next fetch, if the server issued one.
    pub next_cursor: Option<Cursor>,
}

impl PullResponse {
    /// Creates a pull response.
    pub fn new(records: impl Into<RecordBatch>, next_cursor: Option<Cursor>) -> Self {
        Self {
            records: records.into(),
            next_cursor,
        }
    }
}

/// Field names of the pull endpoint's response body.
///
/// The message list answers `{"messages": [...], "version": 7}`; plain
/// collection endpoints answer with a bare array and issue no cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullShape {
    /// Field holding the record array.
    pub records_field: String,
    /// Field holding the next cursor.
    pub version_field: String,
}

impl PullShape {
    /// Creates a shape with custom field names.
    pub fn new(records_field: impl Into<String>, version_field: impl Into<String>) -> Self {
        Self {
            records_field: records_field.into(),
            version_field: version_field.into(),
        }
    }

    /// Decodes a pull response body.
    pub fn decode(&self, body: Value) -> ProtocolResult<PullResponse> {
        match body {
            Value::Array(records) => Ok(PullResponse::new(records, None)),
            Value::Object(mut map) => {
                let records = match map.remove(&self.records_field) {
                    Some(Value::Array(records)) => records,
                    Some(_) => {
                        return Err(ProtocolError::invalid_structure(format!(
                            "field '{}' is not an array",
                            self.records_field
                        )))
                    }
                    None => {
                        return Err(ProtocolError::invalid_structure(format!(
                            "missing field '{}'",
                            self.records_field
                        )))
                    }
                };
                let next_cursor = map
                    .remove(&self.version_field)
                    .and_then(Cursor::from_value);
                Ok(PullResponse::new(records, next_cursor))
            }
            _ => Err(ProtocolError::invalid_structure(
                "pull response must be an object or an array",
            )),
        }
    }

    /// Decodes a pull response from its JSON text.
    pub fn decode_str(&self, body: &str) -> ProtocolResult<PullResponse> {
        self.decode(serde_json::from_str(body)?)
    }
}

impl Default for PullShape {
    fn default() -> Self {
        Self::new("messages", "version")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn connection_info_decodes_optional_protocol() {
        let info: ConnectionInfo =
            serde_json::from_str(r#"{"url":"ws://localhost:8000/notifications/feed"}"#).unwrap();
        assert_eq!(info.protocol, None);

        let info: ConnectionInfo = serde_json::from_str(
            r#"{"url":"wss://hub.webpubsub.azure.com/client?access_token=t","protocol":"json.webpubsub.azure.v1"}"#,
        )
        .unwrap();
        assert_eq!(info.protocol.as_deref(), Some("json.webpubsub.azure.v1"));
    }

    #[test]
    fn decode_versioned_response() {
        let body = json!({
            "version": 7,
            "messages": [{"version": 7, "message": {"id": "a"}}]
        });
        let response = PullShape::default().decode(body).unwrap();
        assert_eq!(response.records.len(), 1);
        assert_eq!(response.next_cursor, Some(Cursor::from(7)));
    }

    #[test]
    fn decode_empty_heartbeat_keeps_cursor() {
        let response = PullShape::default()
            .decode_str(r#"{"version":"v9","messages":[]}"#)
            .unwrap();
        assert!(response.records.is_empty());
        assert_eq!(response.next_cursor, Some(Cursor::from("v9")));
    }

    #[test]
    fn decode_custom_shape() {
        let shape = PullShape::new("records", "cursor");
        let response = shape
            .decode(json!({"records": [{"id": 1}], "cursor": null}))
            .unwrap();
        assert_eq!(response.records.len(), 1);
        assert_eq!(response.next_cursor, None);
    }

    #[test]
    fn decode_bare_array() {
        let response = PullShape::default()
            .decode(json!([{"id": "o1"}, {"id": "o2"}]))
            .unwrap();
        assert_eq!(response.records.len(), 2);
        assert_eq!(response.next_cursor, None);
    }

    #[test]
    fn decode_rejects_bad_shapes() {
        let shape = PullShape::default();
        assert!(shape.decode(json!({"version": 1})).is_err());
        assert!(shape.decode(json!({"messages": {}})).is_err());
        assert!(shape.decode(json!("text")).is_err());
        assert!(matches!(
            shape.decode_str("nope"),
            Err(ProtocolError::InvalidJson(_))
        ));
    }
}
