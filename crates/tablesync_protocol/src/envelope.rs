//! Envelope normalization for inbound push frames.
//!
//! A push frame arrives in one of two shapes depending on the sub-protocol
//! negotiated when the channel was opened:
//!
//! - **Bare**: the frame body is the payload itself.
//! - **Web PubSub JSON** (`json.webpubsub.azure.v1`): the payload is wrapped
//!   in a broker envelope and only server-originated JSON messages carry data.
//!   System, group and ack frames normalize to nothing.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sub-protocol that selects broker envelope unwrapping.
pub const WEBPUBSUB_JSON_PROTOCOL: &str = "json.webpubsub.azure.v1";

/// Broker envelope as sent by Azure Web PubSub.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Envelope {
    /// Frame type (`message`, `system`, `ack`, ...).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Origin of the frame (`server`, `group`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Encoding of `data` (`json`, `text`, `binary`).
    #[serde(rename = "dataType", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    /// The wrapped payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    /// Wraps a payload the way the broker delivers server messages.
    pub fn server_message(data: Value) -> Self {
        Self {
            kind: Some("message".into()),
            from: Some("server".into()),
            data_type: Some("json".into()),
            data: Some(data),
        }
    }

    /// Returns true if this envelope carries server JSON data.
    pub fn is_server_json(&self) -> bool {
        self.kind.as_deref() == Some("message")
            && self.from.as_deref() == Some("server")
            && self.data_type.as_deref() == Some("json")
    }

    /// Consumes the envelope, returning its payload if it carries one.
    pub fn into_payload(self) -> Option<Value> {
        if self.is_server_json() {
            self.data
        } else {
            None
        }
    }
}

/// Frame shape selected by the negotiated sub-protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameProtocol {
    /// The frame body is the payload.
    Bare,
    /// The frame body is a Web PubSub JSON envelope.
    WebPubSubJson,
}

impl FrameProtocol {
    /// Selects the frame shape for a negotiated sub-protocol.
    ///
    /// Anything other than the exact Web PubSub protocol name is bare.
    pub fn from_subprotocol(protocol: Option<&str>) -> Self {
        match protocol {
            Some(WEBPUBSUB_JSON_PROTOCOL) => FrameProtocol::WebPubSubJson,
            _ => FrameProtocol::Bare,
        }
    }

    /// Extracts the payload from a frame body.
    ///
    /// `Ok(None)` means the frame was well formed but carries nothing to apply.
    pub fn normalize(self, frame: &str) -> ProtocolResult<Option<Value>> {
        let value: Value = serde_json::from_str(frame)?;
        match self {
            FrameProtocol::Bare => Ok(Some(value)),
            FrameProtocol::WebPubSubJson => {
                if !value.is_object() {
                    return Err(ProtocolError::invalid_structure(
                        "broker envelope must be a json object",
                    ));
                }
                let envelope: Envelope = serde_json::from_value(value)
                    .map_err(|e| ProtocolError::invalid_structure(e.to_string()))?;
                Ok(envelope.into_payload())
            }
        }
    }
}

/// Normalizes a raw push frame into its payload.
///
/// See [`FrameProtocol::normalize`].
pub fn normalize(frame: &str, protocol: Option<&str>) -> ProtocolResult<Option<Value>> {
    FrameProtocol::from_subprotocol(protocol).normalize(frame)
}
