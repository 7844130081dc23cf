//! # tablesync Protocol
//!
//! Wire types and pure transformations for tablesync.
//!
//! This crate provides:
//! - Envelope normalization for bare and Web PubSub framed payloads
//! - `RecordBatch` and `KeyPath` for keyed records
//! - `Cursor`, the opaque pull bookmark
//! - Endpoint messages (`ConnectionInfo`, `PullResponse`)
//! - Structural validation of outgoing records
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cursor;
mod envelope;
mod error;
mod messages;
mod record;
mod validation;

pub use cursor::Cursor;
pub use envelope::{normalize, Envelope, FrameProtocol, WEBPUBSUB_JSON_PROTOCOL};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{ConnectionInfo, PullResponse, PullShape};
pub use record::{KeyPath, RecordBatch, RecordKey};
pub use validation::{RequiredFields, ValidationError};
