//! # Tablesync Engine
//!
//! Real-time table synchronization for keyed JSON collections.
//!
//! This crate provides:
//! - Push channel connection manager with reconnect and backoff
//! - Cursor-based incremental fetching over HTTP
//! - Keyed reconciliation into a view (insert or replace, never duplicate)
//! - Sync orchestration for push, pull and push-with-fallback modes
//! - Transport abstraction with scripted implementations for tests
//!
//! ## Architecture
//!
//! Records reach a view along two paths:
//! 1. Push: a WebSocket channel delivers frames, which are normalized into
//!    record batches
//! 2. Pull: the collection is fetched after the last seen cursor
//!
//! Both paths hand batches to the same reconciliation step, which is the
//! only writer of view state.
//!
//! ## Key Invariants
//!
//! - A view holds at most one record per key
//! - Reconciling the same batch twice changes nothing
//! - The cursor only advances after its batch was reconciled
//! - A connection reconnects until it is closed

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connection;
mod error;
mod http;
mod orchestrator;
mod reconcile;
mod transport;
mod ws;

pub use config::{RetryConfig, SyncConfig};
pub use connection::{ConnectionHandle, ConnectionManager, ConnectionState, ConnectionStats};
pub use error::{SyncError, SyncResult};
pub use http::{CollectionClient, CursorFetcher, HttpClient, HttpEndpointResolver};
pub use orchestrator::{shared_view, SharedView, SyncMode, SyncOrchestrator, SyncSession, SyncStats};
pub use reconcile::{reconcile, MemoryView, ReconcileOutcome, ViewSink};
pub use transport::{
    CollectionSource, EndpointResolver, PushConnector, PushStream, ScriptedCollection,
    ScriptedConnector, ScriptedSession, StaticResolver,
};
pub use ws::WebSocketConnector;
