//! Transport abstractions for the push and pull paths.
//!
//! The engine never talks to the network directly. It resolves push channel
//! coordinates through an [`EndpointResolver`], opens the channel through a
//! [`PushConnector`] and reads the collection through a [`CollectionSource`].
//! HTTP and WebSocket implementations live in [`crate::http`] and
//! [`crate::ws`]; the scripted implementations here drive tests.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use tablesync_protocol::{ConnectionInfo, Cursor, PullResponse};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Inbound text frames of one open push channel.
///
/// The stream ending means the channel closed; an `Err` item means it failed.
/// Either way the channel is finished.
pub type PushStream = BoxStream<'static, SyncResult<String>>;

/// Produces fresh push channel coordinates.
#[async_trait]
pub trait EndpointResolver: Send + Sync {
    /// Fetches the channel URL and sub-protocol for one connect attempt.
    async fn resolve(&self) -> SyncResult<ConnectionInfo>;
}

/// Opens push channels.
#[async_trait]
pub trait PushConnector: Send + Sync {
    /// Opens a channel; returns once the transport is open.
    async fn connect(&self, info: &ConnectionInfo) -> SyncResult<PushStream>;
}

/// Reads the collection incrementally.
#[async_trait]
pub trait CollectionSource: Send + Sync {
    /// Fetches everything after `cursor`, or the full collection for `None`.
    async fn fetch(&self, cursor: Option<&Cursor>) -> SyncResult<PullResponse>;
}

/// A resolver that always returns the same coordinates.
#[derive(Debug)]
pub struct StaticResolver {
    info: ConnectionInfo,
    failures: AtomicUsize,
    calls: AtomicUsize,
}

impl StaticResolver {
    /// Creates a resolver for fixed coordinates.
    pub fn new(info: ConnectionInfo) -> Self {
        Self {
            info,
            failures: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Makes the next `count` resolve calls fail.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Number of resolve calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EndpointResolver for StaticResolver {
    async fn resolve(&self) -> SyncResult<ConnectionInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SyncError::http(503, "Service Unavailable"));
        }
        Ok(self.info.clone())
    }
}

/// One scripted outcome of a connect call.
#[derive(Debug)]
pub enum ScriptedSession {
    /// The connect attempt fails.
    Refuse(String),
    /// The channel opens, delivers the frames and closes.
    Frames(Vec<String>),
    /// The channel opens, delivers the frames and stays open.
    Hold(Vec<String>),
    /// The channel opens and delivers whatever the sender pushes.
    /// Dropping the sender closes the channel.
    Live(mpsc::UnboundedReceiver<SyncResult<String>>),
}

/// A connector that plays back scripted sessions in order.
///
/// Once the script is exhausted every further connect opens an idle
/// channel that never closes.
#[derive(Debug, Default)]
pub struct ScriptedConnector {
    script: Mutex<VecDeque<ScriptedSession>>,
    connects: Mutex<Vec<(Instant, ConnectionInfo)>>,
}

impl ScriptedConnector {
    /// Creates an empty connector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a session to the script.
    pub fn push(&self, session: ScriptedSession) {
        self.script.lock().push_back(session);
    }

    /// Appends a live session and returns its frame sender.
    pub fn push_live(&self) -> mpsc::UnboundedSender<SyncResult<String>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.push(ScriptedSession::Live(rx));
        tx
    }

    /// Number of connect calls so far.
    pub fn connect_count(&self) -> usize {
        self.connects.lock().len()
    }

    /// Time and coordinates of every connect call.
    pub fn connects(&self) -> Vec<(Instant, ConnectionInfo)> {
        self.connects.lock().clone()
    }
}

#[async_trait]
impl PushConnector for ScriptedConnector {
    async fn connect(&self, info: &ConnectionInfo) -> SyncResult<PushStream> {
        self.connects.lock().push((Instant::now(), info.clone()));
        let next = self.script.lock().pop_front();
        match next {
            Some(ScriptedSession::Refuse(message)) => Err(SyncError::transport_retryable(message)),
            Some(ScriptedSession::Frames(frames)) => {
                Ok(stream::iter(frames.into_iter().map(Ok)).boxed())
            }
            Some(ScriptedSession::Hold(frames)) => Ok(stream::iter(frames.into_iter().map(Ok))
                .chain(stream::pending())
                .boxed()),
            Some(ScriptedSession::Live(rx)) => Ok(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .boxed()),
            None => Ok(stream::pending().boxed()),
        }
    }
}

/// A collection source that plays back scripted responses in order.
///
/// Once the script is exhausted it answers with empty batches that keep
/// the requested cursor.
#[derive(Debug, Default)]
pub struct ScriptedCollection {
    script: Mutex<VecDeque<Result<PullResponse, u16>>>,
    requests: Mutex<Vec<Option<Cursor>>>,
}

impl ScriptedCollection {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a successful response.
    pub fn push_response(&self, response: PullResponse) {
        self.script.lock().push_back(Ok(response));
    }

    /// Appends a failed response with the given HTTP status.
    pub fn push_failure(&self, status: u16) {
        self.script.lock().push_back(Err(status));
    }

    /// Cursors sent with every fetch so far.
    pub fn requests(&self) -> Vec<Option<Cursor>> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl CollectionSource for ScriptedCollection {
    async fn fetch(&self, cursor: Option<&Cursor>) -> SyncResult<PullResponse> {
        self.requests.lock().push(cursor.cloned());
        let next = self.script.lock().pop_front();
        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(status)) => Err(SyncError::http(status, "scripted failure")),
            None => Ok(PullResponse::new(Vec::new(), cursor.cloned())),
        }
    }
}
