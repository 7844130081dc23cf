//! Push channel connection manager.
//!
//! A [`ConnectionManager`] keeps one logical push connection alive. Every
//! attempt resolves fresh [`ConnectionInfo`], opens a transport with the
//! negotiated sub-protocol and feeds each inbound frame through the envelope
//! normalizer. Close, error, resolve failure and connect timeout all lead to
//! the same place: wait out the backoff and try again, until the handle is
//! closed.
//!
//! ```text
//! Idle -> Connecting -> Open -> Closing -> RetryPending -> Connecting -> ...
//!                  \__________(attempt failed)___/
//! ```

use crate::config::RetryConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::{EndpointResolver, PushConnector, PushStream};
use futures::StreamExt;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tablesync_protocol::{ConnectionInfo, FrameProtocol, RecordBatch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// State of a logical push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No attempt in progress; the manager has stopped.
    Idle,
    /// Resolving coordinates and opening the transport.
    Connecting,
    /// The transport is open and frames are flowing.
    Open,
    /// The transport closed or failed and is being discarded.
    Closing,
    /// Waiting out the backoff before the next attempt.
    RetryPending,
}

impl ConnectionState {
    /// Returns true while frames can be delivered.
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

/// Counters for one logical connection.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    /// Connect attempts started.
    pub attempts: u64,
    /// Attempts that reached `Open`.
    pub opened: u64,
    /// Reconnects scheduled after a close, error or failed attempt.
    pub reconnects: u64,
    /// Text frames received.
    pub frames_received: u64,
    /// Frames dropped because they could not be decoded.
    pub frames_dropped: u64,
    /// Batches handed to the callback.
    pub batches_delivered: u64,
    /// Last transport error message.
    pub last_error: Option<String>,
}

#[derive(Debug)]
struct Shared {
    state: RwLock<ConnectionState>,
    stats: RwLock<ConnectionStats>,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: RwLock::new(ConnectionState::Idle),
            stats: RwLock::new(ConnectionStats::default()),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    fn record_error(&self, error: &SyncError) {
        self.stats.write().last_error = Some(error.to_string());
    }
}

/// Keeps a push channel connected and delivers decoded batches.
pub struct ConnectionManager<R, C> {
    resolver: Arc<R>,
    connector: Arc<C>,
    retry: RetryConfig,
    connect_timeout: Duration,
}

impl<R, C> ConnectionManager<R, C>
where
    R: EndpointResolver + 'static,
    C: PushConnector + 'static,
{
    /// Creates a manager with the default retry policy.
    pub fn new(resolver: R, connector: C) -> Self {
        Self::from_shared(Arc::new(resolver), Arc::new(connector))
    }

    /// Creates a manager around shared collaborators.
    pub fn from_shared(resolver: Arc<R>, connector: Arc<C>) -> Self {
        Self {
            resolver,
            connector,
            retry: RetryConfig::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Sets the reconnect backoff.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Bounds each resolve-and-connect attempt.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Starts the connection loop.
    ///
    /// `on_batch` is called once per inbound frame that carries records, in
    /// wire order. Must be called within a Tokio runtime.
    pub fn connect<F>(&self, on_batch: F) -> ConnectionHandle
    where
        F: FnMut(RecordBatch) + Send + 'static,
    {
        self.connect_with_cancel(CancellationToken::new(), on_batch)
    }

    /// Starts the connection loop under an existing cancellation token.
    pub fn connect_with_cancel<F>(&self, cancel: CancellationToken, on_batch: F) -> ConnectionHandle
    where
        F: FnMut(RecordBatch) + Send + 'static,
    {
        let shared = Arc::new(Shared::new());
        let task = tokio::spawn(run_connection(
            Arc::clone(&self.resolver),
            Arc::clone(&self.connector),
            self.retry.clone(),
            self.connect_timeout,
            Arc::clone(&shared),
            cancel.clone(),
            on_batch,
        ));

        ConnectionHandle {
            shared,
            cancel,
            task: Some(task),
        }
    }
}

/// Handle to a running connection loop.
///
/// Dropping the handle cancels the loop; [`ConnectionHandle::close`] also
/// waits for it to finish, after which the callback never fires again.
#[derive(Debug)]
pub struct ConnectionHandle {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ConnectionHandle {
    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.read()
    }

    /// Returns true while the transport is open.
    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// Snapshot of the connection counters.
    pub fn stats(&self) -> ConnectionStats {
        self.shared.stats.read().clone()
    }

    /// Signals the loop to stop without waiting.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Stops the loop and waits until it has exited.
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "connection task ended abnormally");
            }
        }
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum SessionEnd {
    Cancelled,
    Closed,
    Failed(SyncError),
}

async fn run_connection<R, C, F>(
    resolver: Arc<R>,
    connector: Arc<C>,
    retry: RetryConfig,
    connect_timeout: Duration,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    mut on_batch: F,
) where
    R: EndpointResolver + ?Sized,
    C: PushConnector + ?Sized,
    F: FnMut(RecordBatch) + Send,
{
    let mut failures: u32 = 0;

    loop {
        shared.set_state(ConnectionState::Connecting);
        shared.stats.write().attempts += 1;

        let attempt = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = tokio::time::timeout(
                connect_timeout,
                open_channel(&*resolver, &*connector),
            ) => result.unwrap_or(Err(SyncError::Timeout)),
        };

        match attempt {
            Ok((info, stream)) => {
                failures = 0;
                shared.set_state(ConnectionState::Open);
                shared.stats.write().opened += 1;
                info!(url = %redact(&info.url), protocol = ?info.protocol, "push channel open");

                let protocol = FrameProtocol::from_subprotocol(info.protocol.as_deref());
                let end = pump_frames(stream, protocol, &shared, &cancel, &mut on_batch).await;
                shared.set_state(ConnectionState::Closing);

                match end {
                    SessionEnd::Cancelled => break,
                    SessionEnd::Closed => info!("push channel closed, reconnecting"),
                    SessionEnd::Failed(e) => {
                        warn!(error = %e, "push channel failed, reconnecting");
                        shared.record_error(&e);
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "push channel attempt failed");
                shared.record_error(&e);
            }
        }

        if cancel.is_cancelled() {
            break;
        }

        failures = failures.saturating_add(1);
        let delay = retry.delay_for_attempt(failures);
        shared.set_state(ConnectionState::RetryPending);
        shared.stats.write().reconnects += 1;
        debug!(attempt = failures, delay_ms = delay.as_millis() as u64, "reconnect scheduled");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    shared.set_state(ConnectionState::Idle);
    debug!("connection loop stopped");
}

async fn open_channel<R, C>(resolver: &R, connector: &C) -> SyncResult<(ConnectionInfo, PushStream)>
where
    R: EndpointResolver + ?Sized,
    C: PushConnector + ?Sized,
{
    let info = resolver.resolve().await?;
    debug!(url = %redact(&info.url), protocol = ?info.protocol, "opening push channel");
    let stream = connector.connect(&info).await?;
    Ok((info, stream))
}

async fn pump_frames<F>(
    mut stream: PushStream,
    protocol: FrameProtocol,
    shared: &Shared,
    cancel: &CancellationToken,
    on_batch: &mut F,
) -> SessionEnd
where
    F: FnMut(RecordBatch),
{
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return SessionEnd::Cancelled,
            next = stream.next() => next,
        };

        let frame = match next {
            None => return SessionEnd::Closed,
            Some(Err(e)) => return SessionEnd::Failed(e),
            Some(Ok(frame)) => frame,
        };
        shared.stats.write().frames_received += 1;

        match protocol.normalize(&frame) {
            Ok(Some(payload)) => {
                let batch = RecordBatch::from_payload(payload);
                if batch.is_empty() {
                    continue;
                }
                debug!(records = batch.len(), "frame delivered");
                shared.stats.write().batches_delivered += 1;
                on_batch(batch);
            }
            Ok(None) => debug!("frame carried no data"),
            Err(e) => {
                shared.stats.write().frames_dropped += 1;
                warn!(error = %e, "dropping undecodable frame");
            }
        }
    }
}

/// Strips query and fragment, which may carry access tokens.
fn redact(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => "<invalid url>".to_string(),
    }
}
