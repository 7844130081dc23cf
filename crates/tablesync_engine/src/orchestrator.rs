//! Sync orchestration.
//!
//! The orchestrator wires the delivery paths to reconciliation. Push batches
//! and pull batches go through the same [`reconcile`] call against the same
//! shared view, so a record delivered both ways lands once.
//!
//! Pull cycles are serialized: one fetch, one reconciliation, then the
//! cursor advances. A failed fetch or a rejected batch leaves the cursor
//! where it was and the records are fetched again next cycle.

use crate::config::SyncConfig;
use crate::connection::{ConnectionHandle, ConnectionManager, ConnectionState, ConnectionStats};
use crate::error::{SyncError, SyncResult};
use crate::reconcile::{reconcile, ReconcileOutcome, ViewSink};
use crate::transport::{CollectionSource, EndpointResolver, PushConnector};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tablesync_protocol::{Cursor, KeyPath, RecordBatch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A view shared between the push and pull paths.
pub type SharedView<V> = Arc<Mutex<V>>;

/// Wraps a view for use by a session.
pub fn shared_view<V>(view: V) -> SharedView<V> {
    Arc::new(Mutex::new(view))
}

/// How a session receives records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Push channel only.
    Push,
    /// Cursor polling only.
    Pull,
    /// Push channel with a periodic pull as a safety net.
    #[default]
    PushWithFallback,
}

impl SyncMode {
    /// Returns true if the mode opens a push channel.
    pub fn uses_push(&self) -> bool {
        matches!(self, SyncMode::Push | SyncMode::PushWithFallback)
    }

    /// Returns true if the mode runs a pull loop.
    pub fn uses_pull(&self) -> bool {
        matches!(self, SyncMode::Pull | SyncMode::PushWithFallback)
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncMode::Push => "push",
            SyncMode::Pull => "pull",
            SyncMode::PushWithFallback => "push-with-fallback",
        })
    }
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(SyncMode::Push),
            "pull" => Ok(SyncMode::Pull),
            "push-with-fallback" | "fallback" => Ok(SyncMode::PushWithFallback),
            other => Err(format!("unknown sync mode '{other}'")),
        }
    }
}

/// Statistics about reconciliation in a session.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Batches reconciled into the view.
    pub batches_applied: u64,
    /// Batches rejected by reconciliation.
    pub batches_rejected: u64,
    /// Records inserted.
    pub records_inserted: u64,
    /// Records replaced.
    pub records_replaced: u64,
    /// Pull cycles completed.
    pub polls: u64,
    /// Pull cycles that failed.
    pub polls_failed: u64,
    /// Failed pull cycles whose error retrying cannot fix, such as a 4xx
    /// status, a malformed body or a rejected batch.
    pub polls_failed_permanent: u64,
    /// Last reconciliation time.
    pub last_applied: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Composes push, pull and reconciliation into sessions.
pub struct SyncOrchestrator<R, C, S> {
    config: SyncConfig,
    resolver: Arc<R>,
    connector: Arc<C>,
    source: Arc<S>,
}

impl<R, C, S> SyncOrchestrator<R, C, S>
where
    R: EndpointResolver + 'static,
    C: PushConnector + 'static,
    S: CollectionSource + 'static,
{
    /// Creates an orchestrator.
    pub fn new(config: SyncConfig, resolver: R, connector: C, source: S) -> Self {
        Self::from_shared(config, Arc::new(resolver), Arc::new(connector), Arc::new(source))
    }

    /// Creates an orchestrator around shared collaborators.
    pub fn from_shared(
        config: SyncConfig,
        resolver: Arc<R>,
        connector: Arc<C>,
        source: Arc<S>,
    ) -> Self {
        Self {
            config,
            resolver,
            connector,
            source,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Starts a session feeding `view`. Must be called within a Tokio runtime.
    pub fn start<V>(&self, mode: SyncMode, view: SharedView<V>) -> SyncSession<V, S>
    where
        V: ViewSink + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let stats = Arc::new(RwLock::new(SyncStats::default()));
        let puller = Arc::new(Puller {
            source: Arc::clone(&self.source),
            view: Arc::clone(&view),
            key_path: self.config.key_path.clone(),
            request_timeout: self.config.request_timeout,
            cursor: tokio::sync::Mutex::new(None),
            stats: Arc::clone(&stats),
        });

        info!(%mode, "starting sync session");

        let connection = mode.uses_push().then(|| {
            let resolver = Arc::clone(&self.resolver);
            let connector = Arc::clone(&self.connector);
            let manager = ConnectionManager::from_shared(resolver, connector)
                .with_retry(self.config.retry.clone())
                .with_connect_timeout(self.config.connect_timeout);
            let view = Arc::clone(&view);
            let key_path = self.config.key_path.clone();
            let stats = Arc::clone(&stats);
            manager.connect_with_cancel(cancel.child_token(), move |batch| {
                if let Err(e) = apply_batch(&view, batch, &key_path, &stats) {
                    warn!(error = %e, "push batch rejected");
                }
            })
        });

        let pull_task = mode.uses_pull().then(|| {
            let interval = match mode {
                SyncMode::Pull => self.config.poll_interval,
                _ => self.config.fallback_interval,
            };
            tokio::spawn(run_pull_loop(Arc::clone(&puller), interval, cancel.child_token()))
        });

        SyncSession {
            mode,
            view,
            puller,
            stats,
            connection,
            pull_task,
            cancel,
        }
    }
}

/// A running sync session.
///
/// Dropping the session cancels it; [`SyncSession::stop`] also waits for
/// its tasks, after which the view is no longer written.
pub struct SyncSession<V, S> {
    mode: SyncMode,
    view: SharedView<V>,
    puller: Arc<Puller<V, S>>,
    stats: Arc<RwLock<SyncStats>>,
    connection: Option<ConnectionHandle>,
    pull_task: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl<V, S> SyncSession<V, S>
where
    V: ViewSink + Send + 'static,
    S: CollectionSource + 'static,
{
    /// The session's mode.
    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    /// The view this session writes to.
    pub fn view(&self) -> &SharedView<V> {
        &self.view
    }

    /// Push connection state, if the mode uses push.
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.connection.as_ref().map(ConnectionHandle::state)
    }

    /// Push connection counters, if the mode uses push.
    pub fn connection_stats(&self) -> Option<ConnectionStats> {
        self.connection.as_ref().map(ConnectionHandle::stats)
    }

    /// Snapshot of the reconciliation counters.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Cursor the next pull cycle will send.
    pub async fn cursor(&self) -> Option<Cursor> {
        self.puller.cursor.lock().await.clone()
    }

    /// Runs one pull cycle now, in any mode.
    pub async fn poll_now(&self) -> SyncResult<ReconcileOutcome> {
        self.puller.poll_once().await
    }

    /// Stops the session and waits for its tasks to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(connection) = self.connection.take() {
            connection.close().await;
        }
        if let Some(task) = self.pull_task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "pull task ended abnormally");
            }
        }
        info!(mode = %self.mode, "sync session stopped");
    }
}

impl<V, S> Drop for SyncSession<V, S> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Puller<V, S> {
    source: Arc<S>,
    view: SharedView<V>,
    key_path: KeyPath,
    request_timeout: Duration,
    cursor: tokio::sync::Mutex<Option<Cursor>>,
    stats: Arc<RwLock<SyncStats>>,
}

impl<V, S> Puller<V, S>
where
    V: ViewSink + Send,
    S: CollectionSource,
{
    async fn poll_once(&self) -> SyncResult<ReconcileOutcome> {
        let mut cursor = self.cursor.lock().await;

        let fetch = self.source.fetch(cursor.as_ref());
        let result = match tokio::time::timeout(self.request_timeout, fetch).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout),
        };
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.stats.write().last_error = Some(e.to_string());
                return Err(self.record_failure(e));
            }
        };

        let outcome = apply_batch(&self.view, response.records, &self.key_path, &self.stats)
            .map_err(|e| self.record_failure(e))?;
        debug!(records = outcome.applied(), "pull cycle applied");
        if let Some(next) = response.next_cursor {
            debug!(cursor = %next, "cursor advanced");
            *cursor = Some(next);
        }
        self.stats.write().polls += 1;
        Ok(outcome)
    }

    fn record_failure(&self, error: SyncError) -> SyncError {
        let mut stats = self.stats.write();
        stats.polls_failed += 1;
        if !error.is_retryable() {
            stats.polls_failed_permanent += 1;
        }
        error
    }
}

async fn run_pull_loop<V, S>(
    puller: Arc<Puller<V, S>>,
    interval: Duration,
    cancel: CancellationToken,
) where
    V: ViewSink + Send,
    S: CollectionSource,
{
    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = puller.poll_once() => result,
        };
        match result {
            Err(e) if e.is_retryable() => warn!(error = %e, "pull cycle failed"),
            Err(e) => error!(error = %e, "pull cycle failed and will fail again until fixed"),
            Ok(_) => {}
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    debug!("pull loop stopped");
}

fn apply_batch<V>(
    view: &SharedView<V>,
    batch: RecordBatch,
    key_path: &KeyPath,
    stats: &RwLock<SyncStats>,
) -> SyncResult<ReconcileOutcome>
where
    V: ViewSink,
{
    let result = reconcile(batch, &mut *view.lock(), key_path);
    let mut stats = stats.write();
    match &result {
        Ok(outcome) => {
            stats.batches_applied += 1;
            stats.records_inserted += outcome.inserted as u64;
            stats.records_replaced += outcome.replaced as u64;
            stats.last_applied = Some(Instant::now());
        }
        Err(e) => {
            stats.batches_rejected += 1;
            stats.last_error = Some(e.to_string());
        }
    }
    result
}
