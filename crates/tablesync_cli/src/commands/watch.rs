//! Watch command implementation.

use serde_json::{json, Value};
use tablesync_engine::{
    shared_view, CursorFetcher, HttpEndpointResolver, MemoryView, SyncConfig, SyncMode,
    SyncOrchestrator, ViewSink, WebSocketConnector,
};
use tablesync_protocol::RecordKey;
use tracing::info;

/// A change applied to the console view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// A new key appeared.
    Insert,
    /// An existing key was replaced.
    Replace,
}

/// A view that prints every change it receives.
#[derive(Debug)]
pub struct ConsoleView {
    rows: MemoryView,
    json: bool,
}

impl ConsoleView {
    /// Creates a console view; `json` selects one JSON object per line.
    pub fn new(json: bool) -> Self {
        Self {
            rows: MemoryView::new(),
            json,
        }
    }

    /// Number of rows currently shown.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

impl ViewSink for ConsoleView {
    fn lookup(&self, key: &RecordKey) -> Option<&Value> {
        self.rows.lookup(key)
    }

    fn upsert(&mut self, key: RecordKey, record: Value) {
        let change = if self.rows.lookup(&key).is_some() {
            Change::Replace
        } else {
            Change::Insert
        };
        println!("{}", render_change(change, &key, &record, self.json));
        self.rows.upsert(key, record);
    }
}

/// Formats one change line.
pub fn render_change(change: Change, key: &RecordKey, record: &Value, json: bool) -> String {
    if json {
        let op = match change {
            Change::Insert => "insert",
            Change::Replace => "replace",
        };
        json!({"op": op, "key": key, "record": record}).to_string()
    } else {
        let marker = match change {
            Change::Insert => '+',
            Change::Replace => '~',
        };
        format!("{marker} {key} {record}")
    }
}

/// Runs the watch command until interrupted.
pub async fn run(
    config: SyncConfig,
    mode: SyncMode,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let orchestrator = SyncOrchestrator::new(
        config.clone(),
        HttpEndpointResolver::from_config(&config)?,
        WebSocketConnector::new(),
        CursorFetcher::from_config(&config)?,
    );

    let session = orchestrator.start(mode, shared_view(ConsoleView::new(format == "json")));
    info!(%mode, url = %config.collection_url()?, "watching collection, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;

    let rows = session.view().lock().row_count();
    let stats = session.stats();
    session.stop().await;

    eprintln!();
    eprintln!("Rows:     {rows}");
    eprintln!("Batches:  {} applied, {} rejected", stats.batches_applied, stats.batches_rejected);
    eprintln!("Records:  {} inserted, {} replaced", stats.records_inserted, stats.records_replaced);
    if mode.uses_pull() {
        eprintln!(
            "Polls:    {} ok, {} failed ({} not retryable)",
            stats.polls, stats.polls_failed, stats.polls_failed_permanent
        );
    }
    Ok(())
}
