//! Keyed reconciliation of record batches into a view.
//!
//! Reconciliation is the only writer of view state. Each record is looked up
//! by its unique key and either inserted or replaced wholesale, so applying a
//! batch is idempotent and a view never holds two entries for one key.
//! Entries are never removed.

use crate::error::SyncResult;
use indexmap::IndexMap;
use serde_json::Value;
use tablesync_protocol::{KeyPath, ProtocolResult, RecordBatch, RecordKey};
use tracing::debug;

/// A key-indexed rendering surface.
///
/// Implementations keep at most one record per key. `upsert` of an absent
/// key appends in whatever order the sink maintains.
pub trait ViewSink {
    /// Returns the current record for a key.
    fn lookup(&self, key: &RecordKey) -> Option<&Value>;

    /// Inserts or replaces the record for a key.
    fn upsert(&mut self, key: RecordKey, record: Value);
}

/// Counts of what a reconciliation changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Records whose key was not in the view.
    pub inserted: usize,
    /// Records that replaced an existing entry.
    pub replaced: usize,
}

impl ReconcileOutcome {
    /// Total records applied.
    pub fn applied(&self) -> usize {
        self.inserted + self.replaced
    }
}

/// Merges a batch into a view by unique key.
///
/// Every record must carry a key; keys are checked for the whole batch
/// before the view is touched, so a rejected batch leaves the view as it was.
/// Within the batch records are applied in order and the last record for a
/// key wins.
pub fn reconcile<V>(
    batch: RecordBatch,
    view: &mut V,
    key_path: &KeyPath,
) -> SyncResult<ReconcileOutcome>
where
    V: ViewSink + ?Sized,
{
    let keyed = batch
        .into_iter()
        .enumerate()
        .map(|(index, record)| Ok((key_path.require(index, &record)?, record)))
        .collect::<ProtocolResult<Vec<_>>>()?;

    let mut outcome = ReconcileOutcome::default();
    for (key, record) in keyed {
        if view.lookup(&key).is_some() {
            outcome.replaced += 1;
        } else {
            outcome.inserted += 1;
        }
        view.upsert(key, record);
    }

    debug!(
        inserted = outcome.inserted,
        replaced = outcome.replaced,
        "batch reconciled"
    );
    Ok(outcome)
}

/// An in-memory view that keeps rows in first-insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryView {
    rows: IndexMap<RecordKey, Value>,
}

impl MemoryView {
    /// Creates an empty view.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the view has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the row for a key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.rows.get(&RecordKey::new(key))
    }

    /// Keys in row order.
    pub fn keys(&self) -> impl Iterator<Item = &RecordKey> {
        self.rows.keys()
    }

    /// Rows in order.
    pub fn iter(&self) -> impl Iterator<Item = (&RecordKey, &Value)> {
        self.rows.iter()
    }
}

impl ViewSink for MemoryView {
    fn lookup(&self, key: &RecordKey) -> Option<&Value> {
        self.rows.get(key)
    }

    fn upsert(&mut self, key: RecordKey, record: Value) {
        self.rows.insert(key, record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use proptest::prelude::*;
    use serde_json::json;
    use tablesync_protocol::ProtocolError;

    fn batch(records: Vec<Value>) -> RecordBatch {
        RecordBatch::new(records)
    }

    #[test]
    fn insert_then_replace_without_duplicates() {
        let mut view = MemoryView::new();
        let key_path = KeyPath::default();

        let first = batch(vec![json!({"id": "x", "v": 1})]);
        let outcome = reconcile(first, &mut view, &key_path).unwrap();
        assert_eq!(outcome, ReconcileOutcome { inserted: 1, replaced: 0 });
        assert_eq!(view.len(), 1);
        assert_eq!(view.get("x"), Some(&json!({"id": "x", "v": 1})));

        let second = batch(vec![json!({"id": "x", "v": 2})]);
        let outcome = reconcile(second, &mut view, &key_path).unwrap();
        assert_eq!(outcome, ReconcileOutcome { inserted: 0, replaced: 1 });
        assert_eq!(view.len(), 1);
        assert_eq!(view.get("x"), Some(&json!({"id": "x", "v": 2})));
    }

    #[test]
    fn replace_is_wholesale() {
        let mut view = MemoryView::new();
        let key_path = KeyPath::default();
        reconcile(batch(vec![json!({"id": "x", "a": 1, "b": 2})]), &mut view, &key_path).unwrap();
        reconcile(batch(vec![json!({"id": "x", "a": 3})]), &mut view, &key_path).unwrap();
        assert_eq!(view.get("x"), Some(&json!({"id": "x", "a": 3})));
    }

    #[test]
    fn new_keys_append_in_order() {
        let mut view = MemoryView::new();
        let key_path = KeyPath::default();
        let first = batch(vec![json!({"id": "b"}), json!({"id": "a"})]);
        let second = batch(vec![json!({"id": "c"}), json!({"id": "b", "v": 1})]);
        reconcile(first, &mut view, &key_path).unwrap();
        reconcile(second, &mut view, &key_path).unwrap();

        let keys: Vec<_> = view.keys().map(|k| k.as_str().to_string()).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn nested_key_path() {
        let mut view = MemoryView::new();
        let key_path = KeyPath::new("/message/id");
        let record = json!({"version": 4, "message": {"id": "m1", "data": "hi"}});
        reconcile(batch(vec![record.clone()]), &mut view, &key_path).unwrap();
        assert_eq!(view.get("m1"), Some(&record));
    }

    #[test]
    fn keyless_record_rejects_whole_batch() {
        let mut view = MemoryView::new();
        let key_path = KeyPath::default();
        let result = reconcile(
            batch(vec![json!({"id": "a"}), json!({"name": "no key"})]),
            &mut view,
            &key_path,
        );
        assert!(matches!(
            result,
            Err(SyncError::Protocol(ProtocolError::MissingKey { index: 1, .. }))
        ));
        assert!(view.is_empty());
    }

    fn record_strategy() -> impl Strategy<Value = Value> {
        ("[a-e]", 0i64..5).prop_map(|(id, v)| json!({"id": id, "v": v}))
    }

    fn batch_strategy() -> impl Strategy<Value = Vec<Value>> {
        prop::collection::vec(record_strategy(), 0..12)
    }

    proptest! {
        #[test]
        fn reconcile_is_idempotent(seed in batch_strategy(), records in batch_strategy()) {
            let key_path = KeyPath::default();
            let mut once = MemoryView::new();
            reconcile(batch(seed.clone()), &mut once, &key_path).unwrap();
            reconcile(batch(records.clone()), &mut once, &key_path).unwrap();

            let mut twice = once.clone();
            reconcile(batch(records), &mut twice, &key_path).unwrap();
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn keys_stay_unique(batches in prop::collection::vec(batch_strategy(), 0..6)) {
            let key_path = KeyPath::default();
            let mut view = MemoryView::new();
            let mut distinct = std::collections::HashSet::new();
            for records in batches {
                for record in &records {
                    distinct.insert(record["id"].as_str().unwrap().to_string());
                }
                reconcile(batch(records), &mut view, &key_path).unwrap();
            }
            prop_assert_eq!(view.len(), distinct.len());
        }

        #[test]
        fn last_write_wins(v1 in 0i64..100, v2 in 0i64..100) {
            let key_path = KeyPath::default();
            let r1 = json!({"id": "k", "v": v1});
            let r2 = json!({"id": "k", "v": v2});

            let mut forward = MemoryView::new();
            reconcile(batch(vec![r1.clone()]), &mut forward, &key_path).unwrap();
            reconcile(batch(vec![r2.clone()]), &mut forward, &key_path).unwrap();
            prop_assert_eq!(forward.get("k"), Some(&r2));

            let mut reverse = MemoryView::new();
            reconcile(batch(vec![r2]), &mut reverse, &key_path).unwrap();
            reconcile(batch(vec![r1.clone()]), &mut reverse, &key_path).unwrap();
            prop_assert_eq!(reverse.get("k"), Some(&r1));
        }
    }
}
