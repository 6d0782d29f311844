use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use super::ColumnValueStore;
use crate::primitives::bytes::StaticBuffer;
use crate::storage::kcv::{
    EntryList, KcvMutation, KeyColumnValueStore, KeyIterator, KeyRangeQuery, KeySlice,
    KeySliceQuery, SliceQuery, StoreTransaction,
};
use crate::storage::metrics::{default_metrics, StorageMetrics};
use crate::types::Result;

/// In-memory store: an ordered map from row key to [`ColumnValueStore`].
///
/// Rows are created on first mutation and live until the store is cleared.
pub struct InMemoryKeyColumnValueStore {
    pub(super) name: String,
    pub(super) rows: RwLock<BTreeMap<StaticBuffer, Arc<ColumnValueStore>>>,
    metrics: Arc<dyn StorageMetrics>,
}

impl InMemoryKeyColumnValueStore {
    /// Creates an empty store.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_metrics(name, default_metrics())
    }

    /// Creates an empty store reporting to `metrics`.
    pub fn with_metrics(name: impl Into<String>, metrics: Arc<dyn StorageMetrics>) -> Self {
        Self {
            name: name.into(),
            rows: RwLock::new(BTreeMap::new()),
            metrics,
        }
    }

    fn row(&self, key: &StaticBuffer) -> Option<Arc<ColumnValueStore>> {
        self.rows.read().get(key).cloned()
    }

    fn row_or_create(&self, key: &StaticBuffer) -> Arc<ColumnValueStore> {
        if let Some(row) = self.row(key) {
            return row;
        }
        let mut rows = self.rows.write();
        Arc::clone(rows.entry(key.clone()).or_default())
    }

    /// Returns true if no row holds an entry.
    pub fn is_empty(&self, tx: &StoreTransaction) -> bool {
        self.rows.read().values().all(|row| row.is_empty(tx))
    }

    /// Number of rows ever written and not cleared, including emptied ones.
    pub fn row_count(&self) -> usize {
        self.rows.read().len()
    }

    /// Number of entries in row `key`.
    pub fn num_entries(&self, key: &StaticBuffer) -> usize {
        self.row(key).map_or(0, |row| row.num_entries())
    }

    /// Drops every row.
    pub fn clear(&self) {
        let mut rows = self.rows.write();
        debug!(store = %self.name, rows = rows.len(), "kcv.inmemory.clear");
        rows.clear();
    }

    fn scan(
        &self,
        rows: Vec<(StaticBuffer, Arc<ColumnValueStore>)>,
        slice: &SliceQuery,
        tx: &StoreTransaction,
    ) -> KeyIterator {
        let matched: Vec<KeySlice> = rows
            .into_iter()
            .filter_map(|(key, row)| {
                let entries = row.get_slice(slice, tx);
                (!entries.is_empty()).then_some(KeySlice { key, entries })
            })
            .collect();
        self.metrics.slice_query(
            matched.len(),
            matched.iter().map(|row| row.entries.len()).sum(),
        );
        KeyIterator::new(matched)
    }
}

impl KeyColumnValueStore for InMemoryKeyColumnValueStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_slice(&self, query: &KeySliceQuery, tx: &StoreTransaction) -> Result<EntryList> {
        let entries = match self.row(&query.key) {
            Some(row) => row.get_slice(&query.slice, tx),
            None => Vec::new(),
        };
        self.metrics.slice_query(1, entries.len());
        trace!(store = %self.name, key = ?query.key, entries = entries.len(), "kcv.inmemory.get_slice");
        Ok(entries)
    }

    fn mutate(
        &self,
        key: &StaticBuffer,
        mutation: KcvMutation,
        tx: &StoreTransaction,
    ) -> Result<()> {
        if mutation.is_empty() {
            return Ok(());
        }
        let (additions, deletions) = mutation.into_parts();
        self.metrics.mutation(additions.len(), deletions.len());
        self.row_or_create(key).mutate(additions, deletions, tx);
        Ok(())
    }

    fn get_keys_range(&self, query: &KeyRangeQuery, tx: &StoreTransaction) -> Result<KeyIterator> {
        if query.key_start >= query.key_end {
            return Ok(KeyIterator::new(Vec::new()));
        }
        let rows: Vec<_> = self
            .rows
            .read()
            .range((
                Bound::Included(&query.key_start),
                Bound::Excluded(&query.key_end),
            ))
            .map(|(key, row)| (key.clone(), Arc::clone(row)))
            .collect();
        Ok(self.scan(rows, &query.slice, tx))
    }

    fn get_keys(&self, slice: &SliceQuery, tx: &StoreTransaction) -> Result<KeyIterator> {
        let rows: Vec<_> = self
            .rows
            .read()
            .iter()
            .map(|(key, row)| (key.clone(), Arc::clone(row)))
            .collect();
        Ok(self.scan(rows, slice, tx))
    }

    fn close(&self) -> Result<()> {
        self.clear();
        Ok(())
    }
}
