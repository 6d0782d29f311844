//! The key-column-value model shared by every store implementation.
//!
//! A store maps row keys to rows; a row is a collection of [`Entry`] values
//! kept sorted by column and unique by column. Reads address contiguous
//! column ranges ([`SliceQuery`]) and writes address one row at a time
//! ([`KcvMutation`]).

use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::primitives::bytes::StaticBuffer;
use crate::types::{Result, StorageError};

mod features;
mod retry;
mod transaction;

pub use features::{StoreFeatures, StoreFeaturesBuilder};
pub use retry::{execute_with_retry, FixedDelay, NoRetry, RetryPolicy};
pub use transaction::{ConsistencyLevel, StoreTransaction, TransactionConfig};

/// Backend-interpreted metadata attached to an entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntryMetaData {
    /// Time-to-live in seconds.
    pub ttl: Option<u32>,
    /// Write timestamp as reported by the backend.
    pub timestamp: Option<i64>,
    /// Row the entry was read from; set by multi-key backend reads.
    pub row_key: Option<StaticBuffer>,
}

/// A column/value pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    column: StaticBuffer,
    value: StaticBuffer,
    meta: EntryMetaData,
}

impl Entry {
    /// Creates an entry without metadata.
    pub fn new(column: impl Into<StaticBuffer>, value: impl Into<StaticBuffer>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
            meta: EntryMetaData::default(),
        }
    }

    /// Sets the time-to-live in seconds.
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.meta.ttl = Some(ttl);
        self
    }

    /// Sets the write timestamp.
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.meta.timestamp = Some(timestamp);
        self
    }

    /// Records the row this entry belongs to.
    pub fn with_row_key(mut self, key: StaticBuffer) -> Self {
        self.meta.row_key = Some(key);
        self
    }

    /// Column bytes; entries order by this alone.
    pub fn column(&self) -> &StaticBuffer {
        &self.column
    }

    /// Value bytes.
    pub fn value(&self) -> &StaticBuffer {
        &self.value
    }

    /// Attached metadata.
    pub fn meta(&self) -> &EntryMetaData {
        &self.meta
    }

    /// Time-to-live in seconds, if any.
    pub fn ttl(&self) -> Option<u32> {
        self.meta.ttl
    }

    /// Splits the entry into column and value.
    pub fn into_parts(self) -> (StaticBuffer, StaticBuffer) {
        (self.column, self.value)
    }
}

/// Entries of one row in column order.
pub type EntryList = Vec<Entry>;

/// Per-key results of a multi-key slice, in key order.
pub type KeyedEntries = BTreeMap<StaticBuffer, EntryList>;

/// Mutations grouped by store name and row key.
pub type StoreMutations = FxHashMap<String, FxHashMap<StaticBuffer, KcvMutation>>;

/// Half-open column range `[start, end)` with a result cap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SliceQuery {
    start: StaticBuffer,
    end: StaticBuffer,
    limit: usize,
}

impl SliceQuery {
    /// Unlimited slice over `[start, end)`.
    pub fn new(start: impl Into<StaticBuffer>, end: impl Into<StaticBuffer>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
            limit: usize::MAX,
        }
    }

    /// Caps the number of returned entries.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Inclusive start column.
    pub fn start(&self) -> &StaticBuffer {
        &self.start
    }

    /// Exclusive end column.
    pub fn end(&self) -> &StaticBuffer {
        &self.end
    }

    /// Maximum number of entries returned.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Returns true if a limit below `usize::MAX` is set.
    pub fn has_limit(&self) -> bool {
        self.limit != usize::MAX
    }

    /// Returns true if `column` falls inside the range.
    pub fn contains(&self, column: &StaticBuffer) -> bool {
        *column >= self.start && *column < self.end
    }

    /// Binds the slice to one row.
    pub fn for_key(self, key: StaticBuffer) -> KeySliceQuery {
        KeySliceQuery { key, slice: self }
    }
}

/// A slice addressed to one row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeySliceQuery {
    /// Row key.
    pub key: StaticBuffer,
    /// Column range.
    pub slice: SliceQuery,
}

impl KeySliceQuery {
    /// Creates a query for `key` over `slice`.
    pub fn new(key: StaticBuffer, slice: SliceQuery) -> Self {
        Self { key, slice }
    }
}

/// Ordered key range `[key_start, key_end)` combined with a column slice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyRangeQuery {
    /// Inclusive first key.
    pub key_start: StaticBuffer,
    /// Exclusive last key.
    pub key_end: StaticBuffer,
    /// Column range applied to every row.
    pub slice: SliceQuery,
}

impl KeyRangeQuery {
    /// Creates a key-range query.
    pub fn new(key_start: StaticBuffer, key_end: StaticBuffer, slice: SliceQuery) -> Self {
        Self {
            key_start,
            key_end,
            slice,
        }
    }
}

/// Additions and deletions applied to one row.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KcvMutation {
    additions: Vec<Entry>,
    deletions: Vec<StaticBuffer>,
}

impl KcvMutation {
    /// Builds a mutation from explicit lists.
    pub fn new(additions: Vec<Entry>, deletions: Vec<StaticBuffer>) -> Self {
        Self {
            additions,
            deletions,
        }
    }

    /// Queues an addition.
    pub fn addition(&mut self, entry: Entry) -> &mut Self {
        self.additions.push(entry);
        self
    }

    /// Queues a deletion.
    pub fn deletion(&mut self, column: StaticBuffer) -> &mut Self {
        self.deletions.push(column);
        self
    }

    /// Appends `other` after this mutation; later additions win on equal columns.
    pub fn merge(&mut self, other: KcvMutation) {
        self.additions.extend(other.additions);
        self.deletions.extend(other.deletions);
    }

    /// Queued additions.
    pub fn additions(&self) -> &[Entry] {
        &self.additions
    }

    /// Queued deletions.
    pub fn deletions(&self) -> &[StaticBuffer] {
        &self.deletions
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.deletions.is_empty()
    }

    /// Splits into additions and deletions.
    pub fn into_parts(self) -> (Vec<Entry>, Vec<StaticBuffer>) {
        (self.additions, self.deletions)
    }
}

/// One row returned by a key scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeySlice {
    /// Row key.
    pub key: StaticBuffer,
    /// Entries of the requested slice.
    pub entries: EntryList,
}

/// Iterator over the rows matched by a key scan.
///
/// The rows are captured when the scan starts; writes issued while iterating
/// are not observed.
#[derive(Debug)]
pub struct KeyIterator {
    rows: std::vec::IntoIter<KeySlice>,
}

impl KeyIterator {
    /// Wraps already materialised rows.
    pub fn new(rows: Vec<KeySlice>) -> Self {
        Self {
            rows: rows.into_iter(),
        }
    }
}

impl Iterator for KeyIterator {
    type Item = KeySlice;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

/// A named sorted key-column-value store.
pub trait KeyColumnValueStore: Send + Sync {
    /// Store name within its manager.
    fn name(&self) -> &str;

    /// Entries of one row inside the query's slice. A missing row yields an
    /// empty list.
    fn get_slice(&self, query: &KeySliceQuery, tx: &StoreTransaction) -> Result<EntryList>;

    /// Applies the same slice to several rows. Every requested key appears
    /// in the result.
    fn get_slice_multi(
        &self,
        keys: &[StaticBuffer],
        slice: &SliceQuery,
        tx: &StoreTransaction,
    ) -> Result<KeyedEntries> {
        let mut out = KeyedEntries::new();
        for key in keys {
            let query = KeySliceQuery::new(key.clone(), slice.clone());
            out.insert(key.clone(), self.get_slice(&query, tx)?);
        }
        Ok(out)
    }

    /// Applies one row's additions and deletions.
    fn mutate(&self, key: &StaticBuffer, mutation: KcvMutation, tx: &StoreTransaction)
        -> Result<()>;

    /// Acquires a lock on `(key, column)` expecting `expected` as current value.
    fn acquire_lock(
        &self,
        _key: &StaticBuffer,
        _column: &StaticBuffer,
        _expected: Option<&StaticBuffer>,
        _tx: &StoreTransaction,
    ) -> Result<()> {
        Err(StorageError::Unsupported("acquire_lock"))
    }

    /// Ordered scan over a key range. Rows with an empty slice are skipped.
    fn get_keys_range(&self, query: &KeyRangeQuery, tx: &StoreTransaction) -> Result<KeyIterator>;

    /// Unordered scan over all keys. Rows with an empty slice are skipped.
    fn get_keys(&self, slice: &SliceQuery, tx: &StoreTransaction) -> Result<KeyIterator>;

    /// Releases the store's resources.
    fn close(&self) -> Result<()>;
}

/// Owner of a namespace of stores.
pub trait KeyColumnValueStoreManager: Send + Sync {
    /// Opens `name`, creating it on first use. Concurrent opens of the same
    /// name return the same store.
    fn open_database(&self, name: &str) -> Result<Arc<dyn KeyColumnValueStore>>;

    /// Applies row mutations across stores. Each row is applied on its own;
    /// no atomicity is provided across rows or stores.
    fn mutate_many(&self, mutations: StoreMutations, tx: &StoreTransaction) -> Result<()>;

    /// Starts a transaction handle.
    fn begin_transaction(&self, config: TransactionConfig) -> Result<StoreTransaction>;

    /// Capability descriptor.
    fn features(&self) -> &StoreFeatures;

    /// Manager name.
    fn name(&self) -> &str;

    /// Returns true if any store holds data.
    fn exists(&self) -> Result<bool>;

    /// Drops every store and its data.
    fn clear_storage(&self) -> Result<()>;

    /// Closes every store; later calls fail with [`StorageError::Closed`].
    fn close(&self) -> Result<()>;
}
