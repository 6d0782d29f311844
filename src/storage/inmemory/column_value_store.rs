use std::cmp::Ordering;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::primitives::bytes::StaticBuffer;
use crate::primitives::concurrency::RowLock;
use crate::storage::kcv::{Entry, EntryList, SliceQuery, StoreTransaction};

/// Utilisation below which a rebuilt row gives back spare capacity.
const SIZE_THRESHOLD: f64 = 0.66;

/// One row of the in-memory store: entries sorted and unique by column.
///
/// Writers build a new array and publish it with a single pointer swap, so
/// a reader holding the previous snapshot never sees a partial write.
#[derive(Default)]
pub struct ColumnValueStore {
    data: RwLock<Arc<Vec<Entry>>>,
    lock: RowLock,
}

fn by_column(a: &Entry, b: &Entry) -> Ordering {
    a.column().cmp(b.column())
}

impl ColumnValueStore {
    /// Creates an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> Arc<Vec<Entry>> {
        Arc::clone(&self.data.read())
    }

    /// Returns true if the row has no entries.
    pub fn is_empty(&self, _tx: &StoreTransaction) -> bool {
        self.data.read().is_empty()
    }

    /// Number of live entries.
    pub fn num_entries(&self) -> usize {
        self.data.read().len()
    }

    /// Entries in `[slice.start, slice.end)`, at most `slice.limit` of them.
    pub fn get_slice(&self, slice: &SliceQuery, _tx: &StoreTransaction) -> EntryList {
        let data = self.snapshot();
        let start = data.partition_point(|e| e.column() < slice.start());
        let end = data.partition_point(|e| e.column() < slice.end());
        if start >= end {
            return Vec::new();
        }
        let end = end.min(start.saturating_add(slice.limit()));
        data[start..end].to_vec()
    }

    /// Applies additions and deletions in one merge pass.
    ///
    /// Additions win over deletions of the same column; among additions of
    /// the same column the last one wins.
    pub fn mutate(
        &self,
        additions: Vec<Entry>,
        mut deletions: Vec<StaticBuffer>,
        tx: &StoreTransaction,
    ) {
        let additions = sort_additions(additions);
        deletions.sort_unstable();
        deletions.dedup();
        deletions.retain(|column| {
            additions
                .binary_search_by(|e| e.column().cmp(column))
                .is_err()
        });

        let _guard = self.lock.lock(tx.is_transactional());
        let current = self.snapshot();
        let merged = merge(&current, additions, &deletions);
        *self.data.write() = Arc::new(merged);
    }

    /// Drops every entry.
    pub fn clear(&self) {
        *self.data.write() = Arc::new(Vec::new());
    }

    /// Slots allocated for entries, live or spare.
    pub fn capacity(&self) -> usize {
        self.data.read().capacity()
    }

    /// Current entries, sorted by column.
    pub fn entries(&self) -> Arc<Vec<Entry>> {
        self.snapshot()
    }

    /// Rebuilds the entry array without spare capacity. Returns false if
    /// there was none to give back.
    pub fn quick_defragment(&self) -> bool {
        let mut data = self.data.write();
        if data.len() == data.capacity() {
            return false;
        }
        *data = Arc::new(data.as_slice().to_vec());
        true
    }

    /// Builds a row from entries in any order; repeated columns keep the
    /// last entry.
    pub(crate) fn from_entries(entries: Vec<Entry>) -> Self {
        let store = Self::new();
        *store.data.write() = Arc::new(sort_additions(entries));
        store
    }
}

/// Stable sort by column, then collapse equal columns keeping the last.
fn sort_additions(mut additions: Vec<Entry>) -> Vec<Entry> {
    additions.sort_by(by_column);
    let mut unique: Vec<Entry> = Vec::with_capacity(additions.len());
    for entry in additions {
        match unique.last_mut() {
            Some(last) if last.column() == entry.column() => *last = entry,
            _ => unique.push(entry),
        }
    }
    unique
}

fn merge(current: &[Entry], additions: Vec<Entry>, deletions: &[StaticBuffer]) -> Vec<Entry> {
    let mut merged = Vec::with_capacity(current.len() + additions.len());
    let mut adds = additions.into_iter().peekable();
    let mut dels = deletions.iter().peekable();

    for entry in current {
        while let Some(add) = adds.next_if(|a| a.column() < entry.column()) {
            merged.push(add);
        }
        if let Some(add) = adds.next_if(|a| a.column() == entry.column()) {
            merged.push(add);
            continue;
        }
        while dels.next_if(|d| *d < entry.column()).is_some() {}
        if dels.next_if(|d| *d == entry.column()).is_some() {
            continue;
        }
        merged.push(entry.clone());
    }
    merged.extend(adds);

    if (merged.len() as f64) < merged.capacity() as f64 * SIZE_THRESHOLD {
        merged.shrink_to_fit();
    }
    merged
}
