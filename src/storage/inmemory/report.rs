use std::sync::Arc;

use tracing::debug;

use super::InMemoryKeyColumnValueStore;
use crate::primitives::bytes::StaticBuffer;

/// Upper bounds of the row-size buckets in a [`FragmentationReport`].
pub const ENTRY_LEVELS: [usize; 10] = [
    3, 5, 10, 100, 500, 5_000, 20_000, 100_000, 500_000, 1_000_000,
];

/// Memory utilisation of an in-memory store's rows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FragmentationReport {
    /// Store name.
    pub name: String,
    /// Rows in the store, emptied ones included.
    pub num_rows: usize,
    /// Sum of row key lengths.
    pub keys_byte_size: usize,
    /// Live entries across all rows.
    pub total_entries: usize,
    /// Allocated entry slots across all rows.
    pub total_capacity: usize,
    /// `entry_counts[i]` counts rows with at most `ENTRY_LEVELS[i]` entries
    /// (and more than the previous level); the last bucket holds the rest.
    pub entry_counts: [usize; ENTRY_LEVELS.len() + 1],
    /// Rows holding spare capacity.
    pub rows_to_defragment: Vec<StaticBuffer>,
}

impl FragmentationReport {
    /// Allocated slots not holding an entry.
    pub fn spare_slots(&self) -> usize {
        self.total_capacity - self.total_entries
    }

    /// Live entries per allocated slot, 1.0 for a store without allocations.
    pub fn utilisation(&self) -> f64 {
        if self.total_capacity == 0 {
            1.0
        } else {
            self.total_entries as f64 / self.total_capacity as f64
        }
    }
}

impl InMemoryKeyColumnValueStore {
    /// Measures row sizes and spare capacity.
    pub fn create_fragmentation_report(&self) -> FragmentationReport {
        let rows = self.rows.read();
        let mut report = FragmentationReport {
            name: self.name.clone(),
            num_rows: rows.len(),
            keys_byte_size: 0,
            total_entries: 0,
            total_capacity: 0,
            entry_counts: [0; ENTRY_LEVELS.len() + 1],
            rows_to_defragment: Vec::new(),
        };
        for (key, row) in rows.iter() {
            let entries = row.entries();
            let (len, capacity) = (entries.len(), entries.capacity());
            report.keys_byte_size += key.len();
            report.total_entries += len;
            report.total_capacity += capacity;
            let bucket = ENTRY_LEVELS
                .iter()
                .position(|level| len <= *level)
                .unwrap_or(ENTRY_LEVELS.len());
            report.entry_counts[bucket] += 1;
            if capacity > len {
                report.rows_to_defragment.push(key.clone());
            }
        }
        report
    }

    /// Rebuilds rows `keys` without spare capacity; unknown keys are
    /// skipped. Returns the number of rows rebuilt.
    pub fn quick_defragment(&self, keys: &[StaticBuffer]) -> usize {
        let rows: Vec<_> = {
            let map = self.rows.read();
            keys.iter().filter_map(|key| map.get(key).map(Arc::clone)).collect()
        };
        let rebuilt = rows.iter().filter(|row| row.quick_defragment()).count();
        debug!(store = %self.name, rows = rebuilt, "kcv.inmemory.defragment");
        rebuilt
    }

    /// Rebuilds every row holding spare capacity.
    pub fn quick_defragment_all(&self) -> usize {
        let keys = self.create_fragmentation_report().rows_to_defragment;
        self.quick_defragment(&keys)
    }
}
