use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Hooks for counting store and batch-fetch activity.
///
/// Implementations must be cheap: the hooks sit on every slice read,
/// every row mutation and every batch-fetcher lookup.
pub trait StorageMetrics: Send + Sync {
    /// Records that a store was created by its manager.
    fn store_opened(&self);

    /// Records a slice read.
    ///
    /// # Parameters
    /// * `keys` - Number of rows addressed by the read.
    /// * `entries` - Number of entries returned across those rows.
    fn slice_query(&self, keys: usize, entries: usize);

    /// Records a row mutation with its addition and deletion counts.
    fn mutation(&self, additions: usize, deletions: usize);

    /// Records a multi-vertex query issued by the batch fetcher.
    fn batch_fetch(&self, vertices: usize);

    /// Records a batch-fetcher cache lookup; `hit` is true when served from cache.
    fn cache_lookup(&self, hit: bool);
}

/// A no-op implementation of [`StorageMetrics`].
#[derive(Default)]
pub struct NoopMetrics;

impl StorageMetrics for NoopMetrics {
    fn store_opened(&self) {}
    fn slice_query(&self, _keys: usize, _entries: usize) {}
    fn mutation(&self, _additions: usize, _deletions: usize) {}
    fn batch_fetch(&self, _vertices: usize) {}
    fn cache_lookup(&self, _hit: bool) {}
}

/// Atomic-counter implementation of [`StorageMetrics`].
#[derive(Default)]
pub struct CounterMetrics {
    /// Stores created.
    pub stores_opened: AtomicU64,

    /// Slice reads performed.
    pub slice_queries: AtomicU64,

    /// Rows addressed by slice reads.
    pub slice_keys: AtomicU64,

    /// Entries returned by slice reads.
    pub slice_entries: AtomicU64,

    /// Row mutations applied.
    pub mutations: AtomicU64,

    /// Entries added by mutations.
    pub additions: AtomicU64,

    /// Columns deleted by mutations.
    pub deletions: AtomicU64,

    /// Multi-vertex queries issued by batch fetchers.
    pub batch_fetches: AtomicU64,

    /// Vertices covered by those queries.
    pub batch_vertices: AtomicU64,

    /// Lookups served from a batch-fetcher cache.
    pub cache_hits: AtomicU64,

    /// Lookups that triggered a fetch.
    pub cache_misses: AtomicU64,
}

impl StorageMetrics for CounterMetrics {
    fn store_opened(&self) {
        self.stores_opened.fetch_add(1, Ordering::Relaxed);
    }

    fn slice_query(&self, keys: usize, entries: usize) {
        self.slice_queries.fetch_add(1, Ordering::Relaxed);
        self.slice_keys.fetch_add(keys as u64, Ordering::Relaxed);
        self.slice_entries.fetch_add(entries as u64, Ordering::Relaxed);
    }

    fn mutation(&self, additions: usize, deletions: usize) {
        self.mutations.fetch_add(1, Ordering::Relaxed);
        self.additions.fetch_add(additions as u64, Ordering::Relaxed);
        self.deletions.fetch_add(deletions as u64, Ordering::Relaxed);
    }

    fn batch_fetch(&self, vertices: usize) {
        self.batch_fetches.fetch_add(1, Ordering::Relaxed);
        self.batch_vertices
            .fetch_add(vertices as u64, Ordering::Relaxed);
    }

    fn cache_lookup(&self, hit: bool) {
        if hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Returns the default metrics implementation, [`NoopMetrics`], wrapped in an [`Arc`].
pub fn default_metrics() -> Arc<dyn StorageMetrics> {
    Arc::new(NoopMetrics)
}
