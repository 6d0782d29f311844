use std::hash::Hash;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use super::{BatchProcessingQueue, BatchQuery};
use crate::storage::metrics::{default_metrics, StorageMetrics};
use crate::types::{Result, StorageError};

/// Per-step cache that groups vertex lookups of a looping traversal into
/// batched queries.
///
/// Traversal steps register vertices they will need: for the first pass of
/// a loop body, for the current loop generation, or for the next one.
/// [`MultiQueriableStepBatchFetcher::fetch_data`] serves a vertex from the
/// last batch result, or fetches the next pending batch with the vertex
/// forced into it.
pub struct MultiQueriableStepBatchFetcher<V, Q>
where
    Q: BatchQuery<V>,
{
    query: Q,
    first_loop: BatchProcessingQueue<V>,
    current_loop: BatchProcessingQueue<V>,
    next_loop: BatchProcessingQueue<V>,
    current_loops: u32,
    batch_size: usize,
    cache: FxHashMap<V, Q::Output>,
    metrics: Arc<dyn StorageMetrics>,
}

impl<V, Q> MultiQueriableStepBatchFetcher<V, Q>
where
    V: Clone + Eq + Hash,
    Q: BatchQuery<V>,
{
    /// Creates a fetcher issuing batches of at most `batch_size` vertices
    /// (plus the forced vertex).
    pub fn new(query: Q, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            query,
            first_loop: BatchProcessingQueue::new(batch_size),
            current_loop: BatchProcessingQueue::new(batch_size),
            next_loop: BatchProcessingQueue::new(batch_size),
            current_loops: 0,
            batch_size,
            cache: FxHashMap::default(),
            metrics: default_metrics(),
        }
    }

    /// Reports cache lookups and batch fetches to `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<dyn StorageMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Queues `vertex` for the first pass over a loop body.
    pub fn register_first_loop_future_vertex_for_prefetching(&mut self, vertex: V) {
        self.first_loop.add_to_batch_to_end(vertex);
    }

    /// Queues `vertex` for loop generation `loops`.
    ///
    /// At generation 0 a vertex still pending in the first-loop queue is
    /// left to that queue.
    pub fn register_current_loop_future_vertex_for_prefetching(&mut self, vertex: V, loops: u32) {
        self.ensure_correct_loop_queues(loops);
        if loops == 0 && !self.first_loop.is_empty() && self.first_loop.contains(&vertex) {
            self.current_loop.soft_remove(&vertex);
        } else {
            self.current_loop.add_to_batch_to_end(vertex);
        }
    }

    /// Queues `vertex` for generation `loops + 1`.
    pub fn register_next_loop_future_vertex_for_prefetching(&mut self, vertex: V, loops: u32) {
        self.ensure_correct_loop_queues(loops);
        self.next_loop.add_to_batch_to_end(vertex);
    }

    /// Result for `vertex`, fetching the next batch on a cache miss.
    ///
    /// Vertices the query returns nothing for yield `Output::default()`. A
    /// failure caused by an interruption surfaces as
    /// [`StorageError::Interrupted`]; other errors pass through.
    pub fn fetch_data(&mut self, vertex: &V, loops: u32) -> Result<Q::Output> {
        if let Some(hit) = self.cache.get(vertex) {
            self.metrics.cache_lookup(true);
            return Ok(hit.clone());
        }
        self.metrics.cache_lookup(false);
        self.ensure_correct_loop_queues(loops);
        self.prefetch_next_batch(vertex)?;
        Ok(self.cache.get(vertex).cloned().unwrap_or_default())
    }

    /// True if `vertex` is served from the current batch result.
    pub fn is_cached(&self, vertex: &V) -> bool {
        self.cache.contains_key(vertex)
    }

    /// Loop generation the queues are aligned with.
    pub fn current_loops(&self) -> u32 {
        self.current_loops
    }

    /// Vertices pending in the current-generation queue.
    pub fn pending_current(&self) -> usize {
        self.current_loop.len()
    }

    /// Vertices pending in the next-generation queue.
    pub fn pending_next(&self) -> usize {
        self.next_loop.len()
    }

    /// Vertices pending in the first-loop queue.
    pub fn pending_first_loop(&self) -> usize {
        self.first_loop.len()
    }

    fn ensure_correct_loop_queues(&mut self, loops: u32) {
        if loops == self.current_loops {
            return;
        }
        if self.current_loops.checked_add(1) == Some(loops) {
            let next = BatchProcessingQueue::new(self.batch_size);
            self.current_loop = std::mem::replace(&mut self.next_loop, next);
        } else {
            debug!(from = self.current_loops, to = loops, "graph.batch.loop_reset");
            self.current_loop = BatchProcessingQueue::new(self.batch_size);
            self.next_loop = BatchProcessingQueue::new(self.batch_size);
        }
        self.current_loops = loops;
    }

    fn prefetch_next_batch(&mut self, required: &V) -> Result<()> {
        let queue = if self.first_loop.is_empty() {
            &mut self.current_loop
        } else {
            &mut self.first_loop
        };
        let mut batch = queue.poll_batch().unwrap_or_default();
        if !batch.contains(required) {
            batch.push(required.clone());
        }
        trace!(vertices = batch.len(), "graph.batch.prefetch");
        let results = self.query.execute(&batch).map_err(|err| {
            if err.is_interrupted() {
                StorageError::Interrupted("batch fetch")
            } else {
                err
            }
        })?;
        self.metrics.batch_fetch(batch.len());
        self.cache = results;
        Ok(())
    }
}
