//! Batched, loop-aware prefetching of per-vertex data.

mod fetcher;
mod query;
mod queue;

pub use fetcher::MultiQueriableStepBatchFetcher;
pub use query::{BatchQuery, RelationBatchQuery};
pub use queue::BatchProcessingQueue;
