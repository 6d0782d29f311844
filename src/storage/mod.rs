//! Key-column-value stores: the abstract model, the in-memory reference
//! backend and the asynchronous backend contract.

/// Backend adapter contract: paged slice execution under back-pressure.
pub mod backend;
/// In-memory reference implementation.
pub mod inmemory;
/// Entries, queries, mutations, store traits and feature flags.
pub mod kcv;
/// Store and batch-fetch metrics hooks.
pub mod metrics;

pub use inmemory::{InMemoryKeyColumnValueStore, InMemoryStoreManager};
pub use kcv::{
    Entry, EntryList, KcvMutation, KeyColumnValueStore, KeyColumnValueStoreManager,
    KeySliceQuery, SliceQuery, StoreFeatures, StoreTransaction, TransactionConfig,
};
pub use metrics::{default_metrics, CounterMetrics, NoopMetrics, StorageMetrics};
