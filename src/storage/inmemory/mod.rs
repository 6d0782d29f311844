//! Reference in-memory backend.

mod column_value_store;
mod manager;
mod report;
mod snapshot;
mod store;

pub use column_value_store::ColumnValueStore;
pub use manager::InMemoryStoreManager;
pub use report::{FragmentationReport, ENTRY_LEVELS};
pub use store::InMemoryKeyColumnValueStore;
