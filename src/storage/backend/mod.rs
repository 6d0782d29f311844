//! Contract for asynchronous backend adapters.
//!
//! An adapter supplies a [`SliceSession`] (native request execution) and a
//! [`ColumnValueGetter`] (native row decoding). [`AsyncSliceExecutor`] adds
//! paging, back-pressure and key grouping on top; [`BackendStore`] exposes
//! the result as a synchronous [`crate::storage::kcv::KeyColumnValueStore`].

mod bridge;
mod slice;
mod store;

pub use bridge::AsyncBridge;
pub use slice::{
    AsyncSliceExecutor, ColumnValueGetter, NativePage, NativeRequest, PagingState, SliceOptions,
    SliceSession,
};
pub use store::BackendStore;
