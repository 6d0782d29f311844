//! Key-column-value storage core for a graph database.
//!
//! Graph elements are serialised into sorted binary rows: one row per
//! vertex, one column per property or edge. The crate provides
//!
//! - the byte codecs ([`primitives::bytes`]) that make those columns
//!   self-delimiting and sortable,
//! - the store model and its in-memory reference backend ([`storage`]),
//!   plus the contract asynchronous backends implement,
//! - relation column layout and batched vertex prefetching ([`graph`]),
//! - TOML configuration ([`config`]).

#![warn(missing_docs)]

pub mod config;
pub mod graph;
pub mod primitives;
pub mod storage;
pub mod types;

pub use types::{Result, StorageError, VertexId};
