//! Low-level primitives shared by the stores and the graph layer.
//!
//! Includes byte sequences and variable-length codecs, plus the concurrency
//! controls used by store implementations and backend adapters.

/// Byte sequences, cursors and variable-length encodings.
///
/// Every key, column and value handed to a store is a [`bytes::StaticBuffer`].
pub mod bytes;

/// Concurrency primitives.
///
/// Back-pressure gates, interrupt flags and lazily allocated row locks.
pub mod concurrency;
