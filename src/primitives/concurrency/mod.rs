#![forbid(unsafe_code)]
//! Admission control, cancellation and row locking.

mod backpressure;
mod interrupt;
mod row_lock;

pub use backpressure::{BackPressureKind, BackPressureStats, QueryBackPressure, QueryPermit};
pub use interrupt::InterruptFlag;
pub use row_lock::{RowGuard, RowLock};
