use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::types::{Result, StorageError};

/// Admission-control strategy for backend queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackPressureKind {
    /// At most `limit` queries in flight; waiters are served in FIFO order.
    Semaphore {
        /// Maximum number of concurrently held permits.
        limit: usize,
    },
    /// Admits everything; still counts permits.
    PassAll,
}

impl Default for BackPressureKind {
    fn default() -> Self {
        BackPressureKind::Semaphore { limit: 1024 }
    }
}

/// Acquire/release counters of a [`QueryBackPressure`] gate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BackPressureStats {
    /// Permits handed out.
    pub acquired: u64,
    /// Permits returned.
    pub released: u64,
}

impl BackPressureStats {
    /// Permits currently held.
    pub fn in_flight(&self) -> u64 {
        self.acquired.saturating_sub(self.released)
    }
}

enum Gate {
    Semaphore(Arc<Semaphore>),
    PassAll,
}

struct Shared {
    gate: Gate,
    closed: AtomicBool,
    acquired: AtomicU64,
    released: AtomicU64,
}

/// Bounded-concurrency gate acquired before every backend request and every
/// page of a paged response.
///
/// Permits are returned by dropping the [`QueryPermit`], so each acquire is
/// matched by exactly one release on success, failure and cancellation.
#[derive(Clone)]
pub struct QueryBackPressure {
    shared: Arc<Shared>,
}

impl QueryBackPressure {
    /// Builds a gate of the given kind.
    pub fn new(kind: BackPressureKind) -> Self {
        let gate = match kind {
            BackPressureKind::Semaphore { limit } => {
                let limit = limit.clamp(1, Semaphore::MAX_PERMITS);
                Gate::Semaphore(Arc::new(Semaphore::new(limit)))
            }
            BackPressureKind::PassAll => Gate::PassAll,
        };
        debug!(?kind, "backpressure.new");
        Self {
            shared: Arc::new(Shared {
                gate,
                closed: AtomicBool::new(false),
                acquired: AtomicU64::new(0),
                released: AtomicU64::new(0),
            }),
        }
    }

    /// Fair semaphore gate admitting `limit` concurrent queries.
    pub fn semaphore(limit: usize) -> Self {
        Self::new(BackPressureKind::Semaphore { limit })
    }

    /// Gate that never blocks.
    pub fn pass_all() -> Self {
        Self::new(BackPressureKind::PassAll)
    }

    /// Waits for a permit.
    pub async fn acquire(&self) -> Result<QueryPermit> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed("query back-pressure gate"));
        }
        let permit = match &self.shared.gate {
            Gate::Semaphore(semaphore) => Some(
                Arc::clone(semaphore)
                    .acquire_owned()
                    .await
                    .map_err(|_| StorageError::Closed("query back-pressure gate"))?,
            ),
            Gate::PassAll => None,
        };
        Ok(self.issue(permit))
    }

    /// Takes a permit if one is free right now.
    pub fn try_acquire(&self) -> Result<Option<QueryPermit>> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed("query back-pressure gate"));
        }
        match &self.shared.gate {
            Gate::Semaphore(semaphore) => match Arc::clone(semaphore).try_acquire_owned() {
                Ok(permit) => Ok(Some(self.issue(Some(permit)))),
                Err(tokio::sync::TryAcquireError::NoPermits) => Ok(None),
                Err(tokio::sync::TryAcquireError::Closed) => {
                    Err(StorageError::Closed("query back-pressure gate"))
                }
            },
            Gate::PassAll => Ok(Some(self.issue(None))),
        }
    }

    fn issue(&self, permit: Option<OwnedSemaphorePermit>) -> QueryPermit {
        self.shared.acquired.fetch_add(1, Ordering::AcqRel);
        QueryPermit {
            _permit: permit,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Free permits, or `None` for a pass-all gate.
    pub fn available_permits(&self) -> Option<usize> {
        match &self.shared.gate {
            Gate::Semaphore(semaphore) => Some(semaphore.available_permits()),
            Gate::PassAll => None,
        }
    }

    /// Snapshot of the acquire/release counters.
    pub fn stats(&self) -> BackPressureStats {
        BackPressureStats {
            acquired: self.shared.acquired.load(Ordering::Acquire),
            released: self.shared.released.load(Ordering::Acquire),
        }
    }

    /// Rejects further acquires and wakes pending waiters with `Closed`.
    /// Permits already held stay valid until dropped.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Gate::Semaphore(semaphore) = &self.shared.gate {
            semaphore.close();
        }
        debug!(stats = ?self.stats(), "backpressure.close");
    }
}

impl fmt::Debug for QueryBackPressure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBackPressure")
            .field("available", &self.available_permits())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Held admission permit; dropping it releases the slot.
pub struct QueryPermit {
    _permit: Option<OwnedSemaphorePermit>,
    shared: Arc<Shared>,
}

impl Drop for QueryPermit {
    fn drop(&mut self) {
        self.shared.released.fetch_add(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for QueryPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryPermit").finish_non_exhaustive()
    }
}
