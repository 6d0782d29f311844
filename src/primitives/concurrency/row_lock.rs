use std::sync::OnceLock;

use parking_lot::{Mutex, MutexGuard};

/// Per-row write lock, allocated on first transactional use.
#[derive(Default, Debug)]
pub struct RowLock {
    cell: OnceLock<Mutex<()>>,
}

/// Guard returned by [`RowLock::lock`]; empty when locking was skipped.
#[must_use = "the row is only protected while the guard is alive"]
pub struct RowGuard<'a> {
    _guard: Option<MutexGuard<'a, ()>>,
}

impl RowLock {
    /// Creates an unallocated lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the row when `transactional`; otherwise returns a no-op guard
    /// without allocating the mutex.
    pub fn lock(&self, transactional: bool) -> RowGuard<'_> {
        let guard = transactional.then(|| self.cell.get_or_init(Mutex::default).lock());
        RowGuard { _guard: guard }
    }

    /// Returns true once a transactional caller has allocated the mutex.
    pub fn is_allocated(&self) -> bool {
        self.cell.get().is_some()
    }
}
