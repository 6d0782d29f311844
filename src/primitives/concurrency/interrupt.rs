use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

use crate::types::{Result, StorageError};

#[derive(Default)]
struct State {
    raised: AtomicBool,
    notify: Notify,
}

/// Cooperative cancellation flag shared between a caller and the work it
/// waits on.
///
/// Once raised the flag stays raised until [`InterruptFlag::clear`], so code
/// that inspects it after a cancelled wait still sees the interruption.
#[derive(Clone, Default)]
pub struct InterruptFlag {
    state: Arc<State>,
}

impl InterruptFlag {
    /// Creates a lowered flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag and wakes every waiter.
    pub fn interrupt(&self) {
        self.state.raised.store(true, Ordering::Release);
        self.state.notify.notify_waiters();
    }

    /// Returns true while the flag is raised.
    pub fn is_interrupted(&self) -> bool {
        self.state.raised.load(Ordering::Acquire)
    }

    /// Lowers the flag, returning whether it was raised.
    pub fn clear(&self) -> bool {
        self.state.raised.swap(false, Ordering::AcqRel)
    }

    /// Fails with [`StorageError::Interrupted`] if the flag is raised.
    pub fn check(&self, context: &'static str) -> Result<()> {
        if self.is_interrupted() {
            Err(StorageError::Interrupted(context))
        } else {
            Ok(())
        }
    }

    /// Completes once the flag is raised.
    pub async fn interrupted(&self) {
        loop {
            let notified = self.state.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_interrupted() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for InterruptFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptFlag")
            .field("raised", &self.is_interrupted())
            .finish()
    }
}
