use std::future::Future;

use tokio::runtime::{Builder, Handle, Runtime};
use tracing::debug;

use crate::primitives::concurrency::InterruptFlag;
use crate::types::{Result, StorageError};

/// Runtime owned by a backend store, letting synchronous callers wait on
/// adapter futures.
///
/// Each bridge owns its runtime and tears it down on drop; nothing is
/// shared process-wide.
pub struct AsyncBridge {
    runtime: Runtime,
}

impl AsyncBridge {
    /// Starts a multi-threaded runtime with `worker_threads` workers.
    pub fn new(worker_threads: usize) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name("kcv-backend")
            .enable_all()
            .build()?;
        debug!(worker_threads, "kcv.backend.bridge.start");
        Ok(Self { runtime })
    }

    /// Handle for spawning work onto the bridge's runtime.
    pub fn handle(&self) -> Handle {
        self.runtime.handle().clone()
    }

    /// Blocks the calling thread until `fut` completes or `interrupt` is raised.
    ///
    /// An interrupted wait drops `fut`, leaves the flag raised and returns a
    /// permanent error whose cause is [`StorageError::Interrupted`].
    ///
    /// Must not be called from inside an async context.
    pub fn block_on<T, F>(&self, interrupt: &InterruptFlag, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if interrupt.is_interrupted() {
            return Err(interrupted());
        }
        self.runtime.block_on(async {
            tokio::select! {
                biased;
                _ = interrupt.interrupted() => Err(interrupted()),
                result = fut => result,
            }
        })
    }
}

fn interrupted() -> StorageError {
    StorageError::permanent_with(
        "backend wait interrupted",
        StorageError::Interrupted("backend wait"),
    )
}

impl std::fmt::Debug for AsyncBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncBridge").finish_non_exhaustive()
    }
}
