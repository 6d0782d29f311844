use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::primitives::concurrency::InterruptFlag;
use crate::types::{Result, StorageError};

/// Replica agreement a backend request waits for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsistencyLevel {
    /// A single replica.
    One,
    /// A quorum within the local data center.
    LocalQuorum,
    /// A quorum across all data centers.
    #[default]
    Quorum,
    /// Every replica.
    All,
}

impl ConsistencyLevel {
    /// Returns true if the level is satisfied within one data center.
    pub fn is_local(self) -> bool {
        matches!(self, ConsistencyLevel::One | ConsistencyLevel::LocalQuorum)
    }
}

/// Settings a transaction is opened with.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransactionConfig {
    transactional: bool,
    read_consistency: ConsistencyLevel,
    write_consistency: ConsistencyLevel,
    commit_timestamp: Option<i64>,
    group_name: Option<String>,
}

impl TransactionConfig {
    /// Enables per-row write locking in stores that support it.
    pub fn with_transactional(mut self, transactional: bool) -> Self {
        self.transactional = transactional;
        self
    }

    /// Sets the read consistency.
    pub fn with_read_consistency(mut self, level: ConsistencyLevel) -> Self {
        self.read_consistency = level;
        self
    }

    /// Sets the write consistency.
    pub fn with_write_consistency(mut self, level: ConsistencyLevel) -> Self {
        self.write_consistency = level;
        self
    }

    /// Fixes the timestamp used for writes.
    pub fn with_commit_timestamp(mut self, timestamp: i64) -> Self {
        self.commit_timestamp = Some(timestamp);
        self
    }

    /// Tags the transaction for metrics and logs.
    pub fn with_group_name(mut self, name: impl Into<String>) -> Self {
        self.group_name = Some(name.into());
        self
    }

    /// Whether row writes take the row lock.
    pub fn is_transactional(&self) -> bool {
        self.transactional
    }

    /// Read consistency.
    pub fn read_consistency(&self) -> ConsistencyLevel {
        self.read_consistency
    }

    /// Write consistency.
    pub fn write_consistency(&self) -> ConsistencyLevel {
        self.write_consistency
    }

    /// Fixed write timestamp, if any.
    pub fn commit_timestamp(&self) -> Option<i64> {
        self.commit_timestamp
    }

    /// Group name, if any.
    pub fn group_name(&self) -> Option<&str> {
        self.group_name.as_deref()
    }
}

static NEXT_TX_ID: AtomicU64 = AtomicU64::new(1);

struct TxInner {
    id: u64,
    config: TransactionConfig,
    interrupt: InterruptFlag,
    finished: AtomicBool,
}

/// Handle to a storage transaction. Clones share state.
#[derive(Clone)]
pub struct StoreTransaction {
    inner: Arc<TxInner>,
}

impl StoreTransaction {
    /// Opens a transaction with a fresh interrupt flag.
    pub fn new(config: TransactionConfig) -> Self {
        Self::with_interrupt(config, InterruptFlag::new())
    }

    /// Opens a transaction that observes an existing interrupt flag.
    pub fn with_interrupt(config: TransactionConfig, interrupt: InterruptFlag) -> Self {
        let id = NEXT_TX_ID.fetch_add(1, Ordering::Relaxed);
        debug!(
            tx = id,
            group = config.group_name().unwrap_or("-"),
            transactional = config.is_transactional(),
            "kcv.tx.begin"
        );
        Self {
            inner: Arc::new(TxInner {
                id,
                config,
                interrupt,
                finished: AtomicBool::new(false),
            }),
        }
    }

    /// Process-unique id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Settings the transaction was opened with.
    pub fn config(&self) -> &TransactionConfig {
        &self.inner.config
    }

    /// Shortcut for [`TransactionConfig::is_transactional`].
    pub fn is_transactional(&self) -> bool {
        self.inner.config.is_transactional()
    }

    /// Shortcut for [`TransactionConfig::read_consistency`].
    pub fn read_consistency(&self) -> ConsistencyLevel {
        self.inner.config.read_consistency()
    }

    /// Shortcut for [`TransactionConfig::write_consistency`].
    pub fn write_consistency(&self) -> ConsistencyLevel {
        self.inner.config.write_consistency()
    }

    /// Shortcut for [`TransactionConfig::commit_timestamp`]; backend writes
    /// stamp additions without their own timestamp with it.
    pub fn commit_timestamp(&self) -> Option<i64> {
        self.inner.config.commit_timestamp()
    }

    /// Shortcut for [`TransactionConfig::group_name`].
    pub fn group_name(&self) -> Option<&str> {
        self.inner.config.group_name()
    }

    /// Flag that cancels blocking waits issued on behalf of this transaction.
    pub fn interrupt_flag(&self) -> &InterruptFlag {
        &self.inner.interrupt
    }

    /// Returns true until commit or rollback.
    pub fn is_open(&self) -> bool {
        !self.inner.finished.load(Ordering::Acquire)
    }

    /// Marks the transaction committed.
    pub fn commit(&self) -> Result<()> {
        self.finish("kcv.tx.commit")
    }

    /// Marks the transaction rolled back.
    pub fn rollback(&self) -> Result<()> {
        self.finish("kcv.tx.rollback")
    }

    fn finish(&self, event: &'static str) -> Result<()> {
        if self.inner.finished.swap(true, Ordering::AcqRel) {
            return Err(StorageError::Closed("transaction already finished"));
        }
        debug!(
            tx = self.inner.id,
            group = self.group_name().unwrap_or("-"),
            event,
            "kcv.tx.finish"
        );
        Ok(())
    }
}

impl fmt::Debug for StoreTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreTransaction")
            .field("id", &self.inner.id)
            .field("config", &self.inner.config)
            .field("open", &self.is_open())
            .finish()
    }
}
