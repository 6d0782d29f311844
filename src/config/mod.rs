//! TOML configuration for stores, back-pressure, slicing, retries and the
//! batch fetcher.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::primitives::concurrency::{BackPressureKind, QueryBackPressure};
use crate::storage::backend::SliceOptions;
use crate::storage::kcv::{ConsistencyLevel, FixedDelay, NoRetry, RetryPolicy, TransactionConfig};

/// Errors raised while loading a [`StorageConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The document is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value is structurally valid but unusable.
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Root configuration document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// `[storage]` section.
    pub storage: StorageSection,
    /// `[query]` section.
    pub query: QuerySection,
}

/// `[storage]`: transaction defaults plus nested backend sections.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSection {
    /// Serialise same-row mutations with the row lock.
    pub transactional: bool,
    /// Consistency of backend reads.
    pub read_consistency: ConsistencyLevel,
    /// Consistency of backend writes.
    pub write_consistency: ConsistencyLevel,
    /// `[storage.back_pressure]`.
    pub back_pressure: BackPressureSection,
    /// `[storage.slice]`.
    pub slice: SliceSection,
    /// `[storage.retry]`.
    pub retry: RetrySection,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            transactional: true,
            read_consistency: ConsistencyLevel::Quorum,
            write_consistency: ConsistencyLevel::Quorum,
            back_pressure: BackPressureSection::default(),
            slice: SliceSection::default(),
            retry: RetrySection::default(),
        }
    }
}

/// Gate flavour selected by `[storage.back_pressure] kind`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackPressureMode {
    /// Bounded by `limit`.
    #[default]
    Semaphore,
    /// Unbounded.
    PassAll,
}

/// `[storage.back_pressure]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackPressureSection {
    /// Gate flavour.
    pub kind: BackPressureMode,
    /// Permits of the semaphore gate, at least 1.
    pub limit: usize,
}

impl Default for BackPressureSection {
    fn default() -> Self {
        Self {
            kind: BackPressureMode::Semaphore,
            limit: 1024,
        }
    }
}

/// `[storage.slice]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SliceSection {
    /// Keys per native multi-key request, at least 1.
    pub keys_grouping_limit: usize,
    /// Rows per native page, at least 1.
    pub page_size: usize,
}

impl Default for SliceSection {
    fn default() -> Self {
        let defaults = SliceOptions::default();
        Self {
            keys_grouping_limit: defaults.keys_grouping_limit,
            page_size: defaults.page_size,
        }
    }
}

/// `[storage.retry]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySection {
    /// Total attempts per call; 1 disables retries.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            delay_ms: 0,
        }
    }
}

/// `[query]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuerySection {
    /// Vertices per batch-fetcher batch, at least 1.
    pub batch_size: usize,
}

impl Default for QuerySection {
    fn default() -> Self {
        Self { batch_size: 2500 }
    }
}

impl StorageConfig {
    /// Parses a TOML document; missing keys take their defaults and values
    /// below their minimum are raised to it.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let mut config: StorageConfig = toml::from_str(contents)?;
        config.clamp();
        if config.storage.back_pressure.limit > Semaphore::MAX_PERMITS {
            return Err(ConfigError::Invalid(
                "storage.back_pressure.limit exceeds the semaphore maximum",
            ));
        }
        Ok(config)
    }

    /// Reads and parses the file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    fn clamp(&mut self) {
        clamp_min(&mut self.storage.back_pressure.limit, 1, "storage.back_pressure.limit");
        clamp_min(
            &mut self.storage.slice.keys_grouping_limit,
            1,
            "storage.slice.keys_grouping_limit",
        );
        clamp_min(&mut self.storage.slice.page_size, 1, "storage.slice.page_size");
        clamp_min(&mut self.storage.retry.max_attempts, 1, "storage.retry.max_attempts");
        clamp_min(&mut self.query.batch_size, 1, "query.batch_size");
    }

    /// Transaction settings for [`crate::storage::kcv::KeyColumnValueStoreManager::begin_transaction`].
    pub fn transaction_config(&self) -> TransactionConfig {
        TransactionConfig::default()
            .with_transactional(self.storage.transactional)
            .with_read_consistency(self.storage.read_consistency)
            .with_write_consistency(self.storage.write_consistency)
    }

    /// Configured admission-control strategy.
    pub fn back_pressure_kind(&self) -> BackPressureKind {
        match self.storage.back_pressure.kind {
            BackPressureMode::Semaphore => BackPressureKind::Semaphore {
                limit: self.storage.back_pressure.limit,
            },
            BackPressureMode::PassAll => BackPressureKind::PassAll,
        }
    }

    /// A fresh gate of the configured kind.
    pub fn back_pressure(&self) -> QueryBackPressure {
        QueryBackPressure::new(self.back_pressure_kind())
    }

    /// `NoRetry` for a single attempt, `FixedDelay` otherwise.
    pub fn retry_policy(&self) -> Arc<dyn RetryPolicy> {
        let retry = self.storage.retry;
        if retry.max_attempts <= 1 {
            Arc::new(NoRetry)
        } else {
            Arc::new(FixedDelay::new(
                retry.max_attempts,
                Duration::from_millis(retry.delay_ms),
            ))
        }
    }

    /// Paging and grouping options for backend executors.
    pub fn slice_options(&self) -> SliceOptions {
        SliceOptions {
            page_size: self.storage.slice.page_size,
            keys_grouping_limit: self.storage.slice.keys_grouping_limit,
        }
    }

    /// Batch cap for the batch fetcher.
    pub fn batch_size(&self) -> usize {
        self.query.batch_size
    }
}

fn clamp_min<T>(value: &mut T, min: T, key: &'static str)
where
    T: PartialOrd + Copy + std::fmt::Display,
{
    if *value < min {
        warn!(key, configured = %*value, forced = %min, "config.clamped");
        *value = min;
    }
}
