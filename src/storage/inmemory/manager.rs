use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::InMemoryKeyColumnValueStore;
use crate::storage::kcv::{
    KeyColumnValueStore, KeyColumnValueStoreManager, StoreFeatures, StoreMutations,
    StoreTransaction, TransactionConfig,
};
use crate::storage::metrics::{default_metrics, StorageMetrics};
use crate::types::{Result, StorageError};

/// Manager of named in-memory stores.
///
/// Store creation goes through the map's per-shard entry API, so two
/// threads opening the same name get the same store without locking the
/// whole registry.
pub struct InMemoryStoreManager {
    name: String,
    stores: DashMap<String, Arc<InMemoryKeyColumnValueStore>>,
    features: StoreFeatures,
    metrics: Arc<dyn StorageMetrics>,
    closed: AtomicBool,
}

impl Default for InMemoryStoreManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStoreManager {
    /// Creates a manager with no stores.
    pub fn new() -> Self {
        Self::with_metrics(default_metrics())
    }

    /// Creates a manager whose stores report to `metrics`.
    pub fn with_metrics(metrics: Arc<dyn StorageMetrics>) -> Self {
        Self {
            name: "inmemory".to_owned(),
            stores: DashMap::new(),
            features: Self::default_features(),
            metrics,
            closed: AtomicBool::new(false),
        }
    }

    /// Feature flags advertised by every in-memory manager.
    pub fn default_features() -> StoreFeatures {
        StoreFeatures::builder()
            .key_ordered(true)
            .ordered_scan(true)
            .unordered_scan(true)
            .multi_query(true)
            .optimistic_locking(true)
            .key_consistent_with(TransactionConfig::default(), None)
            .persists(false)
            .build()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(StorageError::Closed("in-memory store manager"))
        } else {
            Ok(())
        }
    }

    /// Concrete-typed variant of [`KeyColumnValueStoreManager::open_database`].
    /// Blank names are rejected with [`StorageError::Invalid`].
    pub fn open_store(&self, name: &str) -> Result<Arc<InMemoryKeyColumnValueStore>> {
        self.ensure_open()?;
        if name.trim().is_empty() {
            return Err(StorageError::Invalid("store name must not be blank"));
        }
        if let Some(store) = self.stores.get(name) {
            return Ok(Arc::clone(store.value()));
        }
        let store = self
            .stores
            .entry(name.to_owned())
            .or_insert_with(|| {
                debug!(store = name, "kcv.inmemory.open_store");
                self.metrics.store_opened();
                Arc::new(InMemoryKeyColumnValueStore::with_metrics(
                    name,
                    Arc::clone(&self.metrics),
                ))
            });
        Ok(Arc::clone(store.value()))
    }

    /// Names of the stores opened so far.
    pub fn store_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl KeyColumnValueStoreManager for InMemoryStoreManager {
    fn open_database(&self, name: &str) -> Result<Arc<dyn KeyColumnValueStore>> {
        let store: Arc<dyn KeyColumnValueStore> = self.open_store(name)?;
        Ok(store)
    }

    fn mutate_many(&self, mutations: StoreMutations, tx: &StoreTransaction) -> Result<()> {
        self.ensure_open()?;
        for (store_name, rows) in mutations {
            let store = self.open_store(&store_name)?;
            debug!(store = %store_name, rows = rows.len(), tx = tx.id(), "kcv.inmemory.mutate_many");
            for (key, mutation) in rows {
                store.mutate(&key, mutation, tx)?;
            }
        }
        Ok(())
    }

    fn begin_transaction(&self, config: TransactionConfig) -> Result<StoreTransaction> {
        self.ensure_open()?;
        Ok(StoreTransaction::new(config))
    }

    fn features(&self) -> &StoreFeatures {
        &self.features
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn exists(&self) -> Result<bool> {
        self.ensure_open()?;
        let tx = StoreTransaction::new(TransactionConfig::default());
        Ok(self.stores.iter().any(|store| !store.is_empty(&tx)))
    }

    fn clear_storage(&self) -> Result<()> {
        self.ensure_open()?;
        for store in self.stores.iter() {
            store.clear();
        }
        self.stores.clear();
        debug!("kcv.inmemory.clear_storage");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        for store in self.stores.iter() {
            store.close()?;
        }
        self.stores.clear();
        debug!("kcv.inmemory.close");
        Ok(())
    }
}
