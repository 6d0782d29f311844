use super::TransactionConfig;

/// Capabilities a store manager advertises to query planning.
///
/// Built through [`StoreFeatures::builder`]; every flag defaults to `false`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreFeatures {
    unordered_scan: bool,
    ordered_scan: bool,
    multi_query: bool,
    locking: bool,
    optimistic_locking: bool,
    batch_mutation: bool,
    local_key_partition: bool,
    key_ordered: bool,
    distributed: bool,
    transactional: bool,
    key_consistent: bool,
    timestamps: bool,
    cell_ttl: bool,
    store_ttl: bool,
    visibility: bool,
    persists: bool,
    interruptible: bool,
    consistent_scan: bool,
    key_consistent_tx_config: Option<TransactionConfig>,
    local_key_consistent_tx_config: Option<TransactionConfig>,
}

impl StoreFeatures {
    /// Starts a builder with every flag off.
    pub fn builder() -> StoreFeaturesBuilder {
        StoreFeaturesBuilder::default()
    }

    /// Full-store scans without key order.
    pub fn has_unordered_scan(&self) -> bool {
        self.unordered_scan
    }

    /// Key-range scans in key order.
    pub fn has_ordered_scan(&self) -> bool {
        self.ordered_scan
    }

    /// Either kind of scan.
    pub fn has_scan(&self) -> bool {
        self.unordered_scan || self.ordered_scan
    }

    /// One physical request can serve slices of many keys.
    pub fn has_multi_query(&self) -> bool {
        self.multi_query
    }

    /// `acquire_lock` is implemented.
    pub fn has_locking(&self) -> bool {
        self.locking
    }

    /// Writes are guarded by optimistic concurrency.
    pub fn has_optimistic_locking(&self) -> bool {
        self.optimistic_locking
    }

    /// Multi-row mutation batches are sent as one request.
    pub fn has_batch_mutation(&self) -> bool {
        self.batch_mutation
    }

    /// Keys are range partitioned across local nodes.
    pub fn has_local_key_partition(&self) -> bool {
        self.local_key_partition
    }

    /// Keyspace is sorted rather than hash partitioned.
    pub fn is_key_ordered(&self) -> bool {
        self.key_ordered
    }

    /// Data lives on more than one machine.
    pub fn is_distributed(&self) -> bool {
        self.distributed
    }

    /// Transactions provide isolation.
    pub fn has_tx_isolation(&self) -> bool {
        self.transactional
    }

    /// Reads and writes of one key are consistent.
    pub fn is_key_consistent(&self) -> bool {
        self.key_consistent
    }

    /// Backend accepts caller timestamps.
    pub fn has_timestamps(&self) -> bool {
        self.timestamps
    }

    /// Per-entry TTL is honoured.
    pub fn has_cell_ttl(&self) -> bool {
        self.cell_ttl
    }

    /// Per-store TTL is honoured.
    pub fn has_store_ttl(&self) -> bool {
        self.store_ttl
    }

    /// Cell visibility labels are supported.
    pub fn has_visibility(&self) -> bool {
        self.visibility
    }

    /// Data survives a restart.
    pub fn is_persistent(&self) -> bool {
        self.persists
    }

    /// Blocking calls react to interruption.
    pub fn supports_interruption(&self) -> bool {
        self.interruptible
    }

    /// Scans see a consistent snapshot.
    pub fn has_consistent_scan(&self) -> bool {
        self.consistent_scan
    }

    /// Transaction configuration for globally key-consistent operations.
    pub fn key_consistent_tx_config(&self) -> Option<&TransactionConfig> {
        self.key_consistent_tx_config.as_ref()
    }

    /// Transaction configuration for locally key-consistent operations.
    pub fn local_key_consistent_tx_config(&self) -> Option<&TransactionConfig> {
        self.local_key_consistent_tx_config.as_ref()
    }
}

/// Builder for [`StoreFeatures`].
#[derive(Clone, Debug, Default)]
pub struct StoreFeaturesBuilder {
    features: StoreFeatures,
}

macro_rules! flag_setters {
    ($($(#[$doc:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $name(mut self, enabled: bool) -> Self {
                self.features.$name = enabled;
                self
            }
        )*
    };
}

impl StoreFeaturesBuilder {
    flag_setters!(
        /// Sets unordered scan support.
        unordered_scan,
        /// Sets ordered scan support.
        ordered_scan,
        /// Sets multi-query support.
        multi_query,
        /// Sets locking support.
        locking,
        /// Sets optimistic locking.
        optimistic_locking,
        /// Sets batch mutation support.
        batch_mutation,
        /// Sets local key partitioning.
        local_key_partition,
        /// Sets key ordering.
        key_ordered,
        /// Sets distribution.
        distributed,
        /// Sets transactional isolation.
        transactional,
        /// Sets key consistency.
        key_consistent,
        /// Sets timestamp support.
        timestamps,
        /// Sets cell TTL support.
        cell_ttl,
        /// Sets store TTL support.
        store_ttl,
        /// Sets visibility support.
        visibility,
        /// Sets persistence.
        persists,
        /// Sets interruption support.
        interruptible,
        /// Sets consistent scans.
        consistent_scan,
    );

    /// Marks the store key consistent using the given transaction settings.
    pub fn key_consistent_with(
        mut self,
        global: TransactionConfig,
        local: Option<TransactionConfig>,
    ) -> Self {
        self.features.key_consistent = true;
        self.features.key_consistent_tx_config = Some(global);
        self.features.local_key_consistent_tx_config = local;
        self
    }

    /// Finishes the descriptor.
    pub fn build(self) -> StoreFeatures {
        self.features
    }
}
