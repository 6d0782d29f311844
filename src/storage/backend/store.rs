use std::sync::Arc;

use tracing::debug;

use super::{AsyncBridge, AsyncSliceExecutor, ColumnValueGetter, SliceSession};
use crate::primitives::bytes::StaticBuffer;
use crate::storage::kcv::{
    execute_with_retry, EntryList, KcvMutation, KeyColumnValueStore, KeyIterator, KeyRangeQuery,
    KeySliceQuery, KeyedEntries, NoRetry, RetryPolicy, SliceQuery, StoreTransaction,
};
use crate::types::{Result, StorageError};

/// Synchronous [`KeyColumnValueStore`] over an asynchronous slice session.
///
/// Reads use the transaction's read consistency, writes its write
/// consistency. Blocking waits honour the transaction's interrupt flag and
/// failed calls go through the configured [`RetryPolicy`].
pub struct BackendStore<S, G> {
    name: String,
    executor: AsyncSliceExecutor<S, G>,
    bridge: Arc<AsyncBridge>,
    retry: Arc<dyn RetryPolicy>,
}

impl<S, G> BackendStore<S, G>
where
    S: SliceSession,
    G: ColumnValueGetter<S::Row>,
{
    /// Creates a store named `name` without retries.
    pub fn new(
        name: impl Into<String>,
        executor: AsyncSliceExecutor<S, G>,
        bridge: Arc<AsyncBridge>,
    ) -> Self {
        Self {
            name: name.into(),
            executor,
            bridge,
            retry: Arc::new(NoRetry),
        }
    }

    /// Replaces the retry policy.
    pub fn with_retry_policy(mut self, retry: Arc<dyn RetryPolicy>) -> Self {
        self.retry = retry;
        self
    }

    /// Executor used for every request.
    pub fn executor(&self) -> &AsyncSliceExecutor<S, G> {
        &self.executor
    }

    /// Exact `columns` of row `key`.
    pub fn get_columns(
        &self,
        key: &StaticBuffer,
        columns: &[StaticBuffer],
        limit: usize,
        tx: &StoreTransaction,
    ) -> Result<EntryList> {
        let interrupt = tx.interrupt_flag();
        execute_with_retry(self.retry.as_ref(), interrupt, || {
            self.bridge.block_on(
                interrupt,
                self.executor.execute_single_key_multi_column(
                    key,
                    columns,
                    limit,
                    tx.read_consistency(),
                ),
            )
        })
    }
}

impl<S, G> KeyColumnValueStore for BackendStore<S, G>
where
    S: SliceSession,
    G: ColumnValueGetter<S::Row>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn get_slice(&self, query: &KeySliceQuery, tx: &StoreTransaction) -> Result<EntryList> {
        let interrupt = tx.interrupt_flag();
        execute_with_retry(self.retry.as_ref(), interrupt, || {
            self.bridge.block_on(
                interrupt,
                self.executor.execute_single_key_slice(
                    &query.key,
                    &query.slice,
                    tx.read_consistency(),
                ),
            )
        })
    }

    fn get_slice_multi(
        &self,
        keys: &[StaticBuffer],
        slice: &SliceQuery,
        tx: &StoreTransaction,
    ) -> Result<KeyedEntries> {
        let interrupt = tx.interrupt_flag();
        execute_with_retry(self.retry.as_ref(), interrupt, || {
            self.bridge.block_on(
                interrupt,
                self.executor
                    .execute_multi_key_slice(keys, slice, tx.read_consistency()),
            )
        })
    }

    fn mutate(
        &self,
        key: &StaticBuffer,
        mutation: KcvMutation,
        tx: &StoreTransaction,
    ) -> Result<()> {
        let mutation = match tx.commit_timestamp() {
            Some(timestamp) => {
                let (additions, deletions) = mutation.into_parts();
                let additions = additions
                    .into_iter()
                    .map(|entry| match entry.meta().timestamp {
                        Some(_) => entry,
                        None => entry.with_timestamp(timestamp),
                    })
                    .collect();
                KcvMutation::new(additions, deletions)
            }
            None => mutation,
        };
        let interrupt = tx.interrupt_flag();
        let session = self.executor.session();
        let gate = self.executor.back_pressure();
        execute_with_retry(self.retry.as_ref(), interrupt, || {
            let mutation = mutation.clone();
            self.bridge.block_on(interrupt, async {
                let _permit = gate.acquire().await?;
                session.mutate(key, mutation, tx.write_consistency()).await
            })
        })
    }

    fn get_keys_range(&self, _query: &KeyRangeQuery, _tx: &StoreTransaction) -> Result<KeyIterator> {
        Err(StorageError::Unsupported("ordered key scan on backend store"))
    }

    fn get_keys(&self, _slice: &SliceQuery, _tx: &StoreTransaction) -> Result<KeyIterator> {
        Err(StorageError::Unsupported("unordered key scan on backend store"))
    }

    fn close(&self) -> Result<()> {
        self.executor.back_pressure().close();
        debug!(store = %self.name, "kcv.backend.close");
        Ok(())
    }
}
