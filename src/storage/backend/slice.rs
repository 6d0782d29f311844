use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, trace};

use crate::primitives::bytes::StaticBuffer;
use crate::primitives::concurrency::QueryBackPressure;
use crate::storage::kcv::{
    ConsistencyLevel, Entry, EntryList, EntryMetaData, KcvMutation, KeyedEntries, SliceQuery,
};
use crate::types::{Result, StorageError};

/// Opaque continuation token returned by a paged backend response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PagingState(pub StaticBuffer);

/// A backend-native read request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NativeRequest {
    /// One row, one column range.
    SingleKeySlice {
        /// Row key.
        key: StaticBuffer,
        /// Column range and per-row limit.
        slice: SliceQuery,
    },
    /// Several rows, the same column range for each.
    MultiKeySlice {
        /// Row keys.
        keys: Vec<StaticBuffer>,
        /// Column range and per-row limit.
        slice: SliceQuery,
    },
    /// One row, an explicit column list.
    SingleKeyMultiColumn {
        /// Row key.
        key: StaticBuffer,
        /// Exact columns to fetch.
        columns: Vec<StaticBuffer>,
        /// Maximum number of entries.
        limit: usize,
    },
}

/// One page of native rows.
#[derive(Debug)]
pub struct NativePage<R> {
    /// Rows in the order the backend returned them.
    pub rows: Vec<R>,
    /// Present while more pages follow.
    pub paging_state: Option<PagingState>,
}

/// Connection to a backend able to run native slice requests.
///
/// Implementations wrap a driver session. Futures must be `Send` so requests
/// can be fanned out across the runtime.
pub trait SliceSession: Send + Sync + 'static {
    /// Native row type handed to the [`ColumnValueGetter`].
    type Row: Send + 'static;

    /// Fetches one page of `request`, resuming from `paging` if given.
    fn execute(
        &self,
        request: &NativeRequest,
        consistency: ConsistencyLevel,
        page_size: usize,
        paging: Option<PagingState>,
    ) -> impl Future<Output = Result<NativePage<Self::Row>>> + Send;

    /// Applies a row mutation.
    fn mutate(
        &self,
        key: &StaticBuffer,
        mutation: KcvMutation,
        consistency: ConsistencyLevel,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Extracts column, value and metadata from a native row.
pub trait ColumnValueGetter<R>: Send + Sync + 'static {
    /// Column bytes.
    fn column(&self, row: &R) -> StaticBuffer;

    /// Value bytes.
    fn value(&self, row: &R) -> StaticBuffer;

    /// Row key, TTL and timestamp when the backend reports them.
    fn meta(&self, _row: &R) -> EntryMetaData {
        EntryMetaData::default()
    }
}

fn to_entry<R, G: ColumnValueGetter<R> + ?Sized>(getter: &G, row: &R) -> Entry {
    let meta = getter.meta(row);
    let mut entry = Entry::new(getter.column(row), getter.value(row));
    if let Some(ttl) = meta.ttl {
        entry = entry.with_ttl(ttl);
    }
    if let Some(timestamp) = meta.timestamp {
        entry = entry.with_timestamp(timestamp);
    }
    if let Some(key) = meta.row_key {
        entry = entry.with_row_key(key);
    }
    entry
}

/// Paging and grouping knobs of an [`AsyncSliceExecutor`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SliceOptions {
    /// Rows per native page.
    pub page_size: usize,
    /// Keys per native multi-key request.
    pub keys_grouping_limit: usize,
}

impl Default for SliceOptions {
    fn default() -> Self {
        Self {
            page_size: 5000,
            keys_grouping_limit: 20,
        }
    }
}

/// Runs slice requests against a [`SliceSession`].
///
/// Every page waits for a back-pressure permit and returns it as soon as the
/// page arrives or fails. Decoding of native rows runs on the blocking pool.
pub struct AsyncSliceExecutor<S, G> {
    session: Arc<S>,
    getter: Arc<G>,
    back_pressure: QueryBackPressure,
    options: SliceOptions,
}

impl<S, G> Clone for AsyncSliceExecutor<S, G> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            getter: Arc::clone(&self.getter),
            back_pressure: self.back_pressure.clone(),
            options: self.options,
        }
    }
}

impl<S, G> AsyncSliceExecutor<S, G>
where
    S: SliceSession,
    G: ColumnValueGetter<S::Row>,
{
    /// Creates an executor; option values below 1 are raised to 1.
    pub fn new(
        session: Arc<S>,
        getter: Arc<G>,
        back_pressure: QueryBackPressure,
        options: SliceOptions,
    ) -> Self {
        let options = SliceOptions {
            page_size: options.page_size.max(1),
            keys_grouping_limit: options.keys_grouping_limit.max(1),
        };
        Self {
            session,
            getter,
            back_pressure,
            options,
        }
    }

    /// Gate shared by all requests of this executor.
    pub fn back_pressure(&self) -> &QueryBackPressure {
        &self.back_pressure
    }

    /// Session the executor issues requests on.
    pub fn session(&self) -> &Arc<S> {
        &self.session
    }

    /// Entries of one row in `slice`.
    pub async fn execute_single_key_slice(
        &self,
        key: &StaticBuffer,
        slice: &SliceQuery,
        consistency: ConsistencyLevel,
    ) -> Result<EntryList> {
        let request = NativeRequest::SingleKeySlice {
            key: key.clone(),
            slice: slice.clone(),
        };
        self.run_paged(request, consistency, slice.limit()).await
    }

    /// Exact `columns` of one row.
    pub async fn execute_single_key_multi_column(
        &self,
        key: &StaticBuffer,
        columns: &[StaticBuffer],
        limit: usize,
        consistency: ConsistencyLevel,
    ) -> Result<EntryList> {
        let request = NativeRequest::SingleKeyMultiColumn {
            key: key.clone(),
            columns: columns.to_vec(),
            limit,
        };
        self.run_paged(request, consistency, limit).await
    }

    /// The same slice over many rows.
    ///
    /// Keys are sent in groups of `keys_grouping_limit`, groups run
    /// concurrently, and every requested key is present in the result.
    /// Repeated keys are requested once.
    pub async fn execute_multi_key_slice(
        &self,
        keys: &[StaticBuffer],
        slice: &SliceQuery,
        consistency: ConsistencyLevel,
    ) -> Result<KeyedEntries> {
        let mut out = KeyedEntries::new();
        let mut unique = Vec::with_capacity(keys.len());
        for key in keys {
            if out.insert(key.clone(), Vec::new()).is_none() {
                unique.push(key.clone());
            }
        }
        let mut groups = JoinSet::new();
        for chunk in unique.chunks(self.options.keys_grouping_limit) {
            let executor = self.clone();
            let request = NativeRequest::MultiKeySlice {
                keys: chunk.to_vec(),
                slice: slice.clone(),
            };
            groups.spawn(async move {
                executor
                    .run_paged(request, consistency, usize::MAX)
                    .await
            });
        }
        debug!(keys = unique.len(), groups = groups.len(), "kcv.backend.multi_key_slice");

        let mut first_err = None;
        while let Some(joined) = groups.join_next().await {
            let entries = match joined {
                Ok(Ok(entries)) => entries,
                Ok(Err(err)) => {
                    first_err.get_or_insert(err);
                    continue;
                }
                Err(join_err) => {
                    first_err.get_or_insert(StorageError::permanent(format!(
                        "multi-key slice group failed: {join_err}"
                    )));
                    continue;
                }
            };
            for entry in entries {
                let Some(row_key) = entry.meta().row_key.clone() else {
                    first_err.get_or_insert(StorageError::permanent(
                        "multi-key slice row missing its row key",
                    ));
                    break;
                };
                match out.get_mut(&row_key) {
                    // Columns of a row stay strictly ascending.
                    Some(row)
                        if row.len() < slice.limit()
                            && row.last().map_or(true, |last| last.column() < entry.column()) =>
                    {
                        row.push(entry)
                    }
                    Some(_) => {}
                    None => {
                        first_err.get_or_insert(StorageError::permanent(
                            "multi-key slice returned an unrequested key",
                        ));
                        break;
                    }
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(out),
        }
    }

    async fn run_paged(
        &self,
        request: NativeRequest,
        consistency: ConsistencyLevel,
        limit: usize,
    ) -> Result<EntryList> {
        let mut entries = EntryList::new();
        let mut paging = None;
        let mut pages = 0usize;
        loop {
            let page = {
                let _permit = self.back_pressure.acquire().await?;
                self.session
                    .execute(&request, consistency, self.options.page_size, paging.take())
                    .await?
            };
            pages += 1;
            let NativePage { rows, paging_state } = page;
            let getter = Arc::clone(&self.getter);
            let decoded = tokio::task::spawn_blocking(move || {
                rows.iter()
                    .map(|row| to_entry(getter.as_ref(), row))
                    .collect::<Vec<_>>()
            })
            .await
            .map_err(|err| StorageError::permanent(format!("row decoding failed: {err}")))?;
            entries.extend(decoded);
            if entries.len() >= limit {
                entries.truncate(limit);
                break;
            }
            match paging_state {
                Some(state) => paging = Some(state),
                None => break,
            }
        }
        trace!(pages, entries = entries.len(), "kcv.backend.paged");
        Ok(entries)
    }
}
