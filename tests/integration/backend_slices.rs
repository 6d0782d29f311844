#![allow(missing_docs)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::thread;
use std::time::Duration;

use kcvgraph::primitives::bytes::StaticBuffer;
use kcvgraph::primitives::concurrency::{InterruptFlag, QueryBackPressure};
use kcvgraph::storage::backend::{
    AsyncBridge, AsyncSliceExecutor, BackendStore, ColumnValueGetter, NativePage, NativeRequest,
    PagingState, SliceOptions, SliceSession,
};
use kcvgraph::storage::inmemory::InMemoryKeyColumnValueStore;
use kcvgraph::storage::kcv::{
    ConsistencyLevel, Entry, EntryMetaData, FixedDelay, KcvMutation, KeyColumnValueStore,
    KeyRangeQuery, KeySliceQuery, SliceQuery, StoreTransaction, TransactionConfig,
};
use kcvgraph::types::{Result, StorageError};
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("kcvgraph=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .try_init();
    });
}

/// Native row of the fake backend: the row key plus the stored entry.
type FakeRow = (StaticBuffer, Entry);

/// Paged session over an in-memory store with optional failure injection.
struct FakeSession {
    store: Arc<InMemoryKeyColumnValueStore>,
    pages_served: AtomicUsize,
    /// Fail the call with this 1-based page number.
    fail_on_page: Mutex<Option<usize>>,
    /// Fail every multi-key request that includes this key.
    fail_on_key: Mutex<Option<StaticBuffer>>,
    delay: Mutex<Option<Duration>>,
    consistencies: Mutex<Vec<ConsistencyLevel>>,
}

impl FakeSession {
    fn new(store: Arc<InMemoryKeyColumnValueStore>) -> Self {
        Self {
            store,
            pages_served: AtomicUsize::new(0),
            fail_on_page: Mutex::new(None),
            fail_on_key: Mutex::new(None),
            delay: Mutex::new(None),
            consistencies: Mutex::new(Vec::new()),
        }
    }

    fn rows(&self, request: &NativeRequest) -> Result<Vec<FakeRow>> {
        let tx = StoreTransaction::new(TransactionConfig::default());
        let tagged = |key: &StaticBuffer, entries: Vec<Entry>| {
            entries
                .into_iter()
                .map(|entry| (key.clone(), entry))
                .collect::<Vec<_>>()
        };
        Ok(match request {
            NativeRequest::SingleKeySlice { key, slice } => {
                let query = KeySliceQuery::new(key.clone(), slice.clone());
                tagged(key, self.store.get_slice(&query, &tx)?)
            }
            NativeRequest::MultiKeySlice { keys, slice } => {
                let mut rows = Vec::new();
                for key in keys {
                    let query = KeySliceQuery::new(key.clone(), slice.clone());
                    rows.extend(tagged(key, self.store.get_slice(&query, &tx)?));
                }
                rows
            }
            NativeRequest::SingleKeyMultiColumn { key, columns, limit } => {
                let mut rows = Vec::new();
                for column in columns {
                    let mut end = column.as_slice().to_vec();
                    end.push(0);
                    let query =
                        KeySliceQuery::new(key.clone(), SliceQuery::new(column.clone(), end));
                    rows.extend(tagged(key, self.store.get_slice(&query, &tx)?));
                }
                rows.truncate(*limit);
                rows
            }
        })
    }
}

impl SliceSession for FakeSession {
    type Row = FakeRow;

    async fn execute(
        &self,
        request: &NativeRequest,
        consistency: ConsistencyLevel,
        page_size: usize,
        paging: Option<PagingState>,
    ) -> Result<NativePage<FakeRow>> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let page_no = self.pages_served.fetch_add(1, Ordering::SeqCst) + 1;
        if *self.fail_on_page.lock() == Some(page_no) {
            return Err(StorageError::temporary(format!("injected failure on page {page_no}")));
        }
        if let (Some(bad), NativeRequest::MultiKeySlice { keys, .. }) =
            (self.fail_on_key.lock().as_ref(), request)
        {
            if keys.contains(bad) {
                return Err(StorageError::temporary("injected failure for key group"));
            }
        }
        self.consistencies.lock().push(consistency);
        let offset = paging.map_or(0, |state| state.0.get_u64(0) as usize);
        let rows = self.rows(request)?;
        let end = (offset + page_size).min(rows.len());
        let paging_state =
            (end < rows.len()).then(|| PagingState(StaticBuffer::from_u64(end as u64)));
        Ok(NativePage {
            rows: rows[offset..end].to_vec(),
            paging_state,
        })
    }

    async fn mutate(
        &self,
        key: &StaticBuffer,
        mutation: KcvMutation,
        consistency: ConsistencyLevel,
    ) -> Result<()> {
        self.consistencies.lock().push(consistency);
        let tx = StoreTransaction::new(TransactionConfig::default().with_transactional(true));
        self.store.mutate(key, mutation, &tx)
    }
}

struct FakeGetter;

impl ColumnValueGetter<FakeRow> for FakeGetter {
    fn column(&self, row: &FakeRow) -> StaticBuffer {
        row.1.column().clone()
    }

    fn value(&self, row: &FakeRow) -> StaticBuffer {
        row.1.value().clone()
    }

    fn meta(&self, row: &FakeRow) -> EntryMetaData {
        EntryMetaData {
            row_key: Some(row.0.clone()),
            ..row.1.meta().clone()
        }
    }
}

fn seeded_store(rows: &[&str], columns: u64) -> Result<Arc<InMemoryKeyColumnValueStore>> {
    let store = Arc::new(InMemoryKeyColumnValueStore::new("native"));
    let tx = StoreTransaction::new(TransactionConfig::default());
    for row in rows {
        let mut mutation = KcvMutation::default();
        for c in 0..columns {
            mutation.addition(Entry::new(StaticBuffer::from_u64(c), *row));
        }
        store.mutate(&StaticBuffer::from(*row), mutation, &tx)?;
    }
    Ok(store)
}

fn executor(
    session: Arc<FakeSession>,
    gate: QueryBackPressure,
    page_size: usize,
    keys_grouping_limit: usize,
) -> AsyncSliceExecutor<FakeSession, FakeGetter> {
    AsyncSliceExecutor::new(
        session,
        Arc::new(FakeGetter),
        gate,
        SliceOptions {
            page_size,
            keys_grouping_limit,
        },
    )
}

fn all_columns() -> SliceQuery {
    SliceQuery::new(StaticBuffer::EMPTY, StaticBuffer::from_u64(u64::MAX))
}

#[tokio::test]
async fn pages_are_assembled_in_order() -> Result<()> {
    init_tracing();
    let session = Arc::new(FakeSession::new(seeded_store(&["r"], 23)?));
    let gate = QueryBackPressure::semaphore(2);
    let executor = executor(Arc::clone(&session), gate.clone(), 5, 20);

    let entries = executor
        .execute_single_key_slice(&StaticBuffer::from("r"), &all_columns(), ConsistencyLevel::One)
        .await?;
    let columns: Vec<u64> = entries.iter().map(|e| e.column().get_u64(0)).collect();
    assert_eq!(columns, (0..23).collect::<Vec<_>>());
    assert_eq!(session.pages_served.load(Ordering::SeqCst), 5);

    let stats = gate.stats();
    assert_eq!(stats.acquired, 5);
    assert_eq!(stats.acquired, stats.released);
    assert_eq!(gate.available_permits(), Some(2));
    assert!(session
        .consistencies
        .lock()
        .iter()
        .all(|level| *level == ConsistencyLevel::One));
    Ok(())
}

#[tokio::test]
async fn limit_stops_paging_early() -> Result<()> {
    let session = Arc::new(FakeSession::new(seeded_store(&["r"], 40)?));
    let gate = QueryBackPressure::semaphore(1);
    let executor = executor(Arc::clone(&session), gate.clone(), 4, 20);
    let slice = all_columns().with_limit(6);
    let entries = executor
        .execute_single_key_slice(&StaticBuffer::from("r"), &slice, ConsistencyLevel::Quorum)
        .await?;
    assert_eq!(entries.len(), 6);
    assert_eq!(session.pages_served.load(Ordering::SeqCst), 2);
    assert_eq!(gate.stats().in_flight(), 0);
    Ok(())
}

#[tokio::test]
async fn failed_page_releases_its_permit_once() -> Result<()> {
    let session = Arc::new(FakeSession::new(seeded_store(&["r"], 30)?));
    *session.fail_on_page.lock() = Some(3);
    let gate = QueryBackPressure::semaphore(1);
    let executor = executor(Arc::clone(&session), gate.clone(), 5, 20);

    let err = executor
        .execute_single_key_slice(&StaticBuffer::from("r"), &all_columns(), ConsistencyLevel::One)
        .await
        .unwrap_err();
    assert!(err.is_temporary());
    let stats = gate.stats();
    assert_eq!(stats.acquired, 3);
    assert_eq!(stats.released, 3);
    assert_eq!(gate.available_permits(), Some(1));
    Ok(())
}

#[tokio::test]
async fn multi_key_slices_are_grouped_and_split() -> Result<()> {
    let keys = ["a", "b", "c", "d", "e"];
    let session = Arc::new(FakeSession::new(seeded_store(&keys, 7)?));
    let gate = QueryBackPressure::semaphore(1);
    let executor = executor(Arc::clone(&session), gate.clone(), 3, 2);

    let mut requested: Vec<StaticBuffer> = keys.iter().map(|k| StaticBuffer::from(*k)).collect();
    requested.push(StaticBuffer::from("missing"));
    let slice = SliceQuery::new(StaticBuffer::from_u64(1), StaticBuffer::from_u64(6)).with_limit(4);
    let rows = executor
        .execute_multi_key_slice(&requested, &slice, ConsistencyLevel::All)
        .await?;

    assert_eq!(rows.len(), requested.len());
    for key in keys {
        let entries = &rows[&StaticBuffer::from(key)];
        let columns: Vec<u64> = entries.iter().map(|e| e.column().get_u64(0)).collect();
        assert_eq!(columns, vec![1, 2, 3, 4], "row {key}");
        assert!(entries.iter().all(|e| e.value() == &StaticBuffer::from(key)));
    }
    assert!(rows[&StaticBuffer::from("missing")].is_empty());
    let stats = gate.stats();
    assert!(stats.acquired >= 3, "one request per key group at least");
    assert_eq!(stats.acquired, stats.released);
    Ok(())
}

#[tokio::test]
async fn repeated_keys_are_fetched_once() -> Result<()> {
    let session = Arc::new(FakeSession::new(seeded_store(&["a", "b"], 3)?));
    let gate = QueryBackPressure::semaphore(2);
    let executor = executor(Arc::clone(&session), gate.clone(), 10, 2);

    let keys = [StaticBuffer::from("a"), StaticBuffer::from("b"), StaticBuffer::from("a")];
    let rows = executor
        .execute_multi_key_slice(&keys, &all_columns(), ConsistencyLevel::One)
        .await?;
    assert_eq!(rows.len(), 2);
    for key in ["a", "b"] {
        let columns: Vec<u64> = rows[&StaticBuffer::from(key)]
            .iter()
            .map(|e| e.column().get_u64(0))
            .collect();
        assert_eq!(columns, vec![0, 1, 2], "row {key}");
    }
    assert_eq!(session.pages_served.load(Ordering::SeqCst), 1);
    assert_eq!(gate.stats().acquired, gate.stats().released);
    Ok(())
}

#[tokio::test]
async fn failed_key_group_surfaces_and_balances_permits() -> Result<()> {
    let keys = ["a", "b", "c", "d", "e"];
    let session = Arc::new(FakeSession::new(seeded_store(&keys, 8)?));
    *session.fail_on_key.lock() = Some(StaticBuffer::from("c"));
    let gate = QueryBackPressure::semaphore(2);
    let executor = executor(Arc::clone(&session), gate.clone(), 3, 2);

    let requested: Vec<StaticBuffer> = keys.iter().map(|k| StaticBuffer::from(*k)).collect();
    let err = executor
        .execute_multi_key_slice(&requested, &all_columns(), ConsistencyLevel::One)
        .await
        .unwrap_err();
    assert!(err.is_temporary());

    let stats = gate.stats();
    // Groups [a, b] and [e] page through 16 and 8 rows; [c, d] fails on its first page.
    assert_eq!(stats.acquired, 6 + 3 + 1);
    assert_eq!(stats.acquired, stats.released);
    assert_eq!(gate.available_permits(), Some(2));
    Ok(())
}

#[tokio::test]
async fn multi_column_fetches_exact_columns() -> Result<()> {
    let session = Arc::new(FakeSession::new(seeded_store(&["r"], 10)?));
    let gate = QueryBackPressure::pass_all();
    let executor = executor(Arc::clone(&session), gate.clone(), 100, 20);
    let wanted: Vec<StaticBuffer> = [2u64, 5, 42, 7].iter().map(|c| StaticBuffer::from_u64(*c)).collect();
    let entries = executor
        .execute_single_key_multi_column(&StaticBuffer::from("r"), &wanted, 2, ConsistencyLevel::One)
        .await?;
    let columns: Vec<u64> = entries.iter().map(|e| e.column().get_u64(0)).collect();
    assert_eq!(columns, vec![2, 5]);
    assert_eq!(gate.stats().acquired, gate.stats().released);
    Ok(())
}

#[test]
fn backend_store_reads_and_writes_through_bridge() -> Result<()> {
    init_tracing();
    let native = seeded_store(&["r"], 12)?;
    let session = Arc::new(FakeSession::new(Arc::clone(&native)));
    let gate = QueryBackPressure::semaphore(4);
    let bridge = Arc::new(AsyncBridge::new(2)?);
    let store = BackendStore::new("edges", executor(Arc::clone(&session), gate.clone(), 5, 20), bridge);
    let tx = StoreTransaction::new(
        TransactionConfig::default()
            .with_read_consistency(ConsistencyLevel::LocalQuorum)
            .with_write_consistency(ConsistencyLevel::All),
    );

    let key = StaticBuffer::from("r");
    let entries = store.get_slice(&KeySliceQuery::new(key.clone(), all_columns()), &tx)?;
    assert_eq!(entries.len(), 12);

    let mut mutation = KcvMutation::default();
    mutation.deletion(StaticBuffer::from_u64(0));
    mutation.addition(Entry::new(StaticBuffer::from_u64(100), "new"));
    store.mutate(&key, mutation, &tx)?;
    assert_eq!(native.num_entries(&key), 12);

    let rows = store.get_slice_multi(&[key.clone(), StaticBuffer::from("other")], &all_columns(), &tx)?;
    assert_eq!(rows[&key].len(), 12);
    assert!(rows[&StaticBuffer::from("other")].is_empty());

    let cols = store.get_columns(&key, &[StaticBuffer::from_u64(100)], 10, &tx)?;
    assert_eq!(cols.len(), 1);
    assert_eq!(cols[0].value(), &StaticBuffer::from("new"));

    let levels = session.consistencies.lock().clone();
    assert!(levels.contains(&ConsistencyLevel::LocalQuorum));
    assert!(levels.contains(&ConsistencyLevel::All));

    let range = KeyRangeQuery::new(StaticBuffer::EMPTY, StaticBuffer::from("z"), all_columns());
    assert!(matches!(store.get_keys_range(&range, &tx), Err(StorageError::Unsupported(_))));
    assert!(matches!(store.get_keys(&all_columns(), &tx), Err(StorageError::Unsupported(_))));

    let stats = gate.stats();
    assert_eq!(stats.acquired, stats.released);
    store.close()?;
    let after_close = store.get_slice(&KeySliceQuery::new(key, all_columns()), &tx);
    assert!(matches!(after_close, Err(StorageError::Closed(_))));
    Ok(())
}

#[test]
fn commit_timestamp_stamps_backend_writes() -> Result<()> {
    let native = Arc::new(InMemoryKeyColumnValueStore::new("native"));
    let session = Arc::new(FakeSession::new(Arc::clone(&native)));
    let bridge = Arc::new(AsyncBridge::new(1)?);
    let store = BackendStore::new(
        "stamped",
        executor(session, QueryBackPressure::pass_all(), 10, 20),
        bridge,
    );
    let tx = StoreTransaction::new(
        TransactionConfig::default()
            .with_commit_timestamp(1_234)
            .with_group_name("loader"),
    );

    let key = StaticBuffer::from("r");
    let mut mutation = KcvMutation::default();
    mutation.addition(Entry::new(StaticBuffer::from_u64(1), "plain"));
    mutation.addition(Entry::new(StaticBuffer::from_u64(2), "own").with_timestamp(7));
    store.mutate(&key, mutation, &tx)?;

    let entries = native.get_slice(&KeySliceQuery::new(key, all_columns()), &tx)?;
    let stamps: Vec<Option<i64>> = entries.iter().map(|e| e.meta().timestamp).collect();
    assert_eq!(stamps, vec![Some(1_234), Some(7)]);
    Ok(())
}

#[test]
fn backend_store_retries_temporary_failures() -> Result<()> {
    let session = Arc::new(FakeSession::new(seeded_store(&["r"], 3)?));
    *session.fail_on_page.lock() = Some(1);
    let gate = QueryBackPressure::semaphore(1);
    let bridge = Arc::new(AsyncBridge::new(1)?);
    let store = BackendStore::new("props", executor(Arc::clone(&session), gate.clone(), 10, 20), bridge)
        .with_retry_policy(Arc::new(FixedDelay::new(3, Duration::from_millis(1))));
    let tx = StoreTransaction::new(TransactionConfig::default());

    let entries = store.get_slice(&KeySliceQuery::new(StaticBuffer::from("r"), all_columns()), &tx)?;
    assert_eq!(entries.len(), 3);
    assert_eq!(session.pages_served.load(Ordering::SeqCst), 2);
    let stats = gate.stats();
    assert_eq!(stats.acquired, 2);
    assert_eq!(stats.released, 2);
    Ok(())
}

#[test]
fn interrupting_a_wait_releases_the_permit() -> Result<()> {
    let session = Arc::new(FakeSession::new(seeded_store(&["r"], 3)?));
    *session.delay.lock() = Some(Duration::from_secs(30));
    let gate = QueryBackPressure::semaphore(1);
    let bridge = Arc::new(AsyncBridge::new(1)?);
    let store = BackendStore::new("slow", executor(Arc::clone(&session), gate.clone(), 10, 20), bridge);
    let interrupt = InterruptFlag::new();
    let tx = StoreTransaction::with_interrupt(TransactionConfig::default(), interrupt.clone());

    let raiser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        interrupt.interrupt();
    });
    let err = store
        .get_slice(&KeySliceQuery::new(StaticBuffer::from("r"), all_columns()), &tx)
        .unwrap_err();
    raiser.join().expect("raiser panicked");

    assert!(err.is_interrupted());
    assert!(err.is_permanent());
    assert!(tx.interrupt_flag().is_interrupted());
    let stats = gate.stats();
    assert_eq!(stats.acquired, 1);
    assert_eq!(stats.released, 1);
    assert_eq!(gate.available_permits(), Some(1));
    Ok(())
}
