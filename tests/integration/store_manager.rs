#![allow(missing_docs)]

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use kcvgraph::config::StorageConfig;
use kcvgraph::primitives::bytes::StaticBuffer;
use kcvgraph::storage::inmemory::InMemoryStoreManager;
use kcvgraph::storage::kcv::{
    ConsistencyLevel, Entry, KcvMutation, KeyColumnValueStoreManager, KeySliceQuery, SliceQuery,
    StoreMutations,
};
use kcvgraph::storage::metrics::CounterMetrics;
use kcvgraph::types::{Result, StorageError};
use rustc_hash::FxHashMap;

fn full_slice(key: &str) -> KeySliceQuery {
    KeySliceQuery::new(
        StaticBuffer::from(key),
        SliceQuery::new(StaticBuffer::EMPTY, StaticBuffer::from_u64(u64::MAX)),
    )
}

fn put(column: &str, value: &str) -> KcvMutation {
    let mut mutation = KcvMutation::default();
    mutation.addition(Entry::new(column, value));
    mutation
}

#[test]
fn features_drive_planning_decisions() {
    let manager = InMemoryStoreManager::new();
    let features = manager.features();
    assert!(features.is_key_ordered());
    assert!(features.has_ordered_scan());
    assert!(features.has_unordered_scan());
    assert!(features.has_multi_query());
    assert!(features.has_optimistic_locking());
    assert!(!features.has_locking());
    assert!(!features.is_persistent());
    assert!(!features.is_distributed());
    assert!(features.key_consistent_tx_config().is_some());
    assert_eq!(manager.name(), "inmemory");
}

#[test]
fn configured_transaction_reaches_stores() -> Result<()> {
    let config = StorageConfig::from_toml_str(
        "[storage]\ntransactional = true\nread_consistency = \"one\"\n",
    )
    .map_err(|err| StorageError::permanent(err.to_string()))?;
    let manager = InMemoryStoreManager::new();
    let tx = manager.begin_transaction(config.transaction_config())?;
    assert!(tx.is_transactional());
    assert_eq!(tx.read_consistency(), ConsistencyLevel::One);
    assert_eq!(tx.write_consistency(), ConsistencyLevel::Quorum);

    let store = manager.open_database("edges")?;
    store.mutate(&StaticBuffer::from("v1"), put("c", "x"), &tx)?;
    tx.commit()?;
    assert!(matches!(tx.commit(), Err(StorageError::Closed(_))));
    Ok(())
}

#[test]
fn mutate_many_reaches_every_row() -> Result<()> {
    let metrics = Arc::new(CounterMetrics::default());
    let manager = InMemoryStoreManager::with_metrics(metrics.clone());
    let tx = manager.begin_transaction(Default::default())?;

    let mut batch: StoreMutations = FxHashMap::default();
    for store in ["props", "edges", "index"] {
        let mut rows = FxHashMap::default();
        for row in ["a", "b"] {
            rows.insert(StaticBuffer::from(row), put(store, row));
        }
        batch.insert(store.to_owned(), rows);
    }
    manager.mutate_many(batch, &tx)?;
    assert!(manager.exists()?);
    assert_eq!(metrics.stores_opened.load(Ordering::Relaxed), 3);
    assert_eq!(metrics.mutations.load(Ordering::Relaxed), 6);

    for store in ["props", "edges", "index"] {
        let store = manager.open_database(store)?;
        for row in ["a", "b"] {
            let entries = store.get_slice(&full_slice(row), &tx)?;
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].value(), &StaticBuffer::from(row));
        }
    }
    Ok(())
}

#[test]
fn concurrent_writers_on_one_row_keep_it_sorted() -> Result<()> {
    let manager = Arc::new(InMemoryStoreManager::new());
    let handles: Vec<_> = (0..8u64)
        .map(|worker| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || -> Result<()> {
                let store = manager.open_database("hot")?;
                let tx = manager.begin_transaction(
                    kcvgraph::storage::kcv::TransactionConfig::default().with_transactional(true),
                )?;
                for i in 0..50u64 {
                    let mut mutation = KcvMutation::default();
                    mutation.addition(Entry::new(
                        StaticBuffer::from_u64(worker * 1000 + i),
                        StaticBuffer::from_u64(i),
                    ));
                    if i % 5 == 0 {
                        mutation.deletion(StaticBuffer::from_u64(worker * 1000 + i));
                    }
                    store.mutate(&StaticBuffer::from("row"), mutation, &tx)?;
                }
                Ok(())
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("writer panicked")?;
    }
    let store = manager.open_database("hot")?;
    let tx = manager.begin_transaction(Default::default())?;
    let entries = store.get_slice(&full_slice("row"), &tx)?;
    assert_eq!(entries.len(), 8 * 50);
    assert!(entries.windows(2).all(|w| w[0].column() < w[1].column()));
    Ok(())
}

#[test]
fn clear_and_close_lifecycle() -> Result<()> {
    let manager = InMemoryStoreManager::new();
    let tx = manager.begin_transaction(Default::default())?;
    let store = manager.open_database("s")?;
    assert!(!manager.exists()?);
    store.mutate(&StaticBuffer::from("k"), put("c", "v"), &tx)?;
    assert!(manager.exists()?);

    let lock = store.acquire_lock(&StaticBuffer::from("k"), &StaticBuffer::from("c"), None, &tx);
    assert!(matches!(lock, Err(StorageError::Unsupported(_))));

    manager.clear_storage()?;
    assert!(!manager.exists()?);
    let reopened = manager.open_database("s")?;
    assert!(reopened.get_slice(&full_slice("k"), &tx)?.is_empty());

    manager.close()?;
    assert!(matches!(manager.open_database("s"), Err(StorageError::Closed(_))));
    assert!(matches!(
        manager.begin_transaction(Default::default()),
        Err(StorageError::Closed(_))
    ));
    Ok(())
}
