#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::sync::{Arc, Once};
use std::thread;

use kcvgraph::primitives::bytes::StaticBuffer;
use kcvgraph::storage::inmemory::{InMemoryKeyColumnValueStore, InMemoryStoreManager};
use kcvgraph::storage::kcv::{
    Entry, KcvMutation, KeyColumnValueStore, KeyColumnValueStoreManager, KeyRangeQuery,
    KeySliceQuery, SliceQuery, StoreTransaction, TransactionConfig,
};
use kcvgraph::types::Result;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
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

fn column(i: u64) -> StaticBuffer {
    StaticBuffer::from_u64(i)
}

/// Column pairs share a value: 100, 100, 102, 102, ..., 198, 198.
fn value_of(i: u64) -> u64 {
    100 + (i / 2) * 2
}

fn transactional() -> TransactionConfig {
    TransactionConfig::default().with_transactional(true)
}

#[test]
fn hundred_properties_round_trip() -> Result<()> {
    init_tracing();
    let manager = InMemoryStoreManager::new();
    let store = manager.open_database("store1")?;
    let row = StaticBuffer::from("R");

    let tx = manager.begin_transaction(transactional())?;
    let mut mutation = KcvMutation::default();
    for i in 0..100u64 {
        let mut entry = Entry::new(column(i), StaticBuffer::from_u64(value_of(i)));
        if i % 2 == 0 {
            entry = entry.with_ttl(i as u32 + 1);
        }
        mutation.addition(entry);
    }
    store.mutate(&row, mutation, &tx)?;
    tx.commit()?;

    let tx = manager.begin_transaction(transactional())?;
    let query = KeySliceQuery::new(row.clone(), SliceQuery::new(column(0), column(100)).with_limit(1000));
    let entries = store.get_slice(&query, &tx)?;
    assert_eq!(entries.len(), 100);
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.column(), &column(i as u64));
        assert_eq!(entry.value().get_u64(0), value_of(i as u64));
        assert_eq!(entry.ttl().is_some(), i % 2 == 0, "ttl on column {i}");
    }
    assert!(entries.windows(2).all(|w| w[0].column() < w[1].column()));

    let mut delete = KcvMutation::default();
    delete.deletion(column(99));
    store.mutate(&row, delete, &tx)?;
    let entries = store.get_slice(&query, &tx)?;
    assert_eq!(entries.len(), 99);
    assert_eq!(entries.last().map(|e| e.column().clone()), Some(column(98)));
    tx.commit()?;
    Ok(())
}

#[test]
fn slices_honour_bounds_and_limits() -> Result<()> {
    let store = InMemoryKeyColumnValueStore::new("bounds");
    let tx = StoreTransaction::new(TransactionConfig::default());
    let key = StaticBuffer::from("row");
    let mut mutation = KcvMutation::default();
    for i in (0..50u64).map(|i| i * 3) {
        mutation.addition(Entry::new(column(i), column(i)));
    }
    store.mutate(&key, mutation, &tx)?;

    let mut rng = ChaCha8Rng::seed_from_u64(0x5eed);
    for _ in 0..200 {
        let a = rng.gen_range(0..160u64);
        let b = rng.gen_range(0..160u64);
        let (start, end) = (a.min(b), a.max(b));
        let limit = rng.gen_range(1..40usize);
        let slice = SliceQuery::new(column(start), column(end)).with_limit(limit);
        let entries = store.get_slice(&KeySliceQuery::new(key.clone(), slice), &tx)?;
        assert!(entries.len() <= limit);
        let expected: Vec<u64> = (0..50u64)
            .map(|i| i * 3)
            .filter(|c| *c >= start && *c < end)
            .take(limit)
            .collect();
        let got: Vec<u64> = entries.iter().map(|e| e.column().get_u64(0)).collect();
        assert_eq!(got, expected, "slice [{start}, {end}) limit {limit}");
    }

    let missing = KeySliceQuery::new(StaticBuffer::from("nope"), SliceQuery::new(column(0), column(10)));
    assert!(store.get_slice(&missing, &tx)?.is_empty());
    Ok(())
}

#[test]
fn random_mutations_match_model() -> Result<()> {
    let store = InMemoryKeyColumnValueStore::new("model");
    let tx = StoreTransaction::new(transactional());
    let key = StaticBuffer::from("row");
    let mut model: BTreeMap<u64, u64> = BTreeMap::new();
    let mut rng = ChaCha8Rng::seed_from_u64(7);

    for round in 0..300u64 {
        let mut mutation = KcvMutation::default();
        let mut added = BTreeMap::new();
        let mut deleted = Vec::new();
        for _ in 0..rng.gen_range(0..8) {
            let c = rng.gen_range(0..64u64);
            mutation.addition(Entry::new(column(c), column(round)));
            added.insert(c, round);
        }
        for _ in 0..rng.gen_range(0..8) {
            let c = rng.gen_range(0..64u64);
            mutation.deletion(column(c));
            deleted.push(c);
        }
        store.mutate(&key, mutation, &tx)?;
        for c in deleted {
            if !added.contains_key(&c) {
                model.remove(&c);
            }
        }
        model.extend(added);

        let entries = store.get_slice(
            &KeySliceQuery::new(key.clone(), SliceQuery::new(StaticBuffer::EMPTY, column(u64::MAX))),
            &tx,
        )?;
        let got: Vec<(u64, u64)> = entries
            .iter()
            .map(|e| (e.column().get_u64(0), e.value().get_u64(0)))
            .collect();
        let expected: Vec<(u64, u64)> = model.iter().map(|(c, v)| (*c, *v)).collect();
        assert_eq!(got, expected, "round {round}");
    }
    Ok(())
}

#[test]
fn readers_never_see_torn_rows() -> Result<()> {
    let store = Arc::new(InMemoryKeyColumnValueStore::new("snapshots"));
    let key = StaticBuffer::from("row");
    let writer = {
        let store = Arc::clone(&store);
        let key = key.clone();
        thread::spawn(move || -> Result<()> {
            let tx = StoreTransaction::new(transactional());
            for generation in 0..200u64 {
                let mut mutation = KcvMutation::default();
                for c in 0..16u64 {
                    mutation.addition(Entry::new(column(c), column(generation)));
                }
                store.mutate(&key, mutation, &tx)?;
            }
            Ok(())
        })
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = Arc::clone(&store);
            let key = key.clone();
            thread::spawn(move || -> Result<()> {
                let tx = StoreTransaction::new(TransactionConfig::default());
                let slice = SliceQuery::new(StaticBuffer::EMPTY, column(u64::MAX));
                for _ in 0..200 {
                    let entries = store.get_slice(&KeySliceQuery::new(key.clone(), slice.clone()), &tx)?;
                    if let Some(first) = entries.first() {
                        assert_eq!(entries.len(), 16);
                        assert!(entries.iter().all(|e| e.value() == first.value()));
                    }
                }
                Ok(())
            })
        })
        .collect();
    writer.join().expect("writer panicked")?;
    for reader in readers {
        reader.join().expect("reader panicked")?;
    }
    Ok(())
}

#[test]
fn key_scans_skip_empty_rows() -> Result<()> {
    let store = InMemoryKeyColumnValueStore::new("scan");
    let tx = StoreTransaction::new(TransactionConfig::default());
    for (key, col) in [("a", 1u64), ("b", 50), ("c", 2), ("d", 3)] {
        let mut mutation = KcvMutation::default();
        mutation.addition(Entry::new(column(col), "v"));
        store.mutate(&StaticBuffer::from(key), mutation, &tx)?;
    }
    let slice = SliceQuery::new(column(0), column(10));
    let keys: Vec<StaticBuffer> = store
        .get_keys_range(
            &KeyRangeQuery::new(StaticBuffer::from("a"), StaticBuffer::from("d"), slice.clone()),
            &tx,
        )?
        .map(|row| row.key)
        .collect();
    assert_eq!(keys, vec![StaticBuffer::from("a"), StaticBuffer::from("c")]);

    let mut all: Vec<StaticBuffer> = store.get_keys(&slice, &tx)?.map(|row| row.key).collect();
    all.sort();
    assert_eq!(
        all,
        vec![StaticBuffer::from("a"), StaticBuffer::from("c"), StaticBuffer::from("d")]
    );
    Ok(())
}
