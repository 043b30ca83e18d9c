//! End-to-end passivation behavior over the filesystem store.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use torpor_config::{PASSIVATING_STORE, SettingsHandle, StoreSettings};
use torpor_session::{
    EntryState, EntryStore, Error, FilePersistentStore, Locator, MemoryEntryStore,
    MemoryPersistentStore, PassivationManager, PersistentStore, SessionId, Sweeper, encode,
    with_timeout,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Cart {
    items: Vec<String>,
}

fn cart(items: &[&str]) -> Cart {
    Cart {
        items: items.iter().map(|s| s.to_string()).collect(),
    }
}

fn settings(max_size: usize, idle: Duration) -> SettingsHandle {
    SettingsHandle::new(
        StoreSettings::new()
            .with_max_size(max_size)
            .with_idle_timeout(idle)
            .with_default_store(PASSIVATING_STORE),
    )
    .unwrap()
}

fn file_manager(
    dir: &TempDir,
    entries: Arc<MemoryEntryStore<SessionId, Cart>>,
    max_size: usize,
) -> PassivationManager<SessionId, Cart> {
    PassivationManager::<SessionId, Cart>::new(
        entries,
        Arc::new(FilePersistentStore::open(dir.path()).unwrap()),
        settings(max_size, Duration::ZERO),
    )
}

#[tokio::test]
async fn test_max_size_scenario_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let manager = file_manager(&dir, Arc::new(MemoryEntryStore::new()), 1);
    let (a, b) = (SessionId::new(), SessionId::new());

    manager.create_value(&a).await.unwrap();
    manager.update(&a, cart(&["apple"])).await.unwrap();
    manager.create_value(&b).await.unwrap();

    assert_eq!(manager.state(&a).await.unwrap(), EntryState::Passivated);
    assert_eq!(manager.state(&b).await.unwrap(), EntryState::Active);

    let store = FilePersistentStore::open(dir.path()).unwrap();
    assert_eq!(store.names().unwrap(), vec![a.to_string()]);

    assert_eq!(
        manager.find_value(&a).await.unwrap(),
        Some(cart(&["apple"]))
    );
    assert_eq!(manager.state(&a).await.unwrap(), EntryState::Active);
    assert_eq!(store.names().unwrap(), vec![b.to_string()]);
}

#[tokio::test]
async fn test_records_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let key = SessionId::new();
    {
        let manager = file_manager(&dir, Arc::new(MemoryEntryStore::new()), 0);
        manager.create_value(&key).await.unwrap();
        manager.update(&key, cart(&["pear"])).await.unwrap();
        assert!(manager.passivate(&key).await.unwrap());
    }

    // Fresh process: empty entry store, same directory
    let manager = file_manager(&dir, Arc::new(MemoryEntryStore::new()), 0);
    assert_eq!(manager.state(&key).await.unwrap(), EntryState::Passivated);
    assert_eq!(manager.find_value(&key).await.unwrap(), Some(cart(&["pear"])));
    assert_eq!(manager.find_value(&key).await.unwrap(), Some(cart(&["pear"])));
    assert_eq!(manager.stats().activations, 1);
    assert_eq!(manager.stats().hits, 1);
}

#[tokio::test]
async fn test_crash_after_write_before_remove() {
    let dir = tempfile::tempdir().unwrap();
    let entries = Arc::new(MemoryEntryStore::<SessionId, Cart>::new());
    let key = SessionId::new();

    // Eviction wrote the record and died before removing the entry
    entries
        .put_if_absent(&key, cart(&["fig"]), true)
        .await
        .unwrap();
    let store = FilePersistentStore::open(dir.path()).unwrap();
    store
        .write(&key, encode(&key, &cart(&["fig"])).unwrap())
        .await
        .unwrap();

    // Surviving members still see the entry
    let manager = file_manager(&dir, entries, 0);
    assert_eq!(manager.find_value(&key).await.unwrap(), Some(cart(&["fig"])));

    // Losing the entry store as well leaves the record
    let manager = file_manager(&dir, Arc::new(MemoryEntryStore::new()), 0);
    assert_eq!(manager.find_value(&key).await.unwrap(), Some(cart(&["fig"])));
}

#[tokio::test]
async fn test_repeat_passivation_overwrites_record() {
    let dir = tempfile::tempdir().unwrap();
    let manager = file_manager(&dir, Arc::new(MemoryEntryStore::new()), 0);
    let key = SessionId::new();

    manager.create_value(&key).await.unwrap();
    manager.passivate(&key).await.unwrap();
    manager.update(&key, cart(&["kiwi"])).await.unwrap();
    manager.passivate(&key).await.unwrap();

    let store = FilePersistentStore::open(dir.path()).unwrap();
    assert_eq!(store.len().unwrap(), 1);
    assert_eq!(manager.find_value(&key).await.unwrap(), Some(cart(&["kiwi"])));
}

#[tokio::test]
async fn test_corrupt_record_is_retryable() {
    let dir = tempfile::tempdir().unwrap();
    let manager = file_manager(&dir, Arc::new(MemoryEntryStore::new()), 0);
    let key = SessionId::new();

    let store = FilePersistentStore::open(dir.path()).unwrap();
    store.write(&key, b"{\"key\":".to_vec()).await.unwrap();

    for _ in 0..2 {
        let err = manager.find_value(&key).await.unwrap_err();
        assert!(matches!(err, Error::Deserialization { .. }));
        assert!(err.is_recoverable());
    }
    assert_eq!(manager.state(&key).await.unwrap(), EntryState::Passivated);

    // Once repaired, the record restores normally
    store
        .write(&key, encode(&key, &cart(&["plum"])).unwrap())
        .await
        .unwrap();
    assert_eq!(manager.find_value(&key).await.unwrap(), Some(cart(&["plum"])));
}

#[tokio::test]
async fn test_record_for_other_key_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let manager = file_manager(&dir, Arc::new(MemoryEntryStore::new()), 0);
    let (key, other) = (SessionId::new(), SessionId::new());

    let store = FilePersistentStore::open(dir.path()).unwrap();
    store
        .write(&key, encode(&other, &cart(&[])).unwrap())
        .await
        .unwrap();

    assert!(matches!(
        manager.find_value(&key).await,
        Err(Error::Deserialization { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_idle_sweep_with_background_task() {
    let manager = PassivationManager::<SessionId, Cart>::new(
        Arc::new(MemoryEntryStore::new()),
        Arc::new(MemoryPersistentStore::new()),
        settings(1, Duration::from_secs(1)),
    );
    let (a, b) = (SessionId::new(), SessionId::new());
    manager.create_value(&a).await.unwrap();
    manager.create_value(&b).await.unwrap();
    assert_eq!(manager.state(&a).await.unwrap(), EntryState::Passivated);

    let sweeper = Sweeper::spawn(manager.clone(), Duration::from_millis(100));

    // Restoring A pushes B out at once
    manager.find_value(&a).await.unwrap();
    assert_eq!(manager.state(&b).await.unwrap(), EntryState::Passivated);

    // A stays while accessed, then idles out
    for _ in 0..5 {
        tokio::time::sleep(Duration::from_millis(500)).await;
        manager.find_value(&a).await.unwrap();
    }
    assert_eq!(manager.state(&a).await.unwrap(), EntryState::Active);

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(manager.state(&a).await.unwrap(), EntryState::Passivated);
    assert_eq!(manager.entry_store().len().await.unwrap(), 0);

    sweeper.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_caller_timeout() {
    let manager = PassivationManager::<SessionId, Cart>::new(
        Arc::new(MemoryEntryStore::new()),
        Arc::new(MemoryPersistentStore::new()),
        settings(0, Duration::ZERO),
    );
    let key = SessionId::new();

    let value = with_timeout(Duration::from_secs(1), manager.create_value(&key))
        .await
        .unwrap();
    assert_eq!(value, Cart::default());

    let err = with_timeout(
        Duration::from_millis(10),
        std::future::pending::<torpor_session::Result<Cart>>(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
}

#[derive(Debug, Clone)]
enum Op {
    Create(u8),
    Find(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![(0u8..8).prop_map(Op::Create), (0u8..8).prop_map(Op::Find)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// With `max-size = M`, the resident keys are always the M most recently
    /// touched ones, and every created key remains reachable.
    #[test]
    fn prop_max_size_keeps_most_recent(max_size in 1usize..4, ops in prop::collection::vec(op(), 1..40)) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let persistent = Arc::new(MemoryPersistentStore::<String>::new());
            let manager = PassivationManager::<String, u32>::new(
                Arc::new(MemoryEntryStore::new()),
                persistent.clone(),
                settings(max_size, Duration::ZERO),
            );

            // Keys in recency order, most recent last
            let mut recency: Vec<String> = Vec::new();
            for op in ops {
                let (key, create) = match op {
                    Op::Create(k) => (format!("k{k}"), true),
                    Op::Find(k) => (format!("k{k}"), false),
                };
                let known = recency.contains(&key);
                let found = if create {
                    Some(manager.create_value(&key).await.unwrap())
                } else {
                    manager.find_value(&key).await.unwrap()
                };
                prop_assert_eq!(found.is_some(), create || known);
                if found.is_some() {
                    recency.retain(|k| k != &key);
                    recency.push(key);
                }

                let resident = manager.entry_store().entries().await.unwrap();
                let resident: Vec<String> = resident.into_iter().map(|e| e.key).collect();
                let expected: Vec<String> =
                    recency.iter().rev().take(max_size).rev().cloned().collect();
                prop_assert_eq!(&resident, &expected);
                prop_assert_eq!(persistent.len(), recency.len() - expected.len());
            }
            Ok(())
        })?;
    }
}

#[tokio::test]
async fn test_long_keys_passivate_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let manager = PassivationManager::<String, Cart>::new(
        Arc::new(MemoryEntryStore::new()),
        Arc::new(FilePersistentStore::open(dir.path()).unwrap()),
        settings(1, Duration::ZERO),
    );
    let (long, other) = ("x".repeat(200), "y".repeat(300));

    manager.create_value(&long).await.unwrap();
    manager.update(&long, cart(&["melon"])).await.unwrap();
    manager.create_value(&other).await.unwrap();
    assert_eq!(manager.state(&long).await.unwrap(), EntryState::Passivated);

    let store = FilePersistentStore::open(dir.path()).unwrap();
    assert_eq!(store.names().unwrap(), vec![long.clone()]);
    assert_eq!(manager.find_value(&long).await.unwrap(), Some(cart(&["melon"])));
    assert_eq!(manager.state(&other).await.unwrap(), EntryState::Passivated);
}
