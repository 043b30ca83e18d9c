//! Entry store adapter.
//!
//! The [`Locator`](crate::Locator) relies on exactly two primitives:
//! [`EntryStore::put_if_absent`] and [`EntryStore::get`]. The remaining
//! methods are ordinary reads and writes used by the passivation policy,
//! which guards them with its own per-key ordering.
//!
//! Implementations backed by a distributed cache must make `put_if_absent`
//! and `remove_if_unchanged` linearizable per key across the cluster.

use std::fmt;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

use crate::error::Result;
use crate::key::{StoreKey, StoreValue};

/// Entry held by the entry store.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// Current value.
    pub value: V,

    /// When the entry was last read or written.
    pub last_access: Instant,

    /// Access stamp, strictly increasing across the store on every touch.
    /// Orders entries by recency; ties cannot occur.
    pub stamp: u64,

    /// Whether the entry's store profile allows passivation.
    pub passivating: bool,
}

/// Entry metadata without the value, as listed by [`EntryStore::entries`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta<K> {
    pub key: K,
    pub last_access: Instant,
    pub stamp: u64,
    pub passivating: bool,
}

/// Result of a conditional insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome<V> {
    /// This call committed the value.
    Inserted { value: V, stamp: u64 },
    /// Another caller committed first; its value is returned.
    Existing(V),
}

impl<V> PutOutcome<V> {
    /// The value now associated with the key.
    pub fn into_value(self) -> V {
        match self {
            PutOutcome::Inserted { value, .. } | PutOutcome::Existing(value) => value,
        }
    }

    pub fn is_inserted(&self) -> bool {
        matches!(self, PutOutcome::Inserted { .. })
    }
}

/// In-memory, shared `Key -> Value` store.
#[async_trait]
pub trait EntryStore<K: StoreKey, V: StoreValue>: Send + Sync {
    /// Insert `value` only if `key` is absent.
    ///
    /// When the key exists, its access is refreshed and the existing value
    /// returned.
    async fn put_if_absent(&self, key: &K, value: V, passivating: bool) -> Result<PutOutcome<V>>;

    /// Read a value, refreshing its last access.
    async fn get(&self, key: &K) -> Result<Option<V>>;

    /// Read an entry without refreshing its last access.
    async fn peek(&self, key: &K) -> Result<Option<CacheEntry<V>>>;

    /// Replace the value of an existing entry. Returns `false` if absent.
    async fn write(&self, key: &K, value: V) -> Result<bool>;

    /// Remove the entry only if its stamp still equals `stamp`.
    async fn remove_if_unchanged(&self, key: &K, stamp: u64) -> Result<bool>;

    /// Remove the entry unconditionally.
    async fn remove(&self, key: &K) -> Result<Option<V>>;

    /// Metadata for every entry, least recently accessed first.
    async fn entries(&self) -> Result<Vec<EntryMeta<K>>>;

    /// Number of entries.
    async fn len(&self) -> Result<usize>;
}

struct MemoryInner<K: StoreKey, V> {
    lru: LruCache<K, CacheEntry<V>>,
    next_stamp: u64,
}

impl<K: StoreKey, V> MemoryInner<K, V> {
    fn next_stamp(&mut self) -> u64 {
        self.next_stamp += 1;
        self.next_stamp
    }
}

/// Entry store held in process memory.
///
/// Share one instance (behind an `Arc`) between several managers to model
/// cluster members over a common cache.
pub struct MemoryEntryStore<K: StoreKey, V> {
    inner: Mutex<MemoryInner<K, V>>,
}

impl<K: StoreKey, V> Default for MemoryEntryStore<K, V> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                lru: LruCache::unbounded(),
                next_stamp: 0,
            }),
        }
    }
}

impl<K: StoreKey, V> MemoryEntryStore<K, V> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<K: StoreKey, V> fmt::Debug for MemoryEntryStore<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryEntryStore")
            .field("len", &self.inner.lock().lru.len())
            .finish()
    }
}

#[async_trait]
impl<K: StoreKey, V: StoreValue> EntryStore<K, V> for MemoryEntryStore<K, V> {
    async fn put_if_absent(&self, key: &K, value: V, passivating: bool) -> Result<PutOutcome<V>> {
        let mut inner = self.inner.lock();
        let stamp = inner.next_stamp();

        if let Some(entry) = inner.lru.get_mut(key) {
            entry.stamp = stamp;
            entry.last_access = Instant::now();
            trace!(key = %key, "Conditional insert found existing entry");
            return Ok(PutOutcome::Existing(entry.value.clone()));
        }

        inner.lru.put(
            key.clone(),
            CacheEntry {
                value: value.clone(),
                last_access: Instant::now(),
                stamp,
                passivating,
            },
        );
        trace!(key = %key, size = inner.lru.len(), "Entry inserted");
        Ok(PutOutcome::Inserted { value, stamp })
    }

    async fn get(&self, key: &K) -> Result<Option<V>> {
        let mut inner = self.inner.lock();
        let stamp = inner.next_stamp();
        Ok(inner.lru.get_mut(key).map(|entry| {
            entry.stamp = stamp;
            entry.last_access = Instant::now();
            entry.value.clone()
        }))
    }

    async fn peek(&self, key: &K) -> Result<Option<CacheEntry<V>>> {
        Ok(self.inner.lock().lru.peek(key).cloned())
    }

    async fn write(&self, key: &K, value: V) -> Result<bool> {
        let mut inner = self.inner.lock();
        let stamp = inner.next_stamp();
        Ok(match inner.lru.get_mut(key) {
            Some(entry) => {
                entry.value = value;
                entry.stamp = stamp;
                entry.last_access = Instant::now();
                true
            }
            None => false,
        })
    }

    async fn remove_if_unchanged(&self, key: &K, stamp: u64) -> Result<bool> {
        let mut inner = self.inner.lock();
        if inner.lru.peek(key).is_some_and(|e| e.stamp == stamp) {
            inner.lru.pop(key);
            return Ok(true);
        }
        Ok(false)
    }

    async fn remove(&self, key: &K) -> Result<Option<V>> {
        Ok(self.inner.lock().lru.pop(key).map(|e| e.value))
    }

    async fn entries(&self) -> Result<Vec<EntryMeta<K>>> {
        let inner = self.inner.lock();
        let mut entries: Vec<EntryMeta<K>> = inner
            .lru
            .iter()
            .map(|(key, entry)| EntryMeta {
                key: key.clone(),
                last_access: entry.last_access,
                stamp: entry.stamp,
                passivating: entry.passivating,
            })
            .collect();
        entries.sort_by_key(|e| e.stamp);
        Ok(entries)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.inner.lock().lru.len())
    }
}
