//! Passivation policy.
//!
//! Each key is in one of three states:
//!
//! ```text
//!            create_value                 idle timeout / max-size
//!   ABSENT ───────────────▶ ACTIVE ───────────────────────────────▶ PASSIVATED
//!      ▲                      │  ▲        find_value / create_value      │
//!      │       remove         │  └───────────────────────────────────────┘
//!      └──────────────────────┴──────────────────────────────────────────┘
//! ```
//!
//! Eviction writes the record to the persistent store *before* removing the
//! entry, and restoration inserts the entry *before* deleting the record, so
//! at least one store holds the value at every point. Both transitions are
//! serialized per key on this node; across nodes they rely on the entry
//! store's conditional insert and conditional removal.
//!
//! An eviction that loses its conditional removal never deletes the record
//! it wrote, as another member may have overwritten it with the only copy.
//! Lookups always consult the entry store first, so a stale record next to
//! an active entry is never restored; the next eviction overwrites it.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;
use torpor_config::{SettingsHandle, StoreSettings, TorporConfig};
use tracing::{debug, trace, warn};

use crate::codec;
use crate::entry_store::{EntryMeta, EntryStore, MemoryEntryStore, PutOutcome};
use crate::error::{Error, Result};
use crate::key::{StoreKey, StoreValue};
use crate::locator::{CacheLocator, Locator, ValueFactory};
use crate::locks::KeyLocks;
use crate::persistent_store::{FilePersistentStore, PersistentStore};
use crate::stats::{PassivationStats, StatsCounters};
use crate::sweeper::{Sweeper, SweeperHandle};

/// Residency of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Resident in the entry store.
    Active,
    /// Resident only in the persistent store.
    Passivated,
    /// In neither store.
    Absent,
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryState::Active => write!(f, "active"),
            EntryState::Passivated => write!(f, "passivated"),
            EntryState::Absent => write!(f, "absent"),
        }
    }
}

/// Outcome of one sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Entries passivated because they were idle.
    pub idle_passivated: usize,
    /// Entries passivated to bring occupancy under `max-size`.
    pub size_passivated: usize,
    /// Keys whose eviction failed; they stay active for the next sweep.
    pub failures: Vec<(String, Error)>,
}

impl SweepReport {
    /// Total entries passivated.
    pub fn passivated(&self) -> usize {
        self.idle_passivated + self.size_passivated
    }

    /// Whether every attempted eviction succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Result of one eviction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Eviction {
    Passivated,
    /// Entry was accessed since it was selected, or its profile does not
    /// passivate. It stays active.
    Retained,
    /// Entry left the entry store by other means.
    Gone,
}

struct ManagerInner<K: StoreKey, V: StoreValue> {
    cache: CacheLocator<K, V>,
    entries: Arc<dyn EntryStore<K, V>>,
    persistent: Arc<dyn PersistentStore<K>>,
    settings: SettingsHandle,
    locks: KeyLocks,
    stats: StatsCounters,
}

/// Locator composed with the passivation policy.
///
/// Lookups that miss the entry store consult the persistent store and restore
/// transparently. Clones share the same state.
pub struct PassivationManager<K: StoreKey, V: StoreValue> {
    inner: Arc<ManagerInner<K, V>>,
}

impl<K: StoreKey, V: StoreValue> Clone for PassivationManager<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: StoreKey, V: StoreValue + Default> PassivationManager<K, V> {
    /// Create a manager whose new values are `V::default()`.
    pub fn new(
        entries: Arc<dyn EntryStore<K, V>>,
        persistent: Arc<dyn PersistentStore<K>>,
        settings: SettingsHandle,
    ) -> Self {
        Self::with_factory(
            entries,
            persistent,
            settings,
            Arc::new(|_: &K| V::default()),
        )
    }

    /// Build a manager and its background sweeper from loaded configuration.
    ///
    /// Entries live in a fresh in-process entry store and passivate to the
    /// configured directory. The sweeper runs every `sweep_interval` until
    /// the returned handle is shut down or dropped. Must be called from
    /// within a tokio runtime.
    pub fn from_config(config: &TorporConfig) -> Result<(Self, SweeperHandle)> {
        let settings = config.settings_handle()?;
        let persistent = FilePersistentStore::open(config.persistent_store_path())?;
        let manager = Self::new(
            Arc::new(MemoryEntryStore::<K, V>::new()),
            Arc::new(persistent),
            settings,
        );
        let sweeper = Sweeper::spawn(manager.clone(), config.sweep_interval());
        debug!(
            dir = %config.persistent_store_path().display(),
            interval_ms = config.sweep_interval().as_millis() as u64,
            "Passivation manager configured"
        );
        Ok((manager, sweeper))
    }
}

impl<K: StoreKey, V: StoreValue> PassivationManager<K, V> {
    /// Create a manager with a custom value factory.
    pub fn with_factory(
        entries: Arc<dyn EntryStore<K, V>>,
        persistent: Arc<dyn PersistentStore<K>>,
        settings: SettingsHandle,
        factory: ValueFactory<K, V>,
    ) -> Self {
        let inner = ManagerInner {
            cache: CacheLocator::with_factory(Arc::clone(&entries), factory),
            entries,
            persistent,
            settings,
            locks: KeyLocks::default(),
            stats: StatsCounters::default(),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Shared runtime settings.
    pub fn settings(&self) -> &SettingsHandle {
        &self.inner.settings
    }

    /// Counters for this manager.
    pub fn stats(&self) -> PassivationStats {
        self.inner.stats.snapshot()
    }

    /// The entry store.
    pub fn entry_store(&self) -> &Arc<dyn EntryStore<K, V>> {
        &self.inner.entries
    }

    /// The persistent store.
    pub fn persistent_store(&self) -> &Arc<dyn PersistentStore<K>> {
        &self.inner.persistent
    }

    /// Report where `key` currently lives.
    pub async fn state(&self, key: &K) -> Result<EntryState> {
        key.validate()?;
        if self.inner.entries.peek(key).await?.is_some() {
            Ok(EntryState::Active)
        } else if self.inner.persistent.contains(key).await? {
            Ok(EntryState::Passivated)
        } else if self.inner.entries.peek(key).await?.is_some() {
            // Restored between the two reads
            Ok(EntryState::Active)
        } else {
            Ok(EntryState::Absent)
        }
    }

    /// Write a new value for an existing key, restoring it first if needed.
    ///
    /// Returns `false` if the key does not exist. The fallback path holds the
    /// key's stripe lock, so no eviction on this node can slip between the
    /// restoration and the write; a member elsewhere passivating the key in
    /// that window is still reported as `false`.
    pub async fn update(&self, key: &K, value: V) -> Result<bool> {
        key.validate()?;
        if self.inner.entries.write(key, value.clone()).await? {
            return Ok(true);
        }

        let settings = self.inner.settings.snapshot();
        let (written, restored) = {
            let _guard = self.inner.locks.lock(key).await;
            if self.inner.entries.write(key, value.clone()).await? {
                (true, false)
            } else {
                let restored = self
                    .restore_locked(key)
                    .await?
                    .is_some_and(|(_, restored)| restored);
                // Also catches a restoration by another member
                (self.inner.entries.write(key, value).await?, restored)
            }
        };

        if restored {
            self.enforce_after_growth(&settings).await?;
        }
        Ok(written)
    }

    /// Terminate `key`, removing it from whichever store holds it.
    ///
    /// Returns whether anything was removed.
    pub async fn remove(&self, key: &K) -> Result<bool> {
        key.validate()?;
        let _guard = self.inner.locks.lock(key).await;
        let active = self.inner.entries.remove(key).await?.is_some();
        let passivated = self.inner.persistent.delete(key).await?;
        debug!(key = %key, active, passivated, "Entry removed");
        Ok(active || passivated)
    }

    /// Passivate an active entry now, regardless of idle time or occupancy.
    ///
    /// Returns `false` if the key is not active or its profile does not
    /// passivate.
    pub async fn passivate(&self, key: &K) -> Result<bool> {
        key.validate()?;
        Ok(self.try_evict(key, None).await? == Eviction::Passivated)
    }

    /// Run the passivation policy once.
    ///
    /// Idle entries are passivated first, then least recently used entries
    /// until occupancy is within `max-size`. Per-key failures are collected
    /// in the report; a failed size eviction ends the size pass until the
    /// next sweep. Only a failure to list the entry store aborts the sweep.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let settings = self.inner.settings.snapshot();
        let mut report = SweepReport::default();

        if let Some(idle_timeout) = settings.idle_timeout() {
            let now = Instant::now();
            let idle: Vec<EntryMeta<K>> = self
                .inner
                .entries
                .entries()
                .await?
                .into_iter()
                .filter(|e| {
                    e.passivating && now.saturating_duration_since(e.last_access) >= idle_timeout
                })
                .collect();

            for meta in idle {
                match self.try_evict(&meta.key, Some(meta.stamp)).await {
                    Ok(Eviction::Passivated) => report.idle_passivated += 1,
                    Ok(_) => {}
                    Err(e) => report.failures.push((meta.key.to_string(), e)),
                }
            }
        }

        self.enforce_max_size(&settings, &mut report).await?;

        if report.passivated() > 0 || !report.is_clean() {
            debug!(
                idle = report.idle_passivated,
                size = report.size_passivated,
                failures = report.failures.len(),
                "Sweep complete"
            );
        }
        Ok(report)
    }

    /// Find or create `key`, restoring it if passivated.
    async fn locate(&self, key: &K, create: bool) -> Result<Option<V>> {
        key.validate()?;
        let inner = &self.inner;

        if let Some(value) = inner.cache.find_value(key).await? {
            inner.stats.hit();
            trace!(key = %key, "Entry store hit");
            return Ok(Some(value));
        }
        inner.stats.miss();

        let (settings, profile) = inner.settings.snapshot_with_profile();
        let (value, grew) = {
            let _guard = inner.locks.lock(key).await;

            // Another local caller may have restored or created it meanwhile.
            if let Some(value) = inner.entries.get(key).await? {
                return Ok(Some(value));
            }

            if let Some(restored) = self.restore_locked(key).await? {
                restored
            } else if create {
                let passivating = profile.passivation;
                match inner.cache.insert_new(key, passivating).await? {
                    PutOutcome::Inserted { value, .. } => {
                        inner.stats.creation();
                        debug!(key = %key, store = %settings.default_store, "Entry created");
                        (value, passivating)
                    }
                    PutOutcome::Existing(value) => (value, false),
                }
            } else {
                // A restorer elsewhere inserts before it deletes the record.
                return inner.entries.get(key).await;
            }
        };

        // Stripe lock released: enforcement locks each victim in turn.
        if grew {
            self.enforce_after_growth(&settings).await?;
        }
        Ok(Some(value))
    }

    /// Enforce `max-size` after an access added an entry, surfacing the first
    /// eviction failure.
    async fn enforce_after_growth(&self, settings: &StoreSettings) -> Result<()> {
        let mut report = SweepReport::default();
        self.enforce_max_size(settings, &mut report).await?;
        match report.failures.into_iter().next() {
            Some((_, e)) => Err(e),
            None => Ok(()),
        }
    }

    /// Move a passivated record back into the entry store.
    ///
    /// Caller holds the key's stripe lock. Returns the value and whether this
    /// call performed the restoration.
    async fn restore_locked(&self, key: &K) -> Result<Option<(V, bool)>> {
        let inner = &self.inner;

        let bytes = match inner.persistent.read(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Ok(None),
            Err(e) => {
                inner.stats.failed_activation();
                return Err(e);
            }
        };

        let value: V = match codec::decode(key, &bytes) {
            Ok(value) => value,
            Err(e) => {
                inner.stats.failed_activation();
                warn!(key = %key, error = %e, "Passivated record unreadable; left in place");
                return Err(e);
            }
        };

        let (value, stamp) = match inner.entries.put_if_absent(key, value, true).await? {
            PutOutcome::Inserted { value, stamp } => (value, stamp),
            PutOutcome::Existing(current) => {
                // Another member restored first and owns the record deletion.
                trace!(key = %key, "Restoration lost race; using resident entry");
                return Ok(Some((current, false)));
            }
        };

        if let Err(e) = inner.persistent.delete(key).await {
            inner.stats.failed_activation();
            if inner.entries.remove_if_unchanged(key, stamp).await? {
                warn!(key = %key, error = %e, "Record delete failed; restoration rolled back");
            } else {
                warn!(
                    key = %key,
                    error = %e,
                    "Record delete failed after the restored entry was accessed"
                );
            }
            return Err(e);
        }

        inner.stats.activation();
        debug!(key = %key, "Entry restored");
        Ok(Some((value, true)))
    }

    /// Passivate the least recently used entries until within `max-size`.
    async fn enforce_max_size(
        &self,
        settings: &StoreSettings,
        report: &mut SweepReport,
    ) -> Result<()> {
        if !settings.is_bounded() {
            return Ok(());
        }

        let candidates: Vec<EntryMeta<K>> = self
            .inner
            .entries
            .entries()
            .await?
            .into_iter()
            .filter(|e| e.passivating)
            .collect();

        let mut excess = candidates.len().saturating_sub(settings.max_size);
        for meta in candidates {
            if excess == 0 {
                break;
            }
            match self.try_evict(&meta.key, Some(meta.stamp)).await {
                Ok(Eviction::Passivated) => {
                    report.size_passivated += 1;
                    excess -= 1;
                }
                Ok(Eviction::Gone) => excess -= 1,
                Ok(Eviction::Retained) => {}
                Err(e) => {
                    // Evictions stay in LRU order, so stop at the first failure
                    report.failures.push((meta.key.to_string(), e));
                    break;
                }
            }
        }
        Ok(())
    }

    async fn try_evict(&self, key: &K, expected_stamp: Option<u64>) -> Result<Eviction> {
        self.evict(key, expected_stamp).await.inspect_err(|e| {
            self.inner.stats.failed_passivation();
            warn!(key = %key, error = %e, "Passivation failed; entry stays active");
        })
    }

    /// Write the entry to the persistent store, then remove it.
    ///
    /// With `expected_stamp`, an entry accessed since it was selected is
    /// retained.
    async fn evict(&self, key: &K, expected_stamp: Option<u64>) -> Result<Eviction> {
        let inner = &self.inner;
        let _guard = inner.locks.lock(key).await;

        let Some(entry) = inner.entries.peek(key).await? else {
            return Ok(Eviction::Gone);
        };
        if !entry.passivating || expected_stamp.is_some_and(|s| s != entry.stamp) {
            return Ok(Eviction::Retained);
        }

        let bytes = codec::encode(key, &entry.value)?;
        inner.persistent.write(key, bytes).await?;

        if inner.entries.remove_if_unchanged(key, entry.stamp).await? {
            inner.stats.passivation();
            debug!(key = %key, "Entry passivated");
            return Ok(Eviction::Passivated);
        }

        // The record may already belong to another member, so it stays.
        if inner.entries.peek(key).await?.is_some() {
            trace!(key = %key, "Entry accessed during eviction; retained");
            Ok(Eviction::Retained)
        } else {
            Ok(Eviction::Gone)
        }
    }
}

#[async_trait]
impl<K: StoreKey, V: StoreValue> Locator<K, V> for PassivationManager<K, V> {
    async fn create_value(&self, key: &K) -> Result<V> {
        self.locate(key, true)
            .await?
            .ok_or_else(|| Error::EntryStore(format!("no value committed for '{key}'")))
    }

    async fn find_value(&self, key: &K) -> Result<Option<V>> {
        self.locate(key, false).await
    }
}
