//! Passivation statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time counters for one manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassivationStats {
    /// Values committed by this manager's `create_value` calls.
    pub creations: u64,
    /// Lookups served directly from the entry store.
    pub hits: u64,
    /// Lookups that missed the entry store.
    pub misses: u64,
    /// Entries moved to the persistent store.
    pub passivations: u64,
    /// Entries restored from the persistent store.
    pub activations: u64,
    /// Evictions that failed and left the entry active.
    pub failed_passivations: u64,
    /// Restorations that failed and left the record passivated.
    pub failed_activations: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    creations: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    passivations: AtomicU64,
    activations: AtomicU64,
    failed_passivations: AtomicU64,
    failed_activations: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn creation(&self) {
        self.creations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn passivation(&self) {
        self.passivations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn activation(&self) {
        self.activations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn failed_passivation(&self) {
        self.failed_passivations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn failed_activation(&self) {
        self.failed_activations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> PassivationStats {
        PassivationStats {
            creations: self.creations.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            passivations: self.passivations.load(Ordering::Relaxed),
            activations: self.activations.load(Ordering::Relaxed),
            failed_passivations: self.failed_passivations.load(Ordering::Relaxed),
            failed_activations: self.failed_activations.load(Ordering::Relaxed),
        }
    }
}
