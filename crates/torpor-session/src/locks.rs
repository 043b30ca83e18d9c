//! Per-key transition locks.
//!
//! Restorations and evictions of the same key on one node must not
//! interleave. A fixed set of async mutexes is striped by key hash; keys that
//! share a stripe merely wait for each other.

use std::hash::{BuildHasher, Hash, RandomState};

use tokio::sync::{Mutex, MutexGuard};

/// Default number of stripes.
const DEFAULT_STRIPES: usize = 64;

pub(crate) struct KeyLocks {
    stripes: Vec<Mutex<()>>,
    hasher: RandomState,
}

impl Default for KeyLocks {
    fn default() -> Self {
        Self::with_stripes(DEFAULT_STRIPES)
    }
}

impl KeyLocks {
    pub(crate) fn with_stripes(count: usize) -> Self {
        Self {
            stripes: (0..count.max(1)).map(|_| Mutex::new(())).collect(),
            hasher: RandomState::new(),
        }
    }

    /// Wait for exclusive access to `key`'s stripe.
    ///
    /// Holders must not acquire a second stripe.
    pub(crate) async fn lock<K: Hash>(&self, key: &K) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe(key)].lock().await
    }

    fn stripe<K: Hash>(&self, key: &K) -> usize {
        (self.hasher.hash_one(key) % self.stripes.len() as u64) as usize
    }
}
