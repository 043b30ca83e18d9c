//! Identity-keyed create/find contract.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::entry_store::{EntryStore, PutOutcome};
use crate::error::Result;
use crate::key::{StoreKey, StoreValue};

/// Produces the initial value for a newly created key.
pub type ValueFactory<K, V> = Arc<dyn Fn(&K) -> V + Send + Sync>;

/// Creates and finds values by key.
#[async_trait]
pub trait Locator<K: StoreKey, V: StoreValue>: Send + Sync {
    /// Return the value for `key`, creating it if it does not exist.
    ///
    /// Concurrent callers for the same key all observe the single committed
    /// value; losing the creation race is not an error.
    async fn create_value(&self, key: &K) -> Result<V>;

    /// Return the value for `key`, or `None` if it does not exist.
    /// Never creates.
    async fn find_value(&self, key: &K) -> Result<Option<V>>;
}

/// Locator over the entry store alone.
///
/// Knows nothing about passivation: a passivated key is reported absent, and
/// `create_value` on it would commit a fresh value. Use
/// [`PassivationManager`](crate::PassivationManager) wherever passivation is
/// enabled.
pub struct CacheLocator<K: StoreKey, V: StoreValue> {
    store: Arc<dyn EntryStore<K, V>>,
    factory: ValueFactory<K, V>,
    passivating: bool,
}

impl<K: StoreKey, V: StoreValue> Clone for CacheLocator<K, V> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            factory: Arc::clone(&self.factory),
            passivating: self.passivating,
        }
    }
}

impl<K: StoreKey, V: StoreValue + Default> CacheLocator<K, V> {
    /// Create a locator whose new values are `V::default()`.
    pub fn new(store: Arc<dyn EntryStore<K, V>>) -> Self {
        Self::with_factory(store, Arc::new(|_: &K| V::default()))
    }
}

impl<K: StoreKey, V: StoreValue> CacheLocator<K, V> {
    /// Create a locator with a custom value factory.
    pub fn with_factory(store: Arc<dyn EntryStore<K, V>>, factory: ValueFactory<K, V>) -> Self {
        Self {
            store,
            factory,
            passivating: false,
        }
    }

    /// Mark entries created by [`Locator::create_value`] as passivating.
    pub fn passivating(mut self, passivating: bool) -> Self {
        self.passivating = passivating;
        self
    }

    /// The underlying entry store.
    pub fn store(&self) -> &Arc<dyn EntryStore<K, V>> {
        &self.store
    }

    /// Conditionally insert a fresh value under the given profile.
    pub(crate) async fn insert_new(&self, key: &K, passivating: bool) -> Result<PutOutcome<V>> {
        let value = (self.factory)(key);
        let outcome = self.store.put_if_absent(key, value, passivating).await?;
        trace!(key = %key, inserted = outcome.is_inserted(), "Create resolved");
        Ok(outcome)
    }
}

#[async_trait]
impl<K: StoreKey, V: StoreValue> Locator<K, V> for CacheLocator<K, V> {
    async fn create_value(&self, key: &K) -> Result<V> {
        key.validate()?;
        Ok(self.insert_new(key, self.passivating).await?.into_value())
    }

    async fn find_value(&self, key: &K) -> Result<Option<V>> {
        key.validate()?;
        self.store.get(key).await
    }
}
