//! Cache-backed session store with passivation.
//!
//! This crate provides:
//! - A [`Locator`] contract: at-most-once creation and lookup of values by key
//!   over a shared [`EntryStore`]
//! - A [`PassivationManager`] that moves idle or excess entries to a
//!   [`PersistentStore`] and restores them transparently on access
//! - A background [`Sweeper`] that runs the passivation policy periodically
//!
//! # Example
//!
//! ```rust,ignore
//! use torpor_config::{SettingsHandle, StoreSettings, PASSIVATING_STORE};
//! use torpor_session::{FilePersistentStore, MemoryEntryStore, PassivationManager, Sweeper};
//!
//! let settings = SettingsHandle::new(
//!     StoreSettings::new()
//!         .with_max_size(1000)
//!         .with_idle_timeout(Duration::from_secs(300))
//!         .with_default_store(PASSIVATING_STORE),
//! )?;
//! let manager: PassivationManager<SessionId, Cart> = PassivationManager::new(
//!     Arc::new(MemoryEntryStore::new()),
//!     Arc::new(FilePersistentStore::open("/var/lib/torpor")?),
//!     settings,
//! );
//! let sweeper = Sweeper::spawn(manager.clone(), Duration::from_secs(1));
//! let cart = manager.create_value(&SessionId::new()).await?;
//! ```

mod codec;
mod entry_store;
mod error;
mod key;
mod locator;
mod locks;
mod passivation;
mod persistent_store;
mod stats;
mod sweeper;
mod timeout;

pub use codec::{PassivatedRecord, decode, decode_record, encode};
pub use entry_store::{CacheEntry, EntryMeta, EntryStore, MemoryEntryStore, PutOutcome};
pub use error::{Error, Result};
pub use key::{SessionId, StoreKey, StoreValue};
pub use locator::{CacheLocator, Locator, ValueFactory};
pub use passivation::{EntryState, PassivationManager, SweepReport};
pub use persistent_store::{FilePersistentStore, MemoryPersistentStore, PersistentStore};
pub use stats::PassivationStats;
pub use sweeper::{Sweeper, SweeperHandle};
pub use timeout::with_timeout;
