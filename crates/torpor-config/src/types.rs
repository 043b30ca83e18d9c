//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! default_store = "passivating"
//!
//! [passivation]
//! max_size = 10000
//! idle_timeout_secs = 0
//! sweep_interval_ms = 1000
//!
//! [persistent_store]
//! path = "/var/lib/torpor/passivated"
//!
//! [stores.distributable]
//! passivation = true
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::settings::{
    Attribute, SettingsHandle, StoreProfile, StoreProfiles, StoreSettings, DEFAULT_MAX_SIZE,
    DEFAULT_STORE,
};

/// Application name for platform directory resolution.
pub(crate) const APP_NAME: &str = "torpor";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TorporConfig {
    /// Store profile used for newly created keys.
    pub default_store: Option<String>,

    /// Passivation policy settings.
    pub passivation: Option<PassivationConfig>,

    /// Filesystem persistent store settings.
    pub persistent_store: Option<PersistentStoreConfig>,

    /// Additional or overridden store profiles.
    pub stores: BTreeMap<String, StoreProfile>,
}

impl TorporConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: TorporConfig) {
        if other.default_store.is_some() {
            self.default_store = other.default_store;
        }

        if other.passivation.is_some() {
            self.passivation = other.passivation;
        }

        if other.persistent_store.is_some() {
            self.persistent_store = other.persistent_store;
        }

        for (name, profile) in other.stores {
            self.stores.insert(name, profile);
        }
    }

    /// Built-in profiles plus configured `[stores.*]` overrides.
    pub fn profiles(&self) -> StoreProfiles {
        StoreProfiles::with_overrides(self.stores.clone())
    }

    /// Typed, validated runtime settings.
    pub fn store_settings(&self) -> crate::Result<StoreSettings> {
        let passivation = self.passivation.clone().unwrap_or_default();
        let settings = StoreSettings {
            max_size: passivation.max_size,
            idle_timeout: passivation.idle_timeout(),
            default_store: self
                .default_store
                .clone()
                .unwrap_or_else(|| DEFAULT_STORE.to_string()),
        };
        settings.validate(&self.profiles())?;
        Ok(settings)
    }

    /// Build a shared runtime settings handle.
    pub fn settings_handle(&self) -> crate::Result<SettingsHandle> {
        SettingsHandle::with_profiles(self.store_settings()?, self.profiles())
    }

    /// Write runtime settings back into this config.
    pub fn apply_settings(&mut self, settings: &StoreSettings) {
        for attribute in Attribute::ALL {
            self.set_attribute(attribute, settings);
        }
    }

    /// Copy one attribute's value from runtime settings into this config.
    pub fn set_attribute(&mut self, attribute: Attribute, settings: &StoreSettings) {
        match attribute {
            Attribute::MaxSize => {
                self.passivation
                    .get_or_insert_with(PassivationConfig::default)
                    .max_size = settings.max_size;
            }
            Attribute::IdleTimeout => {
                self.passivation
                    .get_or_insert_with(PassivationConfig::default)
                    .idle_timeout_secs = settings.idle_timeout.as_secs();
            }
            Attribute::DefaultStore => {
                self.default_store = Some(settings.default_store.clone());
            }
        }
    }

    /// Interval between background passivation sweeps.
    pub fn sweep_interval(&self) -> Duration {
        self.passivation.clone().unwrap_or_default().sweep_interval()
    }

    /// Directory of the filesystem persistent store.
    ///
    /// Falls back to `<data dir>/torpor/passivated`, or `./passivated` when no
    /// platform data directory is available.
    pub fn persistent_store_path(&self) -> PathBuf {
        self.persistent_store
            .as_ref()
            .and_then(|p| p.path.clone())
            .or_else(|| dirs::data_dir().map(|d| d.join(APP_NAME).join("passivated")))
            .unwrap_or_else(|| PathBuf::from("passivated"))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Passivation Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Passivation policy configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassivationConfig {
    /// Passivating entry count ceiling (0 = unbounded).
    pub max_size: usize,
    /// Idle timeout in seconds (0 = disabled).
    pub idle_timeout_secs: u64,
    /// Interval in milliseconds between background sweeps.
    pub sweep_interval_ms: u64,
}

impl Default for PassivationConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            idle_timeout_secs: 0,
            sweep_interval_ms: 1000,
        }
    }
}

impl PassivationConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Sweep interval, never shorter than one millisecond.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Persistent Store Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Filesystem persistent store configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistentStoreConfig {
    /// Directory that holds passivated records.
    pub path: Option<PathBuf>,
}
