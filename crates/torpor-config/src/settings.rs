//! Runtime store settings.
//!
//! [`StoreSettings`] is the typed record consumed by the passivation policy.
//! [`SettingsHandle`] shares one mutable copy between the policy, the
//! background sweeper, and the management surface. Readers always take an
//! owned [`SettingsHandle::snapshot`], so a change never alters an operation
//! that already started.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, Result};

/// Default entry count ceiling before size-triggered passivation.
pub const DEFAULT_MAX_SIZE: usize = 10_000;

/// Default idle timeout (zero disables idle passivation).
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::ZERO;

/// Name of the built-in profile that never passivates.
pub const SIMPLE_STORE: &str = "simple";

/// Name of the built-in profile that passivates to the persistent store.
pub const PASSIVATING_STORE: &str = "passivating";

/// Profile used for new keys when nothing else is configured.
pub const DEFAULT_STORE: &str = SIMPLE_STORE;

// ─────────────────────────────────────────────────────────────────────────────
// Store profiles
// ─────────────────────────────────────────────────────────────────────────────

/// A named store profile selectable through `default-store`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreProfile {
    /// Whether entries created under this profile may be passivated.
    pub passivation: bool,
}

/// The set of known store profiles.
///
/// Always contains [`SIMPLE_STORE`] and [`PASSIVATING_STORE`]; configured
/// profiles are layered on top and may redefine them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreProfiles {
    profiles: BTreeMap<String, StoreProfile>,
}

impl Default for StoreProfiles {
    fn default() -> Self {
        let mut profiles = BTreeMap::new();
        profiles.insert(
            SIMPLE_STORE.to_string(),
            StoreProfile { passivation: false },
        );
        profiles.insert(
            PASSIVATING_STORE.to_string(),
            StoreProfile { passivation: true },
        );
        Self { profiles }
    }
}

impl StoreProfiles {
    /// Built-in profiles plus the given overrides.
    pub fn with_overrides<I>(overrides: I) -> Self
    where
        I: IntoIterator<Item = (String, StoreProfile)>,
    {
        let mut profiles = Self::default();
        profiles.profiles.extend(overrides);
        profiles
    }

    /// Look up a profile by name.
    pub fn get(&self, name: &str) -> Option<StoreProfile> {
        self.profiles.get(name).copied()
    }

    /// Look up a profile, failing with [`ConfigError::UnknownStore`].
    pub fn require(&self, name: &str) -> Result<StoreProfile> {
        self.get(name).ok_or_else(|| ConfigError::UnknownStore {
            name: name.to_string(),
            known: self.names().join(", "),
        })
    }

    /// Profile names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Settings record
// ─────────────────────────────────────────────────────────────────────────────

/// Runtime-tunable settings for the passivation policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    /// Entry count ceiling for passivating entries (0 = unbounded).
    pub max_size: usize,

    /// Inactivity period after which an entry is passivated (zero = disabled).
    pub idle_timeout: Duration,

    /// Store profile used for newly created keys.
    pub default_store: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            default_store: DEFAULT_STORE.to_string(),
        }
    }
}

impl StoreSettings {
    /// Create settings with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entry count ceiling.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set the idle timeout.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Set the default store profile.
    pub fn with_default_store(mut self, name: impl Into<String>) -> Self {
        self.default_store = name.into();
        self
    }

    /// Whether size-triggered passivation is active.
    pub fn is_bounded(&self) -> bool {
        self.max_size > 0
    }

    /// Idle timeout, if idle passivation is enabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (!self.idle_timeout.is_zero()).then_some(self.idle_timeout)
    }

    /// Check the settings against the known store profiles.
    pub fn validate(&self, profiles: &StoreProfiles) -> Result<()> {
        profiles.require(&self.default_store)?;
        Ok(())
    }

    /// Return a copy with one update applied (not validated).
    pub fn updated(&self, update: &SettingsUpdate) -> Self {
        let mut next = self.clone();
        match update {
            SettingsUpdate::MaxSize(n) => next.max_size = *n,
            SettingsUpdate::IdleTimeout(d) => next.idle_timeout = *d,
            SettingsUpdate::DefaultStore(name) => next.default_store = name.clone(),
        }
        next
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Attributes and updates
// ─────────────────────────────────────────────────────────────────────────────

/// Named runtime attribute exposed by the management surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// `max-size`
    MaxSize,
    /// `idle-timeout` (seconds)
    IdleTimeout,
    /// `default-store`
    DefaultStore,
}

impl Attribute {
    /// All attributes.
    pub const ALL: [Attribute; 3] = [
        Attribute::MaxSize,
        Attribute::IdleTimeout,
        Attribute::DefaultStore,
    ];

    /// Wire name of the attribute.
    pub fn name(&self) -> &'static str {
        match self {
            Attribute::MaxSize => "max-size",
            Attribute::IdleTimeout => "idle-timeout",
            Attribute::DefaultStore => "default-store",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Attribute {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Attribute::ALL
            .into_iter()
            .find(|a| a.name() == s)
            .ok_or_else(|| ConfigError::UnknownAttribute(s.to_string()))
    }
}

/// A single typed change to [`StoreSettings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsUpdate {
    MaxSize(usize),
    IdleTimeout(Duration),
    DefaultStore(String),
}

impl SettingsUpdate {
    /// The attribute this update writes.
    pub fn attribute(&self) -> Attribute {
        match self {
            SettingsUpdate::MaxSize(_) => Attribute::MaxSize,
            SettingsUpdate::IdleTimeout(_) => Attribute::IdleTimeout,
            SettingsUpdate::DefaultStore(_) => Attribute::DefaultStore,
        }
    }

    /// The update that restores an attribute's default value.
    pub fn default_for(attribute: Attribute) -> Self {
        let defaults = StoreSettings::default();
        match attribute {
            Attribute::MaxSize => SettingsUpdate::MaxSize(defaults.max_size),
            Attribute::IdleTimeout => SettingsUpdate::IdleTimeout(defaults.idle_timeout),
            Attribute::DefaultStore => SettingsUpdate::DefaultStore(defaults.default_store),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared handle
// ─────────────────────────────────────────────────────────────────────────────

struct HandleInner {
    settings: RwLock<StoreSettings>,
    profiles: StoreProfiles,
}

/// Shared, runtime-writable store settings.
///
/// Cloning the handle shares the same underlying settings.
#[derive(Clone)]
pub struct SettingsHandle {
    inner: Arc<HandleInner>,
}

impl fmt::Debug for SettingsHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsHandle")
            .field("settings", &*self.inner.settings.read())
            .field("profiles", &self.inner.profiles)
            .finish()
    }
}

impl Default for SettingsHandle {
    fn default() -> Self {
        Self {
            inner: Arc::new(HandleInner {
                settings: RwLock::new(StoreSettings::default()),
                profiles: StoreProfiles::default(),
            }),
        }
    }
}

impl SettingsHandle {
    /// Create a handle with the built-in profiles.
    pub fn new(settings: StoreSettings) -> Result<Self> {
        Self::with_profiles(settings, StoreProfiles::default())
    }

    /// Create a handle with an explicit profile set.
    pub fn with_profiles(settings: StoreSettings, profiles: StoreProfiles) -> Result<Self> {
        settings.validate(&profiles)?;
        Ok(Self {
            inner: Arc::new(HandleInner {
                settings: RwLock::new(settings),
                profiles,
            }),
        })
    }

    /// Owned copy of the current settings.
    pub fn snapshot(&self) -> StoreSettings {
        self.inner.settings.read().clone()
    }

    /// Known store profiles.
    pub fn profiles(&self) -> &StoreProfiles {
        &self.inner.profiles
    }

    /// Profile that newly created keys should use.
    pub fn default_profile(&self) -> StoreProfile {
        self.snapshot_with_profile().1
    }

    /// Current settings together with the profile of their default store,
    /// read consistently.
    pub fn snapshot_with_profile(&self) -> (StoreSettings, StoreProfile) {
        let settings = self.inner.settings.read().clone();
        // Validated on every write, so the lookup only fails if profiles were
        // constructed inconsistently; treat that as non-passivating.
        let profile = self
            .inner
            .profiles
            .get(&settings.default_store)
            .unwrap_or(StoreProfile { passivation: false });
        (settings, profile)
    }

    /// Validate and commit one update. Invalid updates are never applied.
    pub fn apply(&self, update: SettingsUpdate) -> Result<()> {
        let mut settings = self.inner.settings.write();
        let next = settings.updated(&update);
        next.validate(&self.inner.profiles)?;
        debug!(attribute = %update.attribute(), ?update, "Store setting updated");
        *settings = next;
        Ok(())
    }

    /// Restore an attribute to its default value.
    pub fn reset(&self, attribute: Attribute) -> Result<()> {
        self.apply(SettingsUpdate::default_for(attribute))
    }

    /// Replace all settings at once.
    pub fn replace(&self, settings: StoreSettings) -> Result<()> {
        settings.validate(&self.inner.profiles)?;
        *self.inner.settings.write() = settings;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = StoreSettings::default();
        assert_eq!(settings.max_size, DEFAULT_MAX_SIZE);
        assert!(settings.idle_timeout().is_none());
        assert_eq!(settings.default_store, SIMPLE_STORE);
        assert!(settings.is_bounded());
    }

    #[test]
    fn test_zero_means_unbounded_and_disabled() {
        let settings = StoreSettings::new()
            .with_max_size(0)
            .with_idle_timeout(Duration::ZERO);
        assert!(!settings.is_bounded());
        assert_eq!(settings.idle_timeout(), None);
    }

    #[test]
    fn test_attribute_names_round_trip() {
        for attr in Attribute::ALL {
            assert_eq!(attr.name().parse::<Attribute>().unwrap(), attr);
        }
        assert!(matches!(
            "max_size".parse::<Attribute>(),
            Err(ConfigError::UnknownAttribute(_))
        ));
    }

    #[test]
    fn test_apply_updates_snapshot() {
        let handle = SettingsHandle::default();
        let before = handle.snapshot();

        handle.apply(SettingsUpdate::MaxSize(1)).unwrap();
        handle
            .apply(SettingsUpdate::IdleTimeout(Duration::from_secs(1)))
            .unwrap();

        // Earlier snapshot is unaffected
        assert_eq!(before.max_size, DEFAULT_MAX_SIZE);

        let after = handle.snapshot();
        assert_eq!(after.max_size, 1);
        assert_eq!(after.idle_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_unknown_store_rejected() {
        let handle = SettingsHandle::default();
        let err = handle
            .apply(SettingsUpdate::DefaultStore("nope".into()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownStore { .. }));
        assert_eq!(handle.snapshot().default_store, SIMPLE_STORE);
    }

    #[test]
    fn test_default_profile_follows_default_store() {
        let handle = SettingsHandle::default();
        assert!(!handle.default_profile().passivation);

        handle
            .apply(SettingsUpdate::DefaultStore(PASSIVATING_STORE.into()))
            .unwrap();
        assert!(handle.default_profile().passivation);
    }

    #[test]
    fn test_reset_restores_default() {
        let handle = SettingsHandle::default();
        handle.apply(SettingsUpdate::MaxSize(3)).unwrap();
        handle.reset(Attribute::MaxSize).unwrap();
        assert_eq!(handle.snapshot().max_size, DEFAULT_MAX_SIZE);
    }

    #[test]
    fn test_clones_share_state() {
        let handle = SettingsHandle::default();
        let other = handle.clone();
        other.apply(SettingsUpdate::MaxSize(7)).unwrap();
        assert_eq!(handle.snapshot().max_size, 7);
    }

    #[test]
    fn test_custom_profiles() {
        let profiles = StoreProfiles::with_overrides([(
            "distributable".to_string(),
            StoreProfile { passivation: true },
        )]);
        let settings = StoreSettings::new().with_default_store("distributable");
        let handle = SettingsHandle::with_profiles(settings, profiles).unwrap();
        assert!(handle.default_profile().passivation);
        assert_eq!(
            handle.profiles().names(),
            vec!["distributable", "passivating", "simple"]
        );
    }
}
