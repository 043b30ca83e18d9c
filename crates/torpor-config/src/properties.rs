//! Process-wide properties with capability-checked mutation.
//!
//! When a process runs in restricted-capability mode, mutations go through
//! [`with_elevated_capability`]; otherwise they are applied directly. The
//! mode is injected by the caller rather than discovered from ambient state.

use std::collections::HashMap;
use std::sync::LazyLock;

use parking_lot::RwLock;
use tracing::debug;

static GLOBAL: LazyLock<PropertyRegistry> = LazyLock::new(PropertyRegistry::new);

/// Whether property mutation must be performed with an explicit capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapabilityMode {
    /// Mutate directly.
    #[default]
    Unrestricted,
    /// Mutate only through [`with_elevated_capability`].
    Checking,
}

/// Run `action` with elevated capability.
///
/// This is the single entry point for privileged mutation; it records the
/// elevation so restricted deployments can audit it.
pub fn with_elevated_capability<R>(what: &str, action: impl FnOnce() -> R) -> R {
    debug!(action = %what, "Performing action with elevated capability");
    action()
}

/// String key/value properties shared by the whole process.
#[derive(Debug, Default)]
pub struct PropertyRegistry {
    values: RwLock<HashMap<String, String>>,
}

impl PropertyRegistry {
    /// Create an empty, standalone registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static PropertyRegistry {
        &GLOBAL
    }

    /// Read a property.
    pub fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    /// Set a property, elevating first when `mode` is [`CapabilityMode::Checking`].
    pub fn set(&self, key: &str, value: &str, mode: CapabilityMode) {
        match mode {
            CapabilityMode::Unrestricted => self.set_direct(key, value),
            CapabilityMode::Checking => {
                with_elevated_capability("set-property", || self.set_direct(key, value))
            }
        }
    }

    /// Remove a property, elevating first when `mode` is [`CapabilityMode::Checking`].
    pub fn remove(&self, key: &str, mode: CapabilityMode) -> Option<String> {
        match mode {
            CapabilityMode::Unrestricted => self.values.write().remove(key),
            CapabilityMode::Checking => {
                with_elevated_capability("remove-property", || self.values.write().remove(key))
            }
        }
    }

    fn set_direct(&self, key: &str, value: &str) {
        self.values
            .write()
            .insert(key.to_string(), value.to_string());
    }
}
