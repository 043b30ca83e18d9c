//! Configuration system for the Torpor session store.
//!
//! Provides:
//! - Strongly typed store settings (`max-size`, `idle-timeout`, `default-store`)
//!   with validation and a shared runtime handle
//! - A request/response management protocol for reading, writing, and
//!   undefining those settings by name
//! - TOML config file layering (user config + project-local overrides)
//! - Capability-checked mutation of process-wide properties

pub mod discovery;
pub mod error;
pub mod management;
pub mod properties;
pub mod settings;
pub mod types;

pub use discovery::{
    config_dir, load_config, load_config_file, load_config_with_options, save_config,
    user_config_path, ConfigSource, LoadedConfig, CONFIG_DIR_PROPERTY,
};
pub use error::{ConfigError, Result};
pub use management::{
    execute, Address, ManagementRequest, ManagementResponse, Operation, Outcome,
    PASSIVATION_STORE_NAME, SUBSYSTEM_NAME,
};
pub use properties::{with_elevated_capability, CapabilityMode, PropertyRegistry};
pub use settings::{
    Attribute, SettingsHandle, SettingsUpdate, StoreProfile, StoreProfiles, StoreSettings,
    DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_SIZE, DEFAULT_STORE, PASSIVATING_STORE, SIMPLE_STORE,
};
pub use types::*;
