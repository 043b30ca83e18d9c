//! Error types for locator and passivation operations.

use std::time::Duration;

/// Error type for locator and passivation operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The key violates the key contract (e.g., empty). Not retried.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// A value could not be serialized for passivation.
    #[error("Failed to serialize value for '{key}': {source}")]
    Serialization {
        key: String,
        source: serde_json::Error,
    },

    /// A passivated record could not be deserialized during restoration.
    #[error("Failed to deserialize passivated record for '{key}': {reason}")]
    Deserialization { key: String, reason: String },

    /// The entry store is unavailable.
    #[error("Entry store error: {0}")]
    EntryStore(String),

    /// The persistent store failed (disk I/O).
    #[error("Persistent store error for '{key}': {source}")]
    PersistentStore {
        key: String,
        source: std::io::Error,
    },

    /// The caller's deadline elapsed. The operation may still have committed.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Configuration was rejected.
    #[error("Configuration error: {0}")]
    Config(#[from] torpor_config::ConfigError),
}

impl Error {
    /// Whether retrying later can succeed.
    ///
    /// Store unavailability, codec failures, and timeouts leave state
    /// unchanged and are retried by the next sweep or access. Contract and
    /// configuration errors are not.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::InvalidKey(_) | Error::Config(_))
    }

    pub(crate) fn persistent(key: &impl std::fmt::Display, source: std::io::Error) -> Self {
        Error::PersistentStore {
            key: key.to_string(),
            source,
        }
    }
}

/// Result type for locator and passivation operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(!Error::InvalidKey("".into()).is_recoverable());
        assert!(Error::EntryStore("down".into()).is_recoverable());
        assert!(Error::Timeout(Duration::from_secs(1)).is_recoverable());
        assert!(
            Error::persistent(&"k", std::io::Error::other("disk full")).is_recoverable()
        );
        assert!(
            !Error::Config(torpor_config::ConfigError::Other("bad".into())).is_recoverable()
        );
    }
}
