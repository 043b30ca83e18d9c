//! Identity keys and value bounds.

use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// An immutable identity for one session or instance within a store namespace.
///
/// `storage_name` is the stable textual form used to name passivated records;
/// distinct keys must have distinct storage names.
pub trait StoreKey: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// Stable, unique textual form of the key.
    fn storage_name(&self) -> String;

    /// Reject keys that violate the key contract.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Bounds for values held by the stores.
pub trait StoreValue: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> StoreValue for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl StoreKey for String {
    fn storage_name(&self) -> String {
        self.clone()
    }

    fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::InvalidKey("key must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Randomly generated session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a new random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| Error::InvalidKey(format!("'{s}' is not a session id: {e}")))
    }
}

impl StoreKey for SessionId {
    fn storage_name(&self) -> String {
        self.0.to_string()
    }

    fn validate(&self) -> Result<()> {
        if self.0.is_nil() {
            return Err(Error::InvalidKey("nil session id".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_key_validation() {
        assert!("a".to_string().validate().is_ok());
        assert!(matches!(
            String::new().validate(),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn test_session_id_round_trip() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(id.storage_name(), id.to_string());
    }

    #[test]
    fn test_nil_session_id_rejected() {
        let nil = SessionId::from_uuid(Uuid::nil());
        assert!(nil.validate().is_err());
        assert!("not-a-uuid".parse::<SessionId>().is_err());
    }
}
