//! Passivated record encoding.
//!
//! Records are JSON envelopes carrying the key's storage name and the time of
//! passivation alongside the value. The key is checked on decode so a record
//! can never be restored under the wrong identity.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::key::StoreKey;

/// A passivated value with its envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassivatedRecord<V> {
    /// Storage name of the key the value belongs to.
    pub key: String,
    /// When the value was passivated.
    pub passivated_at: DateTime<Utc>,
    /// The value itself.
    pub value: V,
}

#[derive(Serialize)]
struct RecordRef<'a, V> {
    key: &'a str,
    passivated_at: DateTime<Utc>,
    value: &'a V,
}

/// Serialize a value into a passivated record.
pub fn encode<K: StoreKey, V: Serialize>(key: &K, value: &V) -> Result<Vec<u8>> {
    let name = key.storage_name();
    serde_json::to_vec(&RecordRef {
        key: &name,
        passivated_at: Utc::now(),
        value,
    })
    .map_err(|source| Error::Serialization {
        key: key.to_string(),
        source,
    })
}

/// Deserialize a passivated record and return its value.
pub fn decode<K: StoreKey, V: DeserializeOwned>(key: &K, bytes: &[u8]) -> Result<V> {
    let record: PassivatedRecord<V> = decode_record(bytes).map_err(|e| match e {
        Error::Deserialization { reason, .. } => Error::Deserialization {
            key: key.to_string(),
            reason,
        },
        other => other,
    })?;

    let expected = key.storage_name();
    if record.key != expected {
        return Err(Error::Deserialization {
            key: key.to_string(),
            reason: format!("record belongs to '{}'", record.key),
        });
    }
    Ok(record.value)
}

/// Deserialize a record without checking its key.
///
/// Decoding into `PassivatedRecord<serde_json::Value>` inspects a record
/// without knowing its value type.
pub fn decode_record<V: DeserializeOwned>(bytes: &[u8]) -> Result<PassivatedRecord<V>> {
    serde_json::from_slice(bytes).map_err(|e| Error::Deserialization {
        key: "<unknown>".to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Cart {
        items: Vec<String>,
    }

    #[test]
    fn test_encode_decode() {
        let key = "session-1".to_string();
        let cart = Cart {
            items: vec!["apple".into()],
        };

        let bytes = encode(&key, &cart).unwrap();
        let decoded: Cart = decode(&key, &bytes).unwrap();
        assert_eq!(decoded, cart);
    }

    #[test]
    fn test_decode_rejects_other_key() {
        let bytes = encode(&"a".to_string(), &1u32).unwrap();
        let err = decode::<String, u32>(&"b".to_string(), &bytes).unwrap_err();
        assert!(matches!(err, Error::Deserialization { ref key, .. } if key == "b"));
    }

    #[test]
    fn test_decode_garbage() {
        let err = decode::<String, u32>(&"a".to_string(), b"not json").unwrap_err();
        assert!(matches!(err, Error::Deserialization { ref key, .. } if key == "a"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_decode_wrong_shape() {
        let bytes = encode(&"a".to_string(), &"text").unwrap();
        assert!(decode::<String, u32>(&"a".to_string(), &bytes).is_err());
    }

    #[test]
    fn test_decode_record_untyped() {
        let bytes = encode(&"a".to_string(), &Cart { items: vec![] }).unwrap();
        let record: PassivatedRecord<serde_json::Value> = decode_record(&bytes).unwrap();
        assert_eq!(record.key, "a");
        assert_eq!(record.value["items"], serde_json::json!([]));
    }
}
