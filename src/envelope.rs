//! The `{key, item}` record stored in the payload sequence.
//!
//! Encoded as JSON so producers and consumers in other runtimes can share a
//! queue. The Redis backend's Lua scripts read the `key` field directly.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub key: String,
    pub item: T,
}

/// Borrowing form used when encoding, so `put` needn't clone the item.
#[derive(Serialize)]
struct EnvelopeRef<'a, T: ?Sized> {
    key: &'a str,
    item: &'a T,
}

/// Just the key; lets the store arm a lease without knowing the item type.
#[derive(Deserialize)]
struct KeyOnly {
    key: String,
}

pub fn encode<T: Serialize + ?Sized>(key: &str, item: &T) -> Result<String> {
    serde_json::to_string(&EnvelopeRef { key, item }).map_err(Error::Encode)
}

pub fn decode<T: DeserializeOwned>(record: &str) -> Result<Envelope<T>> {
    serde_json::from_str(record).map_err(Error::CorruptPayload)
}

pub fn decode_key(record: &str) -> Result<String> {
    serde_json::from_str::<KeyOnly>(record)
        .map(|k| k.key)
        .map_err(Error::CorruptPayload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encodes_key_and_item_fields() {
        let record = encode("k1", &json!({"video": 42})).unwrap();
        let value: serde_json::Value = serde_json::from_str(&record).unwrap();
        assert_eq!(value, json!({"key": "k1", "item": {"video": 42}}));
    }

    #[test]
    fn decodes_typed_item() {
        let env: Envelope<Vec<u32>> = decode(r#"{"key":"k","item":[1,2,3]}"#).unwrap();
        assert_eq!(env.key, "k");
        assert_eq!(env.item, vec![1, 2, 3]);
    }

    #[test]
    fn key_readable_without_item_type() {
        assert_eq!(decode_key(r#"{"key":"k9","item":{"a":null}}"#).unwrap(), "k9");
    }

    #[test]
    fn truncated_record_is_corrupt() {
        let err = decode::<String>(r#"{"key":"k","item":"ab"#).unwrap_err();
        assert!(matches!(err, Error::CorruptPayload(_)));
        assert!(matches!(decode_key("not json"), Err(Error::CorruptPayload(_))));
    }

    #[test]
    fn item_type_mismatch_is_corrupt() {
        let err = decode::<u64>(r#"{"key":"k","item":"text"}"#).unwrap_err();
        assert!(matches!(err, Error::CorruptPayload(_)));
    }

    #[test]
    fn map_with_non_string_keys_fails_to_encode() {
        let mut item = std::collections::HashMap::new();
        item.insert((1, 2), "x");
        assert!(matches!(encode("k", &item), Err(Error::Encode(_))));
    }
}
