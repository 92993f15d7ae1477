//! Encoding of multi-valued attributes.
//!
//! Lists, localized maps and property bags are persisted as a single text
//! column. A column is either absent (`None`) or holds a well-formed encoding;
//! decoding never yields partially valid data.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{StoreError, StoreResult};

/// Free-form extension properties attached to an entity.
pub type Properties = BTreeMap<String, Value>;

/// Culture-keyed localized strings (e.g. `"fr-FR" -> "Bonjour"`).
pub type Localized = BTreeMap<String, String>;

/// Converts structured values to and from their column representation.
///
/// Empty inputs encode to `None` so that an entity without values stores
/// `NULL` rather than an empty document.
pub trait Codec: Send + Sync + std::fmt::Debug {
    /// Encodes an ordered list of strings.
    fn encode_list(&self, values: &[String]) -> StoreResult<Option<String>>;

    /// Decodes an ordered list of strings. `None` decodes to an empty list.
    fn decode_list(&self, encoded: Option<&str>) -> StoreResult<Vec<String>>;

    /// Encodes a string-to-string map.
    fn encode_localized(&self, values: &Localized) -> StoreResult<Option<String>>;

    /// Decodes a string-to-string map. `None` decodes to an empty map.
    fn decode_localized(&self, encoded: Option<&str>) -> StoreResult<Localized>;

    /// Encodes a property bag.
    fn encode_properties(&self, values: &Properties) -> StoreResult<Option<String>>;

    /// Decodes a property bag. `None` decodes to an empty map.
    fn decode_properties(&self, encoded: Option<&str>) -> StoreResult<Properties>;
}

/// JSON codec: lists are JSON arrays of strings, maps are JSON objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    fn encode<T: serde::Serialize>(value: &T) -> StoreResult<String> {
        serde_json::to_string(value)
            .map_err(|e| StoreError::validation(format!("Failed to encode column value: {e}")))
    }

    fn decode<T: serde::de::DeserializeOwned + Default>(
        encoded: Option<&str>,
        shape: &str,
    ) -> StoreResult<T> {
        match encoded {
            None => Ok(T::default()),
            Some(text) => serde_json::from_str(text).map_err(|e| {
                StoreError::validation(format!("Malformed {shape} column value '{text}': {e}"))
            }),
        }
    }
}

impl Codec for JsonCodec {
    fn encode_list(&self, values: &[String]) -> StoreResult<Option<String>> {
        if values.is_empty() {
            return Ok(None);
        }
        Self::encode(&values).map(Some)
    }

    fn decode_list(&self, encoded: Option<&str>) -> StoreResult<Vec<String>> {
        Self::decode(encoded, "list")
    }

    fn encode_localized(&self, values: &Localized) -> StoreResult<Option<String>> {
        if values.is_empty() {
            return Ok(None);
        }
        Self::encode(values).map(Some)
    }

    fn decode_localized(&self, encoded: Option<&str>) -> StoreResult<Localized> {
        Self::decode(encoded, "map")
    }

    fn encode_properties(&self, values: &Properties) -> StoreResult<Option<String>> {
        if values.is_empty() {
            return Ok(None);
        }
        Self::encode(values).map(Some)
    }

    fn decode_properties(&self, encoded: Option<&str>) -> StoreResult<Properties> {
        Self::decode(encoded, "property")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_preserves_order() {
        let codec = JsonCodec;
        let values = vec!["c".to_string(), "a".to_string(), "b".to_string()];
        let encoded = codec.encode_list(&values).unwrap();
        assert_eq!(encoded.as_deref(), Some(r#"["c","a","b"]"#));
        assert_eq!(codec.decode_list(encoded.as_deref()).unwrap(), values);
    }

    #[test]
    fn test_empty_values_encode_to_none() {
        let codec = JsonCodec;
        assert_eq!(codec.encode_list(&[]).unwrap(), None);
        assert_eq!(codec.encode_localized(&Localized::new()).unwrap(), None);
        assert_eq!(codec.encode_properties(&Properties::new()).unwrap(), None);
        assert!(codec.decode_list(None).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_list_is_rejected() {
        let codec = JsonCodec;
        let err = codec.decode_list(Some("[\"a\",")).unwrap_err();
        assert!(err.is_validation_error());

        // Well-formed JSON of the wrong shape is malformed too.
        let err = codec.decode_list(Some(r#"{"a":1}"#)).unwrap_err();
        assert!(err.is_validation_error());
        let err = codec.decode_list(Some("[1,2]")).unwrap_err();
        assert!(err.is_validation_error());
    }

    #[test]
    fn test_properties_keep_arbitrary_json() {
        let codec = JsonCodec;
        let mut properties = Properties::new();
        properties.insert("tenant".into(), json!({"id": 7, "tags": ["a"]}));
        let encoded = codec.encode_properties(&properties).unwrap();
        assert_eq!(codec.decode_properties(encoded.as_deref()).unwrap(), properties);
    }

    #[test]
    fn test_localized_rejects_non_string_values() {
        let codec = JsonCodec;
        let err = codec.decode_localized(Some(r#"{"en":1}"#)).unwrap_err();
        assert!(err.is_validation_error());
    }
}
