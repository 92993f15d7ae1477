//! Entity key types.
//!
//! Every entity is identified by a key `K: EntityKey`. The trait fixes how a
//! key maps onto its native column representation ([`KeyValue`]) and whether
//! the store generates identifiers at creation time:
//!
//! | Key type | Generated by | Column |
//! |---|---|---|
//! | `String` | store (UUID v4 text) | `TEXT` |
//! | `Uuid` | store (v4) | `UUID` |
//! | `i64`, `i32` | backing context (sequential identity) | `BIGINT` |
//!
//! A caller-supplied identifier is always kept.

use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

/// Native column representation of an entity key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyValue {
    /// Integer identity (`BIGINT`).
    Int(i64),
    /// Textual identifier (`TEXT`).
    Text(String),
    /// UUID identifier (`UUID`).
    Uuid(Uuid),
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
            Self::Uuid(value) => write!(f, "{value}"),
        }
    }
}

/// Column type used to persist keys and references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    /// `TEXT` keys.
    #[default]
    Text,
    /// `BIGINT` identity keys.
    Bigint,
    /// `UUID` keys.
    Uuid,
}

impl KeyKind {
    /// SQL column type for this key kind.
    #[must_use]
    pub fn sql_type(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Bigint => "BIGINT",
            Self::Uuid => "UUID",
        }
    }
}

/// A totally ordered, hashable entity identifier.
pub trait EntityKey:
    Clone + Ord + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Column representation of this key type.
    const KIND: KeyKind;

    /// Generates a fresh identifier, or `None` when the backing context
    /// assigns identities on insert.
    fn generate() -> Option<Self>;

    /// Converts the key into its column representation.
    fn to_key_value(&self) -> KeyValue;

    /// Reads a key back from its column representation.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the stored value cannot represent `Self`.
    fn from_key_value(value: KeyValue) -> StoreResult<Self>;
}

impl EntityKey for String {
    const KIND: KeyKind = KeyKind::Text;

    fn generate() -> Option<Self> {
        Some(Uuid::new_v4().to_string())
    }

    fn to_key_value(&self) -> KeyValue {
        KeyValue::Text(self.clone())
    }

    fn from_key_value(value: KeyValue) -> StoreResult<Self> {
        match value {
            KeyValue::Text(value) => Ok(value),
            other => Ok(other.to_string()),
        }
    }
}

impl EntityKey for Uuid {
    const KIND: KeyKind = KeyKind::Uuid;

    fn generate() -> Option<Self> {
        Some(Uuid::new_v4())
    }

    fn to_key_value(&self) -> KeyValue {
        KeyValue::Uuid(*self)
    }

    fn from_key_value(value: KeyValue) -> StoreResult<Self> {
        match value {
            KeyValue::Uuid(value) => Ok(value),
            KeyValue::Text(text) => Uuid::parse_str(&text)
                .map_err(|e| StoreError::validation(format!("Invalid UUID key '{text}': {e}"))),
            KeyValue::Int(value) => Err(StoreError::validation(format!(
                "Integer key {value} cannot be read as a UUID"
            ))),
        }
    }
}

impl EntityKey for i64 {
    const KIND: KeyKind = KeyKind::Bigint;

    fn generate() -> Option<Self> {
        None
    }

    fn to_key_value(&self) -> KeyValue {
        KeyValue::Int(*self)
    }

    fn from_key_value(value: KeyValue) -> StoreResult<Self> {
        match value {
            KeyValue::Int(value) => Ok(value),
            KeyValue::Text(text) => text
                .parse()
                .map_err(|e| StoreError::validation(format!("Invalid integer key '{text}': {e}"))),
            KeyValue::Uuid(value) => Err(StoreError::validation(format!(
                "UUID key {value} cannot be read as an integer"
            ))),
        }
    }
}

impl EntityKey for i32 {
    const KIND: KeyKind = KeyKind::Bigint;

    fn generate() -> Option<Self> {
        None
    }

    fn to_key_value(&self) -> KeyValue {
        KeyValue::Int(i64::from(*self))
    }

    fn from_key_value(value: KeyValue) -> StoreResult<Self> {
        let wide = i64::from_key_value(value)?;
        i32::try_from(wide)
            .map_err(|e| StoreError::validation(format!("Key {wide} overflows i32: {e}")))
    }
}

/// Generates a fresh concurrency token.
#[must_use]
pub fn new_concurrency_token() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_keys_are_generated() {
        let first = String::generate().unwrap();
        let second = String::generate().unwrap();
        assert_ne!(first, second);
        assert!(Uuid::parse_str(&first).is_ok());
    }

    #[test]
    fn test_integer_keys_are_assigned_by_backend() {
        assert!(i64::generate().is_none());
        assert!(i32::generate().is_none());
    }

    #[test]
    fn test_key_value_conversions() {
        let id = Uuid::new_v4();
        assert_eq!(Uuid::from_key_value(id.to_key_value()).unwrap(), id);
        assert_eq!(Uuid::from_key_value(KeyValue::Text(id.to_string())).unwrap(), id);
        assert_eq!(i64::from_key_value(KeyValue::Text("42".into())).unwrap(), 42);
        assert_eq!(String::from_key_value(KeyValue::Int(7)).unwrap(), "7");
    }

    #[test]
    fn test_invalid_key_values_are_rejected() {
        let err = Uuid::from_key_value(KeyValue::Text("not-a-uuid".into())).unwrap_err();
        assert!(err.is_validation_error());

        let err = i32::from_key_value(KeyValue::Int(i64::MAX)).unwrap_err();
        assert!(err.is_validation_error());
    }

    #[test]
    fn test_concurrency_tokens_are_unique() {
        assert_ne!(new_concurrency_token(), new_concurrency_token());
    }
}
