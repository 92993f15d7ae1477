//! Persisted layout shared by every backing context.
//!
//! Each entity kind maps to one table. Multi-valued attributes are stored in
//! `TEXT` columns holding their encoded form, the concurrency token is an
//! opaque string, and identifiers/references use the key's native type.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{StoreError, StoreResult};
use crate::key::KeyValue;

/// Column names used across the four tables.
pub mod columns {
    pub const ID: &str = "id";
    pub const APPLICATION_ID: &str = "application_id";
    pub const AUTHORIZATION_ID: &str = "authorization_id";
    pub const CLIENT_ID: &str = "client_id";
    pub const CLIENT_SECRET: &str = "client_secret";
    pub const CONCURRENCY_TOKEN: &str = "concurrency_token";
    pub const CONSENT_TYPE: &str = "consent_type";
    pub const CREATION_DATE: &str = "creation_date";
    pub const DESCRIPTION: &str = "description";
    pub const DESCRIPTIONS: &str = "descriptions";
    pub const DISPLAY_NAME: &str = "display_name";
    pub const DISPLAY_NAMES: &str = "display_names";
    pub const EXPIRATION_DATE: &str = "expiration_date";
    pub const NAME: &str = "name";
    pub const PAYLOAD: &str = "payload";
    pub const PERMISSIONS: &str = "permissions";
    pub const POST_LOGOUT_REDIRECT_URIS: &str = "post_logout_redirect_uris";
    pub const PROPERTIES: &str = "properties";
    pub const REDEMPTION_DATE: &str = "redemption_date";
    pub const REDIRECT_URIS: &str = "redirect_uris";
    pub const REFERENCE_ID: &str = "reference_id";
    pub const REQUIREMENTS: &str = "requirements";
    pub const RESOURCES: &str = "resources";
    pub const SCOPES: &str = "scopes";
    pub const STATUS: &str = "status";
    pub const SUBJECT: &str = "subject";
    pub const TYPE: &str = "type";
}

/// Token and authorization statuses.
pub mod statuses {
    pub const INACTIVE: &str = "inactive";
    pub const REDEEMED: &str = "redeemed";
    pub const REJECTED: &str = "rejected";
    pub const REVOKED: &str = "revoked";
    pub const VALID: &str = "valid";
}

/// Authorization types.
pub mod authorization_types {
    pub const AD_HOC: &str = "ad-hoc";
    pub const PERMANENT: &str = "permanent";
}

// =============================================================================
// Entity Kind
// =============================================================================

/// The four entity families managed by the stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// OAuth client registrations.
    Application,
    /// Recorded consents.
    Authorization,
    /// Named permission groupings.
    Scope,
    /// Issued credentials.
    Token,
}

impl EntityKind {
    /// All kinds, in dependency order (referenced tables first).
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Application,
        EntityKind::Authorization,
        EntityKind::Scope,
        EntityKind::Token,
    ];

    /// Table backing this kind.
    #[must_use]
    pub fn table(&self) -> &'static str {
        match self {
            Self::Application => "authstore_applications",
            Self::Authorization => "authstore_authorizations",
            Self::Scope => "authstore_scopes",
            Self::Token => "authstore_tokens",
        }
    }

    /// Column definitions, `id` first.
    #[must_use]
    pub fn columns(&self) -> &'static [Column] {
        match self {
            Self::Application => APPLICATION_COLUMNS,
            Self::Authorization => AUTHORIZATION_COLUMNS,
            Self::Scope => SCOPE_COLUMNS,
            Self::Token => TOKEN_COLUMNS,
        }
    }

    /// Looks up a column definition by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&'static Column> {
        self.columns().iter().find(|column| column.name == name)
    }

    /// Column whose values are unique across the table, if any.
    #[must_use]
    pub fn unique_column(&self) -> Option<&'static str> {
        match self {
            Self::Application => Some(columns::CLIENT_ID),
            Self::Authorization => None,
            Self::Scope => Some(columns::NAME),
            Self::Token => Some(columns::REFERENCE_ID),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Application => "application",
            Self::Authorization => "authorization",
            Self::Scope => "scope",
            Self::Token => "token",
        };
        f.write_str(name)
    }
}

// =============================================================================
// Columns
// =============================================================================

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Primary key, in the key's native type.
    Key,
    /// Optional reference to another table's key.
    Reference(EntityKind),
    /// Text, optionally length-limited.
    Text(Option<u16>),
    /// UTC timestamp.
    Timestamp,
}

/// A column definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    /// Column name.
    pub name: &'static str,
    /// Storage type.
    pub ty: ColumnType,
}

const fn col(name: &'static str, ty: ColumnType) -> Column {
    Column { name, ty }
}

const TEXT: ColumnType = ColumnType::Text(None);
const TOKEN_TEXT: ColumnType = ColumnType::Text(Some(50));

static APPLICATION_COLUMNS: &[Column] = &[
    col(columns::ID, ColumnType::Key),
    col(columns::CLIENT_ID, ColumnType::Text(Some(100))),
    col(columns::CLIENT_SECRET, TEXT),
    col(columns::CONCURRENCY_TOKEN, TOKEN_TEXT),
    col(columns::CONSENT_TYPE, TOKEN_TEXT),
    col(columns::DISPLAY_NAME, TEXT),
    col(columns::DISPLAY_NAMES, TEXT),
    col(columns::PERMISSIONS, TEXT),
    col(columns::POST_LOGOUT_REDIRECT_URIS, TEXT),
    col(columns::PROPERTIES, TEXT),
    col(columns::REDIRECT_URIS, TEXT),
    col(columns::REQUIREMENTS, TEXT),
    col(columns::TYPE, TOKEN_TEXT),
];

static AUTHORIZATION_COLUMNS: &[Column] = &[
    col(columns::ID, ColumnType::Key),
    col(
        columns::APPLICATION_ID,
        ColumnType::Reference(EntityKind::Application),
    ),
    col(columns::CONCURRENCY_TOKEN, TOKEN_TEXT),
    col(columns::CREATION_DATE, ColumnType::Timestamp),
    col(columns::PROPERTIES, TEXT),
    col(columns::SCOPES, TEXT),
    col(columns::STATUS, TOKEN_TEXT),
    col(columns::SUBJECT, ColumnType::Text(Some(400))),
    col(columns::TYPE, TOKEN_TEXT),
];

static SCOPE_COLUMNS: &[Column] = &[
    col(columns::ID, ColumnType::Key),
    col(columns::CONCURRENCY_TOKEN, TOKEN_TEXT),
    col(columns::DESCRIPTION, TEXT),
    col(columns::DESCRIPTIONS, TEXT),
    col(columns::DISPLAY_NAME, TEXT),
    col(columns::DISPLAY_NAMES, TEXT),
    col(columns::NAME, ColumnType::Text(Some(200))),
    col(columns::PROPERTIES, TEXT),
    col(columns::RESOURCES, TEXT),
];

static TOKEN_COLUMNS: &[Column] = &[
    col(columns::ID, ColumnType::Key),
    col(
        columns::APPLICATION_ID,
        ColumnType::Reference(EntityKind::Application),
    ),
    col(
        columns::AUTHORIZATION_ID,
        ColumnType::Reference(EntityKind::Authorization),
    ),
    col(columns::CONCURRENCY_TOKEN, TOKEN_TEXT),
    col(columns::CREATION_DATE, ColumnType::Timestamp),
    col(columns::EXPIRATION_DATE, ColumnType::Timestamp),
    col(columns::PAYLOAD, TEXT),
    col(columns::PROPERTIES, TEXT),
    col(columns::REDEMPTION_DATE, ColumnType::Timestamp),
    col(columns::REFERENCE_ID, ColumnType::Text(Some(100))),
    col(columns::STATUS, TOKEN_TEXT),
    col(columns::SUBJECT, ColumnType::Text(Some(400))),
    col(columns::TYPE, TOKEN_TEXT),
];

// =============================================================================
// Values and Rows
// =============================================================================

/// A single column value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnValue {
    /// SQL `NULL`.
    Null,
    /// A key or reference.
    Key(KeyValue),
    /// Text.
    Text(String),
    /// UTC timestamp.
    Timestamp(OffsetDateTime),
}

impl ColumnValue {
    /// Returns `true` for `NULL`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Compares two non-null values of the same variant.
    ///
    /// Returns `None` when either side is `NULL` or the variants differ,
    /// matching SQL comparison semantics.
    #[must_use]
    pub fn partial_compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Key(a), Self::Key(b)) => Some(a.cmp(b)),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            // Keys may be filtered with their textual form.
            (Self::Key(KeyValue::Text(a)), Self::Text(b))
            | (Self::Text(a), Self::Key(KeyValue::Text(b))) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<String> for ColumnValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for ColumnValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<KeyValue> for ColumnValue {
    fn from(value: KeyValue) -> Self {
        Self::Key(value)
    }
}

impl From<OffsetDateTime> for ColumnValue {
    fn from(value: OffsetDateTime) -> Self {
        Self::Timestamp(value)
    }
}

impl<T: Into<ColumnValue>> From<Option<T>> for ColumnValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

static NULL: ColumnValue = ColumnValue::Null;

/// A persisted row: column name to value. Missing columns read as `NULL`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    values: BTreeMap<&'static str, ColumnValue>,
}

impl Row {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a column, builder style.
    #[must_use]
    pub fn with(mut self, column: &'static str, value: impl Into<ColumnValue>) -> Self {
        self.set(column, value);
        self
    }

    /// Sets a column.
    pub fn set(&mut self, column: &'static str, value: impl Into<ColumnValue>) {
        self.values.insert(column, value.into());
    }

    /// Reads a column.
    #[must_use]
    pub fn get(&self, column: &str) -> &ColumnValue {
        self.values.get(column).unwrap_or(&NULL)
    }

    /// Iterates over the populated columns.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &ColumnValue)> {
        self.values.iter().map(|(name, value)| (*name, value))
    }

    /// Removes and returns a text column.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the column holds a non-text value.
    pub fn take_text(&mut self, column: &str) -> StoreResult<Option<String>> {
        match self.values.remove(column) {
            None | Some(ColumnValue::Null) => Ok(None),
            Some(ColumnValue::Text(value)) => Ok(Some(value)),
            Some(other) => Err(type_mismatch(column, "text", &other)),
        }
    }

    /// Removes and returns a timestamp column.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the column holds a non-timestamp value.
    pub fn take_timestamp(&mut self, column: &str) -> StoreResult<Option<OffsetDateTime>> {
        match self.values.remove(column) {
            None | Some(ColumnValue::Null) => Ok(None),
            Some(ColumnValue::Timestamp(value)) => Ok(Some(value)),
            Some(other) => Err(type_mismatch(column, "timestamp", &other)),
        }
    }

    /// Removes and returns a key or reference column.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the column holds a non-key value.
    pub fn take_key(&mut self, column: &str) -> StoreResult<Option<KeyValue>> {
        match self.values.remove(column) {
            None | Some(ColumnValue::Null) => Ok(None),
            Some(ColumnValue::Key(value)) => Ok(Some(value)),
            Some(other) => Err(type_mismatch(column, "key", &other)),
        }
    }
}

fn type_mismatch(column: &str, expected: &str, found: &ColumnValue) -> StoreError {
    StoreError::validation(format!(
        "Column '{column}' expected a {expected} value, found {found:?}"
    ))
}
