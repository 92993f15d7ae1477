//! Named permission groupings.

use serde::{Deserialize, Serialize};

use super::{Record, take_key};
use crate::error::StoreResult;
use crate::key::EntityKey;
use crate::schema::{EntityKind, Row, columns};

/// A scope. `name` is unique across scopes; uniqueness is enforced by the
/// backing context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope<K = String> {
    pub id: Option<K>,
    pub concurrency_token: Option<String>,
    pub description: Option<String>,
    pub descriptions: Option<String>,
    pub display_name: Option<String>,
    pub display_names: Option<String>,
    pub name: Option<String>,
    pub properties: Option<String>,

    /// Encoded list of resource server identifiers.
    pub resources: Option<String>,
}

impl<K> Default for Scope<K> {
    fn default() -> Self {
        Self {
            id: None,
            concurrency_token: None,
            description: None,
            descriptions: None,
            display_name: None,
            display_names: None,
            name: None,
            properties: None,
            resources: None,
        }
    }
}

impl<K> Scope<K> {
    /// Creates a scope with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

impl<K: EntityKey> Record for Scope<K> {
    const KIND: EntityKind = EntityKind::Scope;

    fn id(&self) -> Option<&K> {
        self.id.as_ref()
    }

    fn set_id(&mut self, id: K) {
        self.id = Some(id);
    }

    fn concurrency_token(&self) -> Option<&str> {
        self.concurrency_token.as_deref()
    }

    fn set_concurrency_token(&mut self, token: Option<String>) {
        self.concurrency_token = token;
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with(columns::ID, self.id.as_ref().map(EntityKey::to_key_value))
            .with(columns::CONCURRENCY_TOKEN, self.concurrency_token.clone())
            .with(columns::DESCRIPTION, self.description.clone())
            .with(columns::DESCRIPTIONS, self.descriptions.clone())
            .with(columns::DISPLAY_NAME, self.display_name.clone())
            .with(columns::DISPLAY_NAMES, self.display_names.clone())
            .with(columns::NAME, self.name.clone())
            .with(columns::PROPERTIES, self.properties.clone())
            .with(columns::RESOURCES, self.resources.clone())
    }

    fn from_row(mut row: Row) -> StoreResult<Self> {
        Ok(Self {
            id: take_key(&mut row, columns::ID)?,
            concurrency_token: row.take_text(columns::CONCURRENCY_TOKEN)?,
            description: row.take_text(columns::DESCRIPTION)?,
            descriptions: row.take_text(columns::DESCRIPTIONS)?,
            display_name: row.take_text(columns::DISPLAY_NAME)?,
            display_names: row.take_text(columns::DISPLAY_NAMES)?,
            name: row.take_text(columns::NAME)?,
            properties: row.take_text(columns::PROPERTIES)?,
            resources: row.take_text(columns::RESOURCES)?,
        })
    }
}
