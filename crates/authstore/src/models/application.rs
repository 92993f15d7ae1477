//! OAuth client registrations.

use serde::{Deserialize, Serialize};

use super::{Record, take_key};
use crate::error::StoreResult;
use crate::key::EntityKey;
use crate::schema::{EntityKind, Row, columns};

/// Client types.
pub mod application_types {
    pub const CONFIDENTIAL: &str = "confidential";
    pub const PUBLIC: &str = "public";
}

/// Consent types.
pub mod consent_types {
    pub const EXPLICIT: &str = "explicit";
    pub const EXTERNAL: &str = "external";
    pub const IMPLICIT: &str = "implicit";
    pub const SYSTEMATIC: &str = "systematic";
}

/// A registered OAuth 2.0 / OpenID Connect client.
///
/// `display_names`, `permissions`, `post_logout_redirect_uris`, `properties`,
/// `redirect_uris` and `requirements` hold encoded values; use the store's
/// accessors to read and write them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application<K = String> {
    pub id: Option<K>,

    /// Public client identifier, unique across applications.
    pub client_id: Option<String>,

    /// Client secret. May be hashed; never interpreted by the store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    pub concurrency_token: Option<String>,
    pub consent_type: Option<String>,
    pub display_name: Option<String>,
    pub display_names: Option<String>,
    pub permissions: Option<String>,
    pub post_logout_redirect_uris: Option<String>,
    pub properties: Option<String>,
    pub redirect_uris: Option<String>,
    pub requirements: Option<String>,

    #[serde(rename = "type")]
    pub application_type: Option<String>,
}

impl<K> Default for Application<K> {
    fn default() -> Self {
        Self {
            id: None,
            client_id: None,
            client_secret: None,
            concurrency_token: None,
            consent_type: None,
            display_name: None,
            display_names: None,
            permissions: None,
            post_logout_redirect_uris: None,
            properties: None,
            redirect_uris: None,
            requirements: None,
            application_type: None,
        }
    }
}

impl<K> Application<K> {
    /// Creates an application with the given client identifier.
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: Some(client_id.into()),
            ..Self::default()
        }
    }
}

impl<K: EntityKey> Record for Application<K> {
    const KIND: EntityKind = EntityKind::Application;

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
            .with(columns::CLIENT_ID, self.client_id.clone())
            .with(columns::CLIENT_SECRET, self.client_secret.clone())
            .with(columns::CONCURRENCY_TOKEN, self.concurrency_token.clone())
            .with(columns::CONSENT_TYPE, self.consent_type.clone())
            .with(columns::DISPLAY_NAME, self.display_name.clone())
            .with(columns::DISPLAY_NAMES, self.display_names.clone())
            .with(columns::PERMISSIONS, self.permissions.clone())
            .with(
                columns::POST_LOGOUT_REDIRECT_URIS,
                self.post_logout_redirect_uris.clone(),
            )
            .with(columns::PROPERTIES, self.properties.clone())
            .with(columns::REDIRECT_URIS, self.redirect_uris.clone())
            .with(columns::REQUIREMENTS, self.requirements.clone())
            .with(columns::TYPE, self.application_type.clone())
    }

    fn from_row(mut row: Row) -> StoreResult<Self> {
        Ok(Self {
            id: take_key(&mut row, columns::ID)?,
            client_id: row.take_text(columns::CLIENT_ID)?,
            client_secret: row.take_text(columns::CLIENT_SECRET)?,
            concurrency_token: row.take_text(columns::CONCURRENCY_TOKEN)?,
            consent_type: row.take_text(columns::CONSENT_TYPE)?,
            display_name: row.take_text(columns::DISPLAY_NAME)?,
            display_names: row.take_text(columns::DISPLAY_NAMES)?,
            permissions: row.take_text(columns::PERMISSIONS)?,
            post_logout_redirect_uris: row.take_text(columns::POST_LOGOUT_REDIRECT_URIS)?,
            properties: row.take_text(columns::PROPERTIES)?,
            redirect_uris: row.take_text(columns::REDIRECT_URIS)?,
            requirements: row.take_text(columns::REQUIREMENTS)?,
            application_type: row.take_text(columns::TYPE)?,
        })
    }
}
