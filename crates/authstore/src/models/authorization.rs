//! Recorded consents.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{Record, take_key};
use crate::error::StoreResult;
use crate::key::EntityKey;
use crate::schema::{EntityKind, Row, columns};

/// A consent granted by a subject to an application for a set of scopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorization<K = String> {
    pub id: Option<K>,

    /// Owning application, if any.
    pub application_id: Option<K>,

    pub concurrency_token: Option<String>,

    #[serde(with = "time::serde::rfc3339::option", default)]
    pub creation_date: Option<OffsetDateTime>,

    pub properties: Option<String>,

    /// Encoded list of granted scope names.
    pub scopes: Option<String>,

    /// See [`statuses`](crate::schema::statuses).
    pub status: Option<String>,

    pub subject: Option<String>,

    /// See [`authorization_types`](crate::schema::authorization_types).
    #[serde(rename = "type")]
    pub authorization_type: Option<String>,
}

impl<K> Default for Authorization<K> {
    fn default() -> Self {
        Self {
            id: None,
            application_id: None,
            concurrency_token: None,
            creation_date: None,
            properties: None,
            scopes: None,
            status: None,
            subject: None,
            authorization_type: None,
        }
    }
}

impl<K: EntityKey> Record for Authorization<K> {
    const KIND: EntityKind = EntityKind::Authorization;

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
            .with(
                columns::APPLICATION_ID,
                self.application_id.as_ref().map(EntityKey::to_key_value),
            )
            .with(columns::CONCURRENCY_TOKEN, self.concurrency_token.clone())
            .with(columns::CREATION_DATE, self.creation_date)
            .with(columns::PROPERTIES, self.properties.clone())
            .with(columns::SCOPES, self.scopes.clone())
            .with(columns::STATUS, self.status.clone())
            .with(columns::SUBJECT, self.subject.clone())
            .with(columns::TYPE, self.authorization_type.clone())
    }

    fn from_row(mut row: Row) -> StoreResult<Self> {
        Ok(Self {
            id: take_key(&mut row, columns::ID)?,
            application_id: take_key(&mut row, columns::APPLICATION_ID)?,
            concurrency_token: row.take_text(columns::CONCURRENCY_TOKEN)?,
            creation_date: row.take_timestamp(columns::CREATION_DATE)?,
            properties: row.take_text(columns::PROPERTIES)?,
            scopes: row.take_text(columns::SCOPES)?,
            status: row.take_text(columns::STATUS)?,
            subject: row.take_text(columns::SUBJECT)?,
            authorization_type: row.take_text(columns::TYPE)?,
        })
    }
}
