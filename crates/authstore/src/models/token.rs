//! Issued credentials.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{Record, take_key};
use crate::error::StoreResult;
use crate::key::EntityKey;
use crate::schema::{EntityKind, Row, columns};

/// Token types.
pub mod token_types {
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const AUTHORIZATION_CODE: &str = "authorization_code";
    pub const DEVICE_CODE: &str = "device_code";
    pub const ID_TOKEN: &str = "id_token";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const USER_CODE: &str = "user_code";
}

/// An issued token, optionally tied to an application and an authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token<K = String> {
    pub id: Option<K>,
    pub application_id: Option<K>,
    pub authorization_id: Option<K>,
    pub concurrency_token: Option<String>,

    #[serde(with = "time::serde::rfc3339::option", default)]
    pub creation_date: Option<OffsetDateTime>,

    #[serde(with = "time::serde::rfc3339::option", default)]
    pub expiration_date: Option<OffsetDateTime>,

    /// Opaque serialized token, only kept for reference tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,

    pub properties: Option<String>,

    #[serde(with = "time::serde::rfc3339::option", default)]
    pub redemption_date: Option<OffsetDateTime>,

    /// Reference identifier, unique across tokens when present.
    pub reference_id: Option<String>,

    pub status: Option<String>,
    pub subject: Option<String>,

    #[serde(rename = "type")]
    pub token_type: Option<String>,
}

impl<K> Default for Token<K> {
    fn default() -> Self {
        Self {
            id: None,
            application_id: None,
            authorization_id: None,
            concurrency_token: None,
            creation_date: None,
            expiration_date: None,
            payload: None,
            properties: None,
            redemption_date: None,
            reference_id: None,
            status: None,
            subject: None,
            token_type: None,
        }
    }
}

impl<K: EntityKey> Record for Token<K> {
    const KIND: EntityKind = EntityKind::Token;

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
            .with(
                columns::AUTHORIZATION_ID,
                self.authorization_id.as_ref().map(EntityKey::to_key_value),
            )
            .with(columns::CONCURRENCY_TOKEN, self.concurrency_token.clone())
            .with(columns::CREATION_DATE, self.creation_date)
            .with(columns::EXPIRATION_DATE, self.expiration_date)
            .with(columns::PAYLOAD, self.payload.clone())
            .with(columns::PROPERTIES, self.properties.clone())
            .with(columns::REDEMPTION_DATE, self.redemption_date)
            .with(columns::REFERENCE_ID, self.reference_id.clone())
            .with(columns::STATUS, self.status.clone())
            .with(columns::SUBJECT, self.subject.clone())
            .with(columns::TYPE, self.token_type.clone())
    }

    fn from_row(mut row: Row) -> StoreResult<Self> {
        Ok(Self {
            id: take_key(&mut row, columns::ID)?,
            application_id: take_key(&mut row, columns::APPLICATION_ID)?,
            authorization_id: take_key(&mut row, columns::AUTHORIZATION_ID)?,
            concurrency_token: row.take_text(columns::CONCURRENCY_TOKEN)?,
            creation_date: row.take_timestamp(columns::CREATION_DATE)?,
            expiration_date: row.take_timestamp(columns::EXPIRATION_DATE)?,
            payload: row.take_text(columns::PAYLOAD)?,
            properties: row.take_text(columns::PROPERTIES)?,
            redemption_date: row.take_timestamp(columns::REDEMPTION_DATE)?,
            reference_id: row.take_text(columns::REFERENCE_ID)?,
            status: row.take_text(columns::STATUS)?,
            subject: row.take_text(columns::SUBJECT)?,
            token_type: row.take_text(columns::TYPE)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::statuses;
    use time::macros::datetime;

    #[test]
    fn test_row_round_trip_keeps_dates() {
        let token = Token::<String> {
            id: Some("t1".into()),
            authorization_id: Some("a1".into()),
            creation_date: Some(datetime!(2024-01-01 0:00 UTC)),
            expiration_date: Some(datetime!(2024-01-02 0:00 UTC)),
            status: Some(statuses::VALID.into()),
            token_type: Some(token_types::REFRESH_TOKEN.into()),
            ..Token::default()
        };

        let restored = Token::from_row(token.to_row()).unwrap();
        assert_eq!(restored, token);
    }

    #[test]
    fn test_json_dates_are_rfc3339() {
        let token = Token::<String> {
            creation_date: Some(datetime!(2024-01-01 0:00 UTC)),
            ..Token::default()
        };
        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(json["creationDate"], "2024-01-01T00:00:00Z");
    }
}
