use async_trait::async_trait;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::{EntityStore, GenericStore, PruneReport, TokenStore, prune};
use crate::codec::Properties;
use crate::error::StoreResult;
use crate::key::EntityKey;
use crate::models::{Entity, Model, Token};
use crate::query::Filter;
use crate::schema::{EntityKind, columns, statuses};

#[async_trait]
impl<T> TokenStore<T> for GenericStore<T>
where
    T: Model<Base = Token<<T as Entity>::Key>>,
{
    #[instrument(skip(self))]
    async fn find_by_authorization_id(&self, authorization_id: &T::Key) -> StoreResult<Vec<T>> {
        let filter = Filter::all().eq(columns::AUTHORIZATION_ID, authorization_id.to_key_value());
        self.fetch_all(filter).await
    }

    #[instrument(skip(self))]
    async fn find_by_application_id(&self, application_id: &T::Key) -> StoreResult<Vec<T>> {
        let filter = Filter::all().eq(columns::APPLICATION_ID, application_id.to_key_value());
        self.fetch_all(filter).await
    }

    #[instrument(skip(self))]
    async fn find_by_subject(&self, subject: &str) -> StoreResult<Vec<T>> {
        let filter = Filter::all().eq(columns::SUBJECT, subject);
        self.fetch_all(filter).await
    }

    #[instrument(skip(self))]
    async fn revoke_by_authorization_id(&self, authorization_id: &T::Key) -> StoreResult<u64> {
        let tokens = self.find_by_authorization_id(authorization_id).await?;

        let mut revoked = 0;
        for mut token in tokens {
            if token.base().status.as_deref() == Some(statuses::REVOKED) {
                continue;
            }
            token.base_mut().status = Some(statuses::REVOKED.to_string());
            match self.update(token).await {
                Ok(_) => revoked += 1,
                Err(e) if e.is_retryable() => {
                    debug!(error = %e, "Skipping concurrently modified token");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(revoked)
    }

    fn properties(&self, token: &T) -> StoreResult<Properties> {
        self.codec()
            .decode_properties(token.base().properties.as_deref())
    }

    fn set_properties(&self, token: &mut T, properties: &Properties) -> StoreResult<()> {
        token.base_mut().properties = self.codec().encode_properties(properties)?;
        Ok(())
    }

    #[instrument(skip(self, cancel))]
    async fn prune_until_cancelled(
        &self,
        cutoff: OffsetDateTime,
        cancel: &CancellationToken,
    ) -> StoreResult<PruneReport> {
        prune::sweep(self.runtime(), EntityKind::Token, cutoff, cancel).await
    }
}
