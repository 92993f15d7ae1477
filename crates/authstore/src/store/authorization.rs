use async_trait::async_trait;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::{AuthorizationStore, GenericStore, PruneReport, prune};
use crate::codec::Properties;
use crate::error::StoreResult;
use crate::key::EntityKey;
use crate::models::{Authorization, Entity, Model};
use crate::query::Filter;
use crate::schema::{EntityKind, columns};

#[async_trait]
impl<T> AuthorizationStore<T> for GenericStore<T>
where
    T: Model<Base = Authorization<<T as Entity>::Key>>,
{
    #[instrument(skip(self))]
    async fn find_by_subject(&self, subject: &str) -> StoreResult<Vec<T>> {
        let filter = Filter::all().eq(columns::SUBJECT, subject);
        self.fetch_all(filter).await
    }

    #[instrument(skip(self))]
    async fn find_by_application_id(&self, application_id: &T::Key) -> StoreResult<Vec<T>> {
        let filter = Filter::all().eq(columns::APPLICATION_ID, application_id.to_key_value());
        self.fetch_all(filter).await
    }

    #[instrument(skip(self))]
    async fn find(
        &self,
        subject: &str,
        client: &T::Key,
        status: Option<&str>,
        authorization_type: Option<&str>,
    ) -> StoreResult<Vec<T>> {
        let mut filter = Filter::all()
            .eq(columns::SUBJECT, subject)
            .eq(columns::APPLICATION_ID, client.to_key_value());
        if let Some(status) = status {
            filter = filter.eq(columns::STATUS, status);
        }
        if let Some(authorization_type) = authorization_type {
            filter = filter.eq(columns::TYPE, authorization_type);
        }
        self.fetch_all(filter).await
    }

    fn scopes(&self, authorization: &T) -> StoreResult<Vec<String>> {
        self.codec()
            .decode_list(authorization.base().scopes.as_deref())
    }

    fn set_scopes(&self, authorization: &mut T, scopes: &[String]) -> StoreResult<()> {
        authorization.base_mut().scopes = self.codec().encode_list(scopes)?;
        Ok(())
    }

    fn properties(&self, authorization: &T) -> StoreResult<Properties> {
        self.codec()
            .decode_properties(authorization.base().properties.as_deref())
    }

    fn set_properties(&self, authorization: &mut T, properties: &Properties) -> StoreResult<()> {
        authorization.base_mut().properties = self.codec().encode_properties(properties)?;
        Ok(())
    }

    #[instrument(skip(self, cancel))]
    async fn prune_until_cancelled(
        &self,
        cutoff: OffsetDateTime,
        cancel: &CancellationToken,
    ) -> StoreResult<PruneReport> {
        prune::sweep(self.runtime(), EntityKind::Authorization, cutoff, cancel).await
    }
}
