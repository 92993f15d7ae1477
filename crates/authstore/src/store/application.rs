use async_trait::async_trait;
use tracing::instrument;

use super::{ApplicationStore, GenericStore};
use crate::codec::{Localized, Properties};
use crate::error::{StoreError, StoreResult};
use crate::models::{Application, Entity, Model};
use crate::query::Filter;
use crate::schema::columns;

impl<T> GenericStore<T>
where
    T: Model<Base = Application<<T as Entity>::Key>>,
{
    /// Applications whose encoded `column` list contains `uri` exactly.
    async fn find_by_uri(&self, column: &'static str, uri: &str) -> StoreResult<Vec<T>> {
        // The encoded list is searched for the quoted value, then decoded to
        // discard partial matches.
        let needle = serde_json::to_string(uri)
            .map_err(|e| StoreError::validation(format!("Cannot encode URI '{uri}': {e}")))?;
        let filter = Filter::all().contains(column, needle);
        let candidates = self.fetch_all(filter).await?;

        let mut matches = Vec::new();
        for application in candidates {
            let encoded = match column {
                columns::REDIRECT_URIS => application.base().redirect_uris.as_deref(),
                _ => application.base().post_logout_redirect_uris.as_deref(),
            };
            if self.codec().decode_list(encoded)?.iter().any(|u| u == uri) {
                matches.push(application);
            }
        }
        Ok(matches)
    }
}

#[async_trait]
impl<T> ApplicationStore<T> for GenericStore<T>
where
    T: Model<Base = Application<<T as Entity>::Key>>,
{
    #[instrument(skip(self))]
    async fn find_by_redirect_uri(&self, uri: &str) -> StoreResult<Vec<T>> {
        self.find_by_uri(columns::REDIRECT_URIS, uri).await
    }

    #[instrument(skip(self))]
    async fn find_by_post_logout_redirect_uri(&self, uri: &str) -> StoreResult<Vec<T>> {
        self.find_by_uri(columns::POST_LOGOUT_REDIRECT_URIS, uri)
            .await
    }

    fn display_names(&self, application: &T) -> StoreResult<Localized> {
        self.codec()
            .decode_localized(application.base().display_names.as_deref())
    }

    fn set_display_names(&self, application: &mut T, names: &Localized) -> StoreResult<()> {
        application.base_mut().display_names = self.codec().encode_localized(names)?;
        Ok(())
    }

    fn permissions(&self, application: &T) -> StoreResult<Vec<String>> {
        self.codec()
            .decode_list(application.base().permissions.as_deref())
    }

    fn set_permissions(&self, application: &mut T, permissions: &[String]) -> StoreResult<()> {
        application.base_mut().permissions = self.codec().encode_list(permissions)?;
        Ok(())
    }

    fn post_logout_redirect_uris(&self, application: &T) -> StoreResult<Vec<String>> {
        self.codec()
            .decode_list(application.base().post_logout_redirect_uris.as_deref())
    }

    fn set_post_logout_redirect_uris(
        &self,
        application: &mut T,
        uris: &[String],
    ) -> StoreResult<()> {
        application.base_mut().post_logout_redirect_uris = self.codec().encode_list(uris)?;
        Ok(())
    }

    fn properties(&self, application: &T) -> StoreResult<Properties> {
        self.codec()
            .decode_properties(application.base().properties.as_deref())
    }

    fn set_properties(&self, application: &mut T, properties: &Properties) -> StoreResult<()> {
        application.base_mut().properties = self.codec().encode_properties(properties)?;
        Ok(())
    }

    fn redirect_uris(&self, application: &T) -> StoreResult<Vec<String>> {
        self.codec()
            .decode_list(application.base().redirect_uris.as_deref())
    }

    fn set_redirect_uris(&self, application: &mut T, uris: &[String]) -> StoreResult<()> {
        application.base_mut().redirect_uris = self.codec().encode_list(uris)?;
        Ok(())
    }

    fn requirements(&self, application: &T) -> StoreResult<Vec<String>> {
        self.codec()
            .decode_list(application.base().requirements.as_deref())
    }

    fn set_requirements(&self, application: &mut T, requirements: &[String]) -> StoreResult<()> {
        application.base_mut().requirements = self.codec().encode_list(requirements)?;
        Ok(())
    }
}
