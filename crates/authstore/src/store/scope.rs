use async_trait::async_trait;
use tracing::instrument;

use super::{GenericStore, ScopeStore};
use crate::codec::{Localized, Properties};
use crate::error::{StoreError, StoreResult};
use crate::models::{Entity, Model, Scope};
use crate::query::Filter;
use crate::schema::columns;

#[async_trait]
impl<T> ScopeStore<T> for GenericStore<T>
where
    T: Model<Base = Scope<<T as Entity>::Key>>,
{
    #[instrument(skip(self))]
    async fn find_by_names(&self, names: &[String]) -> StoreResult<Vec<T>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let filter = Filter::all().is_in(columns::NAME, names.iter().map(String::as_str));
        self.fetch_all(filter).await
    }

    #[instrument(skip(self))]
    async fn find_by_resource(&self, resource: &str) -> StoreResult<Vec<T>> {
        let needle = serde_json::to_string(resource).map_err(|e| {
            StoreError::validation(format!("Cannot encode resource '{resource}': {e}"))
        })?;
        let candidates = self
            .fetch_all(Filter::all().contains(columns::RESOURCES, needle))
            .await?;

        let mut matches = Vec::new();
        for scope in candidates {
            if self.resources(&scope)?.iter().any(|r| r == resource) {
                matches.push(scope);
            }
        }
        Ok(matches)
    }

    fn descriptions(&self, scope: &T) -> StoreResult<Localized> {
        self.codec()
            .decode_localized(scope.base().descriptions.as_deref())
    }

    fn set_descriptions(&self, scope: &mut T, descriptions: &Localized) -> StoreResult<()> {
        scope.base_mut().descriptions = self.codec().encode_localized(descriptions)?;
        Ok(())
    }

    fn display_names(&self, scope: &T) -> StoreResult<Localized> {
        self.codec()
            .decode_localized(scope.base().display_names.as_deref())
    }

    fn set_display_names(&self, scope: &mut T, names: &Localized) -> StoreResult<()> {
        scope.base_mut().display_names = self.codec().encode_localized(names)?;
        Ok(())
    }

    fn properties(&self, scope: &T) -> StoreResult<Properties> {
        self.codec()
            .decode_properties(scope.base().properties.as_deref())
    }

    fn set_properties(&self, scope: &mut T, properties: &Properties) -> StoreResult<()> {
        scope.base_mut().properties = self.codec().encode_properties(properties)?;
        Ok(())
    }

    fn resources(&self, scope: &T) -> StoreResult<Vec<String>> {
        self.codec().decode_list(scope.base().resources.as_deref())
    }

    fn set_resources(&self, scope: &mut T, resources: &[String]) -> StoreResult<()> {
        scope.base_mut().resources = self.codec().encode_list(resources)?;
        Ok(())
    }
}
