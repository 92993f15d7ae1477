//! Entity store traits and the generic store implementing them.
//!
//! Each entity kind has a trait ([`ApplicationStore`], [`AuthorizationStore`],
//! [`ScopeStore`], [`TokenStore`]) extending [`EntityStore`]. A single
//! [`GenericStore`] implements all of them for any model whose base record
//! matches the kind. Callers normally obtain stores through a
//! [`StoreResolver`](crate::resolver::StoreResolver) rather than building them
//! directly.

mod application;
mod authorization;
mod generic;
mod prune;
mod scope;
mod token;

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use futures_util::stream::BoxStream;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

pub use generic::GenericStore;
pub use prune::PruneReport;

use crate::binding::BackingContextBinding;
use crate::clock::Clock;
use crate::codec::{Codec, Localized, Properties};
use crate::config::StoreConfig;
use crate::error::StoreResult;
use crate::models::{Application, Authorization, Entity, Model, Scope, Token};
use crate::query::{EntityQuery, Filter};
use crate::schema::EntityKind;

/// Lazily produced, finite, ordered stream of entities.
pub type EntityStream<'a, T> = BoxStream<'a, StoreResult<T>>;

/// Collaborators shared by every store built from the same configuration.
#[derive(Debug)]
pub struct StoreRuntime {
    binding: BackingContextBinding,
    codec: Arc<dyn Codec>,
    clock: Arc<dyn Clock>,
    config: StoreConfig,
}

impl StoreRuntime {
    /// Creates a runtime.
    #[must_use]
    pub fn new(
        binding: BackingContextBinding,
        codec: Arc<dyn Codec>,
        clock: Arc<dyn Clock>,
        config: StoreConfig,
    ) -> Self {
        Self {
            binding,
            codec,
            clock,
            config,
        }
    }

    #[must_use]
    pub fn binding(&self) -> &BackingContextBinding {
        &self.binding
    }

    #[must_use]
    pub fn codec(&self) -> &dyn Codec {
        self.codec.as_ref()
    }

    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

/// Operations common to every entity kind.
///
/// Absence is never an error: finders return `Ok(None)`.
#[async_trait]
pub trait EntityStore<T: Entity>: Send + Sync {
    /// Kind of entity this store manages.
    fn kind(&self) -> EntityKind;

    /// Persists a new entity.
    ///
    /// Assigns an identifier when the key type generates one and none is set,
    /// and always assigns a fresh concurrency token. Returns the entity as
    /// stored.
    async fn create(&self, entity: T) -> StoreResult<T>;

    /// Replaces a stored entity.
    ///
    /// The write is conditioned on the entity's current concurrency token and
    /// installs a new one. Fails with a concurrency conflict if the stored
    /// token differs or the entity no longer exists.
    async fn update(&self, entity: T) -> StoreResult<T>;

    /// Deletes a stored entity under the same token condition as
    /// [`update`](Self::update). Dependents are handled per the configured
    /// delete policy.
    async fn delete(&self, entity: &T) -> StoreResult<()>;

    /// Finds an entity by identifier.
    async fn find_by_id(&self, id: &T::Key) -> StoreResult<Option<T>>;

    /// Finds an entity by its unique attribute (application client id, scope
    /// name, token reference id). Authorizations have none and always return
    /// `None`.
    async fn find_by_unique_field(&self, value: &str) -> StoreResult<Option<T>>;

    /// Streams the entities matching a query. Rows are fetched page by page
    /// as the stream is polled.
    fn query(&self, query: EntityQuery) -> EntityStream<'_, T>;

    /// Counts the entities matching a filter.
    async fn count(&self, filter: Filter) -> StoreResult<u64>;

    /// Collects a query into a vector.
    async fn list(&self, query: EntityQuery) -> StoreResult<Vec<T>> {
        self.query(query).try_collect().await
    }
}

/// Store for client applications.
#[async_trait]
pub trait ApplicationStore<T: Entity>: EntityStore<T> {
    /// Finds an application by client identifier.
    async fn find_by_client_id(&self, client_id: &str) -> StoreResult<Option<T>> {
        self.find_by_unique_field(client_id).await
    }

    /// Finds the applications allowed to redirect to `uri`.
    async fn find_by_redirect_uri(&self, uri: &str) -> StoreResult<Vec<T>>;

    /// Finds the applications allowed to redirect to `uri` after logout.
    async fn find_by_post_logout_redirect_uri(&self, uri: &str) -> StoreResult<Vec<T>>;

    fn display_names(&self, application: &T) -> StoreResult<Localized>;
    fn set_display_names(&self, application: &mut T, names: &Localized) -> StoreResult<()>;

    fn permissions(&self, application: &T) -> StoreResult<Vec<String>>;
    fn set_permissions(&self, application: &mut T, permissions: &[String]) -> StoreResult<()>;

    fn post_logout_redirect_uris(&self, application: &T) -> StoreResult<Vec<String>>;
    fn set_post_logout_redirect_uris(&self, application: &mut T, uris: &[String])
    -> StoreResult<()>;

    fn properties(&self, application: &T) -> StoreResult<Properties>;
    fn set_properties(&self, application: &mut T, properties: &Properties) -> StoreResult<()>;

    fn redirect_uris(&self, application: &T) -> StoreResult<Vec<String>>;
    fn set_redirect_uris(&self, application: &mut T, uris: &[String]) -> StoreResult<()>;

    fn requirements(&self, application: &T) -> StoreResult<Vec<String>>;
    fn set_requirements(&self, application: &mut T, requirements: &[String]) -> StoreResult<()>;
}

/// Store for authorizations (consents).
#[async_trait]
pub trait AuthorizationStore<T: Entity>: EntityStore<T> {
    /// Finds the authorizations granted by a subject.
    async fn find_by_subject(&self, subject: &str) -> StoreResult<Vec<T>>;

    /// Finds the authorizations attached to an application.
    async fn find_by_application_id(&self, application_id: &T::Key) -> StoreResult<Vec<T>>;

    /// Finds the authorizations of `subject` for `client`, optionally
    /// narrowed by status and type.
    async fn find(
        &self,
        subject: &str,
        client: &T::Key,
        status: Option<&str>,
        authorization_type: Option<&str>,
    ) -> StoreResult<Vec<T>>;

    fn scopes(&self, authorization: &T) -> StoreResult<Vec<String>>;
    fn set_scopes(&self, authorization: &mut T, scopes: &[String]) -> StoreResult<()>;

    fn properties(&self, authorization: &T) -> StoreResult<Properties>;
    fn set_properties(&self, authorization: &mut T, properties: &Properties) -> StoreResult<()>;

    /// Removes stale authorizations created before `cutoff`, together with
    /// the tokens still attached to them.
    async fn prune(&self, cutoff: OffsetDateTime) -> StoreResult<PruneReport> {
        self.prune_until_cancelled(cutoff, &CancellationToken::new())
            .await
    }

    /// Like [`prune`](Self::prune), stopping between batches once `cancel`
    /// fires. Calling it again resumes where the previous sweep stopped.
    async fn prune_until_cancelled(
        &self,
        cutoff: OffsetDateTime,
        cancel: &CancellationToken,
    ) -> StoreResult<PruneReport>;
}

/// Store for scopes.
#[async_trait]
pub trait ScopeStore<T: Entity>: EntityStore<T> {
    /// Finds a scope by name.
    async fn find_by_name(&self, name: &str) -> StoreResult<Option<T>> {
        self.find_by_unique_field(name).await
    }

    /// Finds the scopes with any of the given names.
    async fn find_by_names(&self, names: &[String]) -> StoreResult<Vec<T>>;

    /// Finds the scopes that list `resource`.
    async fn find_by_resource(&self, resource: &str) -> StoreResult<Vec<T>>;

    fn descriptions(&self, scope: &T) -> StoreResult<Localized>;
    fn set_descriptions(&self, scope: &mut T, descriptions: &Localized) -> StoreResult<()>;

    fn display_names(&self, scope: &T) -> StoreResult<Localized>;
    fn set_display_names(&self, scope: &mut T, names: &Localized) -> StoreResult<()>;

    fn properties(&self, scope: &T) -> StoreResult<Properties>;
    fn set_properties(&self, scope: &mut T, properties: &Properties) -> StoreResult<()>;

    fn resources(&self, scope: &T) -> StoreResult<Vec<String>>;
    fn set_resources(&self, scope: &mut T, resources: &[String]) -> StoreResult<()>;
}

/// Store for tokens.
#[async_trait]
pub trait TokenStore<T: Entity>: EntityStore<T> {
    /// Finds a token by reference identifier.
    async fn find_by_reference_id(&self, reference_id: &str) -> StoreResult<Option<T>> {
        self.find_by_unique_field(reference_id).await
    }

    /// Finds the tokens attached to an authorization.
    async fn find_by_authorization_id(&self, authorization_id: &T::Key) -> StoreResult<Vec<T>>;

    /// Finds the tokens issued to an application.
    async fn find_by_application_id(&self, application_id: &T::Key) -> StoreResult<Vec<T>>;

    /// Finds the tokens issued for a subject.
    async fn find_by_subject(&self, subject: &str) -> StoreResult<Vec<T>>;

    /// Marks every token attached to an authorization as revoked.
    ///
    /// Each token is written under its own concurrency check; tokens that
    /// were concurrently modified are skipped. Returns the number revoked.
    async fn revoke_by_authorization_id(&self, authorization_id: &T::Key) -> StoreResult<u64>;

    fn properties(&self, token: &T) -> StoreResult<Properties>;
    fn set_properties(&self, token: &mut T, properties: &Properties) -> StoreResult<()>;

    /// Removes stale tokens created before `cutoff`.
    async fn prune(&self, cutoff: OffsetDateTime) -> StoreResult<PruneReport> {
        self.prune_until_cancelled(cutoff, &CancellationToken::new())
            .await
    }

    /// Like [`prune`](Self::prune), stopping between batches once `cancel`
    /// fires.
    async fn prune_until_cancelled(
        &self,
        cutoff: OffsetDateTime,
        cancel: &CancellationToken,
    ) -> StoreResult<PruneReport>;
}

/// Builds the generic application store for `T`.
pub fn derive_application_store<T>(runtime: Arc<StoreRuntime>) -> Arc<dyn ApplicationStore<T>>
where
    T: Model<Base = Application<<T as Entity>::Key>>,
{
    Arc::new(GenericStore::<T>::new(runtime))
}

/// Builds the generic authorization store for `T`.
pub fn derive_authorization_store<T>(
    runtime: Arc<StoreRuntime>,
) -> Arc<dyn AuthorizationStore<T>>
where
    T: Model<Base = Authorization<<T as Entity>::Key>>,
{
    Arc::new(GenericStore::<T>::new(runtime))
}

/// Builds the generic scope store for `T`.
pub fn derive_scope_store<T>(runtime: Arc<StoreRuntime>) -> Arc<dyn ScopeStore<T>>
where
    T: Model<Base = Scope<<T as Entity>::Key>>,
{
    Arc::new(GenericStore::<T>::new(runtime))
}

/// Builds the generic token store for `T`.
pub fn derive_token_store<T>(runtime: Arc<StoreRuntime>) -> Arc<dyn TokenStore<T>>
where
    T: Model<Base = Token<<T as Entity>::Key>>,
{
    Arc::new(GenericStore::<T>::new(runtime))
}
