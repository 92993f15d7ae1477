//! Store wiring.
//!
//! [`StoreBuilder`] collects context factories, model registrations and store
//! overrides, then builds [`StoreServices`]: one resolver per entity kind,
//! all sharing a single lazily bound backing context.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::binding::BackingContextBinding;
use crate::clock::{Clock, SystemClock};
use crate::codec::{Codec, JsonCodec};
use crate::config::{DeletePolicy, StoreConfig};
use crate::error::{StoreError, StoreResult};
use crate::key::EntityKey;
use crate::models::{Application, Authorization, Entity, Model, Scope, Token};
use crate::resolver::{
    Applications, Authorizations, ModelRegistry, Scopes, StoreOverrides, StoreResolver, Tokens,
    TypeResolutionCache,
};
use crate::session::ContextFactory;
use crate::store::{
    ApplicationStore, AuthorizationStore, ScopeStore, StoreRuntime, TokenStore,
    derive_application_store, derive_authorization_store, derive_scope_store, derive_token_store,
};

#[derive(Default)]
struct KindRegistrations {
    registry: ModelRegistry,
    overrides: StoreOverrides,
}

/// Builds [`StoreServices`].
///
/// The default models (`Application`, `Authorization`, `Scope`, `Token` with
/// `String` keys) are registered up front.
pub struct StoreBuilder {
    config: StoreConfig,
    factories: BTreeMap<String, Arc<dyn ContextFactory>>,
    codec: Arc<dyn Codec>,
    clock: Arc<dyn Clock>,
    applications: KindRegistrations,
    authorizations: KindRegistrations,
    scopes: KindRegistrations,
    tokens: KindRegistrations,
}

impl StoreBuilder {
    /// Creates a builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::from_config(StoreConfig::default())
    }

    /// Creates a builder from a loaded configuration.
    #[must_use]
    pub fn from_config(config: StoreConfig) -> Self {
        Self {
            config,
            factories: BTreeMap::new(),
            codec: Arc::new(JsonCodec),
            clock: Arc::new(SystemClock),
            applications: KindRegistrations::default(),
            authorizations: KindRegistrations::default(),
            scopes: KindRegistrations::default(),
            tokens: KindRegistrations::default(),
        }
        .with_key::<String>()
    }

    /// Adjusts the configuration in place.
    #[must_use]
    pub fn configure(mut self, configure: impl FnOnce(&mut StoreConfig)) -> Self {
        configure(&mut self.config);
        self
    }

    /// Makes a backing context factory available under its name.
    #[must_use]
    pub fn register_context(mut self, factory: Arc<dyn ContextFactory>) -> Self {
        self.factories.insert(factory.name().to_string(), factory);
        self
    }

    /// Selects the backing context factory by name.
    #[must_use]
    pub fn use_context(mut self, name: impl Into<String>) -> Self {
        self.config.context = Some(name.into());
        self
    }

    #[must_use]
    pub fn delete_policy(mut self, policy: DeletePolicy) -> Self {
        self.config.delete_policy = policy;
        self
    }

    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Registers the four base models with key type `K`.
    #[must_use]
    pub fn with_key<K: EntityKey>(self) -> Self {
        self.register_application::<Application<K>>()
            .register_authorization::<Authorization<K>>()
            .register_scope::<Scope<K>>()
            .register_token::<Token<K>>()
    }

    /// Registers four custom models in one call.
    #[must_use]
    pub fn replace_default_entities<A, Z, S, T>(self) -> Self
    where
        A: Model<Base = Application<<A as Entity>::Key>>,
        Z: Model<Base = Authorization<<Z as Entity>::Key>>,
        S: Model<Base = Scope<<S as Entity>::Key>>,
        T: Model<Base = Token<<T as Entity>::Key>>,
    {
        self.register_application::<A>()
            .register_authorization::<Z>()
            .register_scope::<S>()
            .register_token::<T>()
    }

    #[must_use]
    pub fn register_application<T>(mut self) -> Self
    where
        T: Model<Base = Application<<T as Entity>::Key>>,
    {
        self.applications
            .registry
            .register::<T, dyn ApplicationStore<T>>(derive_application_store::<T>);
        self
    }

    #[must_use]
    pub fn register_authorization<T>(mut self) -> Self
    where
        T: Model<Base = Authorization<<T as Entity>::Key>>,
    {
        self.authorizations
            .registry
            .register::<T, dyn AuthorizationStore<T>>(derive_authorization_store::<T>);
        self
    }

    #[must_use]
    pub fn register_scope<T>(mut self) -> Self
    where
        T: Model<Base = Scope<<T as Entity>::Key>>,
    {
        self.scopes
            .registry
            .register::<T, dyn ScopeStore<T>>(derive_scope_store::<T>);
        self
    }

    #[must_use]
    pub fn register_token<T>(mut self) -> Self
    where
        T: Model<Base = Token<<T as Entity>::Key>>,
    {
        self.tokens
            .registry
            .register::<T, dyn TokenStore<T>>(derive_token_store::<T>);
        self
    }

    /// Serves `T` with a hand-written application store.
    #[must_use]
    pub fn override_application_store<T: Entity>(
        mut self,
        store: Arc<dyn ApplicationStore<T>>,
    ) -> Self {
        self.applications.overrides.insert::<T, _>(store);
        self
    }

    /// Serves `T` with a hand-written authorization store.
    #[must_use]
    pub fn override_authorization_store<T: Entity>(
        mut self,
        store: Arc<dyn AuthorizationStore<T>>,
    ) -> Self {
        self.authorizations.overrides.insert::<T, _>(store);
        self
    }

    /// Serves `T` with a hand-written scope store.
    #[must_use]
    pub fn override_scope_store<T: Entity>(mut self, store: Arc<dyn ScopeStore<T>>) -> Self {
        self.scopes.overrides.insert::<T, _>(store);
        self
    }

    /// Serves `T` with a hand-written token store.
    #[must_use]
    pub fn override_token_store<T: Entity>(mut self, store: Arc<dyn TokenStore<T>>) -> Self {
        self.tokens.overrides.insert::<T, _>(store);
        self
    }

    /// Validates the configuration and builds the services.
    ///
    /// The selected backing context is not created here; it is created on
    /// first store use.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the configuration is invalid or names
    /// a context factory that was not registered.
    pub fn build(self) -> StoreResult<StoreServices> {
        use crate::config::Validate;

        self.config
            .validate()
            .map_err(|e| StoreError::configuration(e.to_string()))?;

        let binding = match self.config.context.as_deref() {
            None => BackingContextBinding::unbound(),
            Some(name) => {
                let factory = self.factories.get(name).ok_or_else(|| {
                    let known: Vec<_> = self.factories.keys().map(String::as_str).collect();
                    StoreError::configuration(format!(
                        "Unknown backing context '{name}' (registered: {known:?})"
                    ))
                })?;
                info!(context = name, "Stores bound to backing context");
                BackingContextBinding::new(Arc::clone(factory))
            }
        };

        let runtime = Arc::new(StoreRuntime::new(
            binding,
            self.codec,
            self.clock,
            self.config,
        ));

        Ok(StoreServices {
            applications: resolver(&runtime, self.applications),
            authorizations: resolver(&runtime, self.authorizations),
            scopes: resolver(&runtime, self.scopes),
            tokens: resolver(&runtime, self.tokens),
            runtime,
        })
    }
}

impl Default for StoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn resolver<S: crate::resolver::StoreKind>(
    runtime: &Arc<StoreRuntime>,
    registrations: KindRegistrations,
) -> StoreResolver<S> {
    StoreResolver::new(
        Arc::clone(runtime),
        registrations.registry,
        registrations.overrides,
        TypeResolutionCache::new(),
    )
}

/// The resolvers for the four entity kinds.
#[derive(Debug)]
pub struct StoreServices {
    runtime: Arc<StoreRuntime>,
    applications: StoreResolver<Applications>,
    authorizations: StoreResolver<Authorizations>,
    scopes: StoreResolver<Scopes>,
    tokens: StoreResolver<Tokens>,
}

impl StoreServices {
    #[must_use]
    pub fn applications(&self) -> &StoreResolver<Applications> {
        &self.applications
    }

    #[must_use]
    pub fn authorizations(&self) -> &StoreResolver<Authorizations> {
        &self.authorizations
    }

    #[must_use]
    pub fn scopes(&self) -> &StoreResolver<Scopes> {
        &self.scopes
    }

    #[must_use]
    pub fn tokens(&self) -> &StoreResolver<Tokens> {
        &self.tokens
    }

    /// Resolves the application store for `T`.
    ///
    /// # Errors
    ///
    /// See [`StoreResolver::resolve`].
    pub fn application_store<T: Entity>(&self) -> StoreResult<Arc<dyn ApplicationStore<T>>> {
        self.applications.resolve::<T>()
    }

    /// Resolves the authorization store for `T`.
    ///
    /// # Errors
    ///
    /// See [`StoreResolver::resolve`].
    pub fn authorization_store<T: Entity>(&self) -> StoreResult<Arc<dyn AuthorizationStore<T>>> {
        self.authorizations.resolve::<T>()
    }

    /// Resolves the scope store for `T`.
    ///
    /// # Errors
    ///
    /// See [`StoreResolver::resolve`].
    pub fn scope_store<T: Entity>(&self) -> StoreResult<Arc<dyn ScopeStore<T>>> {
        self.scopes.resolve::<T>()
    }

    /// Resolves the token store for `T`.
    ///
    /// # Errors
    ///
    /// See [`StoreResolver::resolve`].
    pub fn token_store<T: Entity>(&self) -> StoreResult<Arc<dyn TokenStore<T>>> {
        self.tokens.resolve::<T>()
    }

    /// Shared runtime (binding, codec, clock, configuration).
    #[must_use]
    pub fn runtime(&self) -> &Arc<StoreRuntime> {
        &self.runtime
    }

    /// Clears the resolution caches and closes the backing context.
    pub async fn shutdown(&self) {
        self.applications.cache().clear();
        self.authorizations.cache().clear();
        self.scopes.cache().clear();
        self.tokens.cache().clear();
        self.runtime.binding().close().await;
        info!("Store services shut down");
    }
}
