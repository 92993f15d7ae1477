//! Store resolution.
//!
//! A [`StoreResolver`] maps a caller-requested entity type to the store that
//! serves it:
//!
//! 1. a store registered as an override for the type is returned unchanged;
//! 2. otherwise, if the type was registered as a model of the resolver's kind,
//!    the generic store for it is built once and memoized in the resolver's
//!    [`TypeResolutionCache`];
//! 3. otherwise resolution fails with [`StoreError::UnsupportedEntity`].
//!
//! Resolution never touches the backing context.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::models::Entity;
use crate::schema::EntityKind;
use crate::store::{ApplicationStore, AuthorizationStore, ScopeStore, StoreRuntime, TokenStore};

type AnyArc = Arc<dyn Any + Send + Sync>;

/// Builds the store for a model. `X` is the kind's store trait object.
pub type Derive<X> = fn(Arc<StoreRuntime>) -> Arc<X>;

/// An entity family and the store trait serving it.
pub trait StoreKind: Send + Sync + 'static {
    const KIND: EntityKind;

    /// Store trait object for entity type `T`.
    type Store<T: Entity>: ?Sized + Send + Sync + 'static;
}

/// Resolves [`ApplicationStore`]s.
#[derive(Debug)]
pub struct Applications;

/// Resolves [`AuthorizationStore`]s.
#[derive(Debug)]
pub struct Authorizations;

/// Resolves [`ScopeStore`]s.
#[derive(Debug)]
pub struct Scopes;

/// Resolves [`TokenStore`]s.
#[derive(Debug)]
pub struct Tokens;

impl StoreKind for Applications {
    const KIND: EntityKind = EntityKind::Application;
    type Store<T: Entity> = dyn ApplicationStore<T>;
}

impl StoreKind for Authorizations {
    const KIND: EntityKind = EntityKind::Authorization;
    type Store<T: Entity> = dyn AuthorizationStore<T>;
}

impl StoreKind for Scopes {
    const KIND: EntityKind = EntityKind::Scope;
    type Store<T: Entity> = dyn ScopeStore<T>;
}

impl StoreKind for Tokens {
    const KIND: EntityKind = EntityKind::Token;
    type Store<T: Entity> = dyn TokenStore<T>;
}

// =============================================================================
// Type Resolution Cache
// =============================================================================

/// Process-lifetime memo of resolved stores, keyed by entity type.
///
/// Backed by a lock-free map: concurrent first-time resolutions of the same
/// type may both build a store, but exactly one is published and every caller
/// receives that one.
pub struct TypeResolutionCache {
    entries: papaya::HashMap<TypeId, AnyArc>,
}

impl TypeResolutionCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: papaya::HashMap::new(),
        }
    }

    /// Number of memoized types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if a store for `T` is memoized.
    #[must_use]
    pub fn contains<T: 'static>(&self) -> bool {
        self.entries.pin().contains_key(&TypeId::of::<T>())
    }

    /// Drops every memoized store.
    pub fn clear(&self) {
        self.entries.pin().clear();
    }

    fn get<X: ?Sized + Send + Sync + 'static>(&self, type_id: TypeId) -> Option<Arc<X>> {
        let guard = self.entries.pin();
        guard.get(&type_id).and_then(downcast::<X>)
    }

    fn get_or_insert<X: ?Sized + Send + Sync + 'static>(
        &self,
        type_id: TypeId,
        store: Arc<X>,
    ) -> Option<Arc<X>> {
        let guard = self.entries.pin();
        downcast::<X>(guard.get_or_insert(type_id, Arc::new(store)))
    }
}

impl Default for TypeResolutionCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeResolutionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeResolutionCache")
            .field("len", &self.len())
            .finish()
    }
}

fn downcast<X: ?Sized + Send + Sync + 'static>(entry: &AnyArc) -> Option<Arc<X>> {
    entry.downcast_ref::<Arc<X>>().cloned()
}

// =============================================================================
// Registrations
// =============================================================================

struct Derivation<X: ?Sized> {
    derive: Derive<X>,
}

struct RegisteredModel {
    type_name: &'static str,
    derivation: AnyArc,
}

/// Entity types a resolver recognizes, with the function building their store.
#[derive(Default)]
pub struct ModelRegistry {
    models: HashMap<TypeId, RegisteredModel>,
}

impl ModelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T`, replacing any previous registration.
    pub fn register<T: Entity, X: ?Sized + Send + Sync + 'static>(&mut self, derive: Derive<X>) {
        self.models.insert(
            TypeId::of::<T>(),
            RegisteredModel {
                type_name: type_name::<T>(),
                derivation: Arc::new(Derivation { derive }),
            },
        );
    }

    /// Returns `true` if `T` is registered.
    #[must_use]
    pub fn contains<T: 'static>(&self) -> bool {
        self.models.contains_key(&TypeId::of::<T>())
    }

    /// Names of the registered types.
    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.models.values().map(|model| model.type_name)
    }

    fn derivation<X: ?Sized + 'static>(&self, type_id: TypeId) -> Option<Derive<X>> {
        let model = self.models.get(&type_id)?;
        model
            .derivation
            .downcast_ref::<Derivation<X>>()
            .map(|derivation| derivation.derive)
    }
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.type_names()).finish()
    }
}

/// Hand-written stores that take precedence over derived ones.
#[derive(Default)]
pub struct StoreOverrides {
    stores: HashMap<TypeId, AnyArc>,
}

impl StoreOverrides {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `store` as the store for `T`.
    pub fn insert<T: Entity, X: ?Sized + Send + Sync + 'static>(&mut self, store: Arc<X>) {
        self.stores.insert(TypeId::of::<T>(), Arc::new(store));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    fn get<X: ?Sized + Send + Sync + 'static>(&self, type_id: TypeId) -> Option<Arc<X>> {
        self.stores.get(&type_id).and_then(downcast::<X>)
    }
}

impl fmt::Debug for StoreOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOverrides")
            .field("len", &self.len())
            .finish()
    }
}

// =============================================================================
// Store Resolver
// =============================================================================

/// Resolves stores of one entity kind.
pub struct StoreResolver<S: StoreKind> {
    runtime: Arc<StoreRuntime>,
    registry: ModelRegistry,
    overrides: StoreOverrides,
    cache: TypeResolutionCache,
    _kind: PhantomData<fn() -> S>,
}

impl<S: StoreKind> StoreResolver<S> {
    /// Creates a resolver over the given registrations.
    #[must_use]
    pub fn new(
        runtime: Arc<StoreRuntime>,
        registry: ModelRegistry,
        overrides: StoreOverrides,
        cache: TypeResolutionCache,
    ) -> Self {
        Self {
            runtime,
            registry,
            overrides,
            cache,
            _kind: PhantomData,
        }
    }

    /// Returns the store serving `T`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnsupportedEntity`] naming `T` if `T` has neither
    /// an override nor a model registration for this kind.
    pub fn resolve<T: Entity>(&self) -> StoreResult<Arc<S::Store<T>>> {
        let type_id = TypeId::of::<T>();

        if let Some(store) = self.overrides.get::<S::Store<T>>(type_id) {
            return Ok(store);
        }

        if let Some(store) = self.cache.get::<S::Store<T>>(type_id) {
            return Ok(store);
        }

        let unsupported = || StoreError::unsupported_entity(type_name::<T>(), S::KIND);
        let derive = self
            .registry
            .derivation::<S::Store<T>>(type_id)
            .ok_or_else(unsupported)?;

        debug!(kind = %S::KIND, model = type_name::<T>(), "Resolving store");
        let store = derive(Arc::clone(&self.runtime));
        self.cache
            .get_or_insert(type_id, store)
            .ok_or_else(unsupported)
    }

    /// Returns `true` if `T` would resolve.
    #[must_use]
    pub fn supports<T: Entity>(&self) -> bool {
        self.overrides.get::<S::Store<T>>(TypeId::of::<T>()).is_some()
            || self.registry.contains::<T>()
    }

    /// The resolver's memo.
    #[must_use]
    pub fn cache(&self) -> &TypeResolutionCache {
        &self.cache
    }
}

impl<S: StoreKind> fmt::Debug for StoreResolver<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreResolver")
            .field("kind", &S::KIND)
            .field("registry", &self.registry)
            .field("overrides", &self.overrides)
            .field("cache", &self.cache)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::BackingContextBinding;
    use crate::builder::StoreBuilder;
    use crate::clock::SystemClock;
    use crate::codec::JsonCodec;
    use crate::config::StoreConfig;
    use crate::models::{Application, Model, Token};
    use crate::store::GenericStore;

    #[derive(Debug, Clone, Default)]
    struct AuditedToken {
        base: Token,
        audited: bool,
    }

    impl Entity for AuditedToken {
        type Key = String;
    }

    impl Model for AuditedToken {
        type Base = Token;

        fn base(&self) -> &Token {
            &self.base
        }

        fn base_mut(&mut self) -> &mut Token {
            &mut self.base
        }

        fn from_base(base: Token) -> Self {
            Self {
                base,
                audited: false,
            }
        }
    }

    #[derive(Debug, Clone)]
    struct Unrelated;

    impl Entity for Unrelated {
        type Key = String;
    }

    fn runtime() -> Arc<StoreRuntime> {
        Arc::new(StoreRuntime::new(
            BackingContextBinding::unbound(),
            Arc::new(JsonCodec),
            Arc::new(SystemClock),
            StoreConfig::default(),
        ))
    }

    #[test]
    fn test_resolution_is_memoized() {
        let services = StoreBuilder::new().build().unwrap();
        assert!(services.tokens().cache().is_empty());

        let first = services.tokens().resolve::<Token>().unwrap();
        let second = services.tokens().resolve::<Token>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(services.tokens().cache().contains::<Token>());
        assert_eq!(services.tokens().cache().len(), 1);
    }

    #[test]
    fn test_unregistered_type_is_unsupported() {
        let services = StoreBuilder::new().build().unwrap();

        let err = services.tokens().resolve::<Unrelated>().err().unwrap();
        assert!(err.is_unsupported_entity());
        assert!(err.to_string().contains("Unrelated"));

        // A model of another kind is not a token.
        let err = services.tokens().resolve::<Application>().err().unwrap();
        assert!(matches!(
            err,
            StoreError::UnsupportedEntity {
                kind: EntityKind::Token,
                ..
            }
        ));

        // Unsupported types are never memoized.
        assert!(services.tokens().cache().is_empty());
    }

    #[test]
    fn test_registered_custom_model_resolves() {
        let services = StoreBuilder::new()
            .register_token::<AuditedToken>()
            .build()
            .unwrap();
        let store = services.token_store::<AuditedToken>().unwrap();
        assert_eq!(store.kind(), EntityKind::Token);
        assert!(!AuditedToken::from_base(Token::default()).audited);
    }

    #[test]
    fn test_override_is_returned_unchanged() {
        let custom: Arc<dyn TokenStore<Token>> = Arc::new(GenericStore::<Token>::new(runtime()));
        let services = StoreBuilder::new()
            .override_token_store::<Token>(Arc::clone(&custom))
            .build()
            .unwrap();

        let resolved = services.token_store::<Token>().unwrap();
        assert!(Arc::ptr_eq(&resolved, &custom));
        assert!(services.tokens().cache().is_empty());
    }

    #[test]
    fn test_override_needs_no_registration() {
        let custom: Arc<dyn TokenStore<AuditedToken>> =
            Arc::new(GenericStore::<AuditedToken>::new(runtime()));
        let services = StoreBuilder::new()
            .override_token_store::<AuditedToken>(custom)
            .build()
            .unwrap();
        assert!(services.tokens().supports::<AuditedToken>());
        assert!(services.token_store::<AuditedToken>().is_ok());
    }

    #[test]
    fn test_concurrent_first_resolution_publishes_one_store() {
        let services = StoreBuilder::new().build().unwrap();

        let stores: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| services.scopes().resolve::<crate::models::Scope>()))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap().unwrap())
                .collect()
        });

        for store in &stores[1..] {
            assert!(Arc::ptr_eq(store, &stores[0]));
        }
        assert_eq!(services.scopes().cache().len(), 1);
    }

    #[test]
    fn test_clear_forgets_resolutions() {
        let services = StoreBuilder::new().build().unwrap();
        let first = services.applications().resolve::<Application>().unwrap();
        services.applications().cache().clear();
        assert!(services.applications().cache().is_empty());

        let second = services.applications().resolve::<Application>().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
