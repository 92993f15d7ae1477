//! # authstore
//!
//! Persistence layer for an OAuth 2.0 / OpenID Connect authorization server.
//!
//! This crate provides:
//! - Entity models for applications, authorizations, scopes and tokens,
//!   generic over their key type
//! - A generic entity store with optimistic concurrency, lazy paged queries
//!   and batched, cancelable pruning
//! - Per-kind store resolvers mapping (possibly custom) entity types to stores
//! - A lazily bound backing context abstraction implemented by backend crates
//!
//! ## Overview
//!
//! ```ignore
//! use authstore::prelude::*;
//!
//! let services = StoreBuilder::new()
//!     .register_context(Arc::new(MemoryContextFactory::new()))
//!     .use_context("memory")
//!     .build()?;
//!
//! let applications = services.application_store::<Application>()?;
//! let app = applications.create(Application::new("abc123")).await?;
//! ```
//!
//! ## Modules
//!
//! - [`models`] - Entity records and the model traits
//! - [`codec`] - Encoding of multi-valued attributes
//! - [`store`] - Store traits and the generic store
//! - [`resolver`] - Store resolution and its type cache
//! - [`builder`] - Store wiring
//! - [`session`] - Backing context abstraction
//! - [`pruning`] - Periodic pruning job

pub mod binding;
pub mod builder;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod key;
pub mod models;
pub mod pruning;
pub mod query;
pub mod resolver;
pub mod schema;
pub mod session;
pub mod store;

pub use binding::BackingContextBinding;
pub use builder::{StoreBuilder, StoreServices};
pub use clock::{Clock, FixedClock, SystemClock};
pub use codec::{Codec, JsonCodec, Localized, Properties};
pub use config::{ConfigError, DeletePolicy, PruneConfig, QueryConfig, StoreConfig, Validate};
pub use error::{ErrorCategory, StoreError, StoreResult};
pub use key::{EntityKey, KeyKind, KeyValue};
pub use models::{Application, Authorization, Entity, Model, Record, Scope, Token};
pub use pruning::{PruningJob, SweepSummary};
pub use query::{Direction, EntityQuery, Filter, OrderBy, Predicate};
pub use resolver::{StoreKind, StoreResolver, TypeResolutionCache};
pub use schema::{ColumnValue, EntityKind, Row, authorization_types, columns, statuses};
pub use session::{BackingContext, ContextFactory, DeleteOutcome, PruneCriteria, Session};
pub use store::{
    ApplicationStore, AuthorizationStore, EntityStore, EntityStream, GenericStore, PruneReport,
    ScopeStore, StoreRuntime, TokenStore,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        Application, ApplicationStore, Authorization, AuthorizationStore, DeletePolicy, Entity,
        EntityQuery, EntityStore, Filter, Model, OrderBy, Scope, ScopeStore, StoreBuilder,
        StoreError, StoreResult, StoreServices, Token, TokenStore,
    };
}
