//! PostgreSQL backing context for authstore.
//!
//! Stores applications, authorizations, scopes and tokens in four tables
//! (see [`schema_sql`]). Identifiers and references use the column type
//! selected by [`PostgresConfig::key_type`], which must match the key type
//! of the registered models.
//!
//! - Updates and deletes are conditioned on the concurrency token.
//! - Deletes run in a transaction that checks dependent rows and applies the
//!   configured delete policy.
//! - Prune batches lock their candidate rows with `SKIP LOCKED`, so several
//!   sweepers can run side by side.
//!
//! # Example
//!
//! ```ignore
//! use authstore::prelude::*;
//! use authstore_postgres::{PostgresConfig, PostgresContextFactory};
//!
//! let config = PostgresConfig::new("postgres://localhost/authstore").with_apply_schema(true);
//! let services = StoreBuilder::new()
//!     .register_context(Arc::new(PostgresContextFactory::new(config)))
//!     .use_context("postgres")
//!     .build()?;
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod pool;
pub mod schema;
pub mod sql;

pub use config::PostgresConfig;
pub use context::{CONTEXT_NAME, PostgresContext, PostgresContextFactory, PostgresSession};
pub use error::{PostgresError, Result};
pub use pool::create_pool;
pub use schema::{apply_schema, schema_sql};
