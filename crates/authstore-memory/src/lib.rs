//! In-memory backing context for authstore.
//!
//! Holds the application, authorization, scope and token tables in process
//! memory behind a single `tokio::sync::RwLock`. Unique columns, identity
//! assignment, referential delete policies and the pruning rules behave as
//! they do in the PostgreSQL backend, which makes this context suitable for
//! tests and single-process deployments.
//!
//! # Example
//!
//! ```ignore
//! use authstore::prelude::*;
//! use authstore_memory::MemoryContextFactory;
//!
//! let services = StoreBuilder::new()
//!     .register_context(Arc::new(MemoryContextFactory::new()))
//!     .use_context("memory")
//!     .build()?;
//!
//! let tokens = services.token_store::<Token>()?;
//! ```

pub mod context;
pub mod factory;
mod tables;

pub use context::{CONTEXT_NAME, MemoryContext, MemorySession};
pub use factory::MemoryContextFactory;
pub use tables::MemoryError;
