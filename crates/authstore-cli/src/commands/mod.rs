//! Subcommand implementations.

pub mod prune;
pub mod schema;

use std::sync::Arc;

use anyhow::{Context, Result};
use authstore::{EntityKey, StoreBuilder, StoreServices};
use authstore_postgres::{CONTEXT_NAME, PostgresContextFactory};

use crate::config::CliConfig;

/// Wires stores with key type `K` to the configured database.
pub(crate) fn build_services<K: EntityKey>(config: &CliConfig) -> Result<StoreServices> {
    let factory = PostgresContextFactory::new(config.postgres.clone());
    StoreBuilder::from_config(config.store.clone())
        .with_key::<K>()
        .register_context(Arc::new(factory))
        .use_context(CONTEXT_NAME)
        .build()
        .context("Failed to configure stores")
}
