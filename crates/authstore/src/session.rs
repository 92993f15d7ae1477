//! Backing context abstraction.
//!
//! A [`ContextFactory`] creates a [`BackingContext`] (a connection pool, an
//! in-memory database, ...). The context hands out scoped [`Session`]s; every
//! store operation acquires one and drops it on every exit path.
//!
//! Sessions work on untyped [`Row`]s. Each mutating method is atomic: it
//! either applies completely or not at all.

use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::config::DeletePolicy;
use crate::error::StoreResult;
use crate::key::KeyValue;
use crate::query::{Filter, RowQuery};
use crate::schema::{EntityKind, Row};

/// Result of a token-conditioned delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The row was deleted, along with `cascaded` dependent rows.
    Deleted { cascaded: u64 },
    /// No row matched the identifier and concurrency token.
    Conflict,
    /// The row is still referenced and the policy is `restrict`.
    Referenced { dependents: u64 },
}

/// Parameters for a single prune batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PruneCriteria {
    /// Only rows created strictly before this instant are eligible.
    pub cutoff: OffsetDateTime,
    /// Reference time for expiration checks.
    pub now: OffsetDateTime,
    /// Upper bound on rows removed by the batch (dependent rows excluded).
    pub batch_size: u64,
}

/// A scoped handle on the backing store.
#[async_trait]
pub trait Session: Send {
    /// Inserts a row and returns it as stored.
    ///
    /// When the row has no `id`, the backing context assigns a sequential
    /// identity.
    async fn insert(&mut self, kind: EntityKind, row: Row) -> StoreResult<Row>;

    /// Replaces the row identified by `id` if its concurrency token still
    /// equals `expected_token`. Returns the number of rows written (0 or 1).
    async fn update(
        &mut self,
        kind: EntityKind,
        id: &KeyValue,
        expected_token: &str,
        row: Row,
    ) -> StoreResult<u64>;

    /// Deletes the row identified by `id` if its concurrency token still
    /// equals `expected_token`, applying `policy` to dependent rows.
    async fn delete(
        &mut self,
        kind: EntityKind,
        id: &KeyValue,
        expected_token: &str,
        policy: DeletePolicy,
    ) -> StoreResult<DeleteOutcome>;

    /// Returns the rows matching the query, in query order.
    async fn select(&mut self, kind: EntityKind, query: &RowQuery) -> StoreResult<Vec<Row>>;

    /// Counts the rows matching the filter.
    async fn count(&mut self, kind: EntityKind, filter: &Filter) -> StoreResult<u64>;

    /// Deletes one batch of prunable authorizations or tokens and returns the
    /// number of rows of `kind` removed.
    async fn prune_batch(&mut self, kind: EntityKind, criteria: &PruneCriteria)
    -> StoreResult<u64>;
}

/// A bound backend able to hand out sessions.
#[async_trait]
pub trait BackingContext: Send + Sync {
    /// Name of the backend, for logging.
    fn name(&self) -> &str;

    /// Acquires a scoped session.
    async fn session(&self) -> StoreResult<Box<dyn Session>>;

    /// Releases backend resources.
    async fn close(&self) {}
}

/// Creates backing contexts. Registered with the store builder by name.
#[async_trait]
pub trait ContextFactory: Send + Sync {
    /// Name the factory is selected by (`context = "<name>"`).
    fn name(&self) -> &str;

    /// Creates the backing context.
    async fn create(&self) -> StoreResult<Arc<dyn BackingContext>>;
}
