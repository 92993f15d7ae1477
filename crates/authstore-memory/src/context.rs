//! In-memory backing context and its sessions.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use authstore::{
    BackingContext, DeleteOutcome, DeletePolicy, EntityKind, KeyValue, PruneCriteria, Row,
    Session, StoreResult,
    query::{Filter, RowQuery},
};

use crate::tables::Tables;

/// Name the memory context factory is registered under.
pub const CONTEXT_NAME: &str = "memory";

/// Backing context holding all four tables in process memory.
///
/// Cloning the `Arc` shares the data; every session sees the same tables.
#[derive(Debug, Default)]
pub struct MemoryContext {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently stored for `kind`.
    pub async fn row_count(&self, kind: EntityKind) -> usize {
        self.tables.read().await.len(kind)
    }

    /// Removes every row and resets identity counters.
    pub async fn reset(&self) {
        *self.tables.write().await = Tables::default();
        debug!("Memory context reset");
    }
}

#[async_trait]
impl BackingContext for MemoryContext {
    fn name(&self) -> &str {
        CONTEXT_NAME
    }

    async fn session(&self) -> StoreResult<Box<dyn Session>> {
        Ok(Box::new(MemorySession {
            tables: Arc::clone(&self.tables),
        }))
    }
}

/// Session over a [`MemoryContext`]. Each call takes the table lock for its
/// whole duration.
pub struct MemorySession {
    tables: Arc<RwLock<Tables>>,
}

#[async_trait]
impl Session for MemorySession {
    async fn insert(&mut self, kind: EntityKind, row: Row) -> StoreResult<Row> {
        let stored = self.tables.write().await.insert(kind, row)?;
        trace!(table = kind.table(), "Row inserted");
        Ok(stored)
    }

    async fn update(
        &mut self,
        kind: EntityKind,
        id: &KeyValue,
        expected_token: &str,
        row: Row,
    ) -> StoreResult<u64> {
        self.tables
            .write()
            .await
            .update(kind, id, expected_token, row)
    }

    async fn delete(
        &mut self,
        kind: EntityKind,
        id: &KeyValue,
        expected_token: &str,
        policy: DeletePolicy,
    ) -> StoreResult<DeleteOutcome> {
        Ok(self
            .tables
            .write()
            .await
            .delete(kind, id, expected_token, policy))
    }

    async fn select(&mut self, kind: EntityKind, query: &RowQuery) -> StoreResult<Vec<Row>> {
        Ok(self.tables.read().await.select(kind, query))
    }

    async fn count(&mut self, kind: EntityKind, filter: &Filter) -> StoreResult<u64> {
        Ok(self.tables.read().await.count(kind, filter))
    }

    async fn prune_batch(
        &mut self,
        kind: EntityKind,
        criteria: &PruneCriteria,
    ) -> StoreResult<u64> {
        Ok(self.tables.write().await.prune_batch(kind, criteria))
    }
}
