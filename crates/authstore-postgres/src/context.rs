//! PostgreSQL backing context, its sessions and factory.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx_core::connection::Connection;
use sqlx_core::pool::PoolConnection;
use sqlx_core::row::Row as _;
use sqlx_postgres::{PgPool, PgRow, Postgres};
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use authstore::query::{Filter, RowQuery};
use authstore::schema::ColumnType;
use authstore::{
    BackingContext, ColumnValue, ContextFactory, DeleteOutcome, DeletePolicy, EntityKind, KeyKind,
    KeyValue, PruneCriteria, Row, Session, StoreResult,
};

use crate::config::PostgresConfig;
use crate::error::PostgresError;
use crate::pool::create_pool;
use crate::schema::apply_schema;
use crate::sql;

/// Name the PostgreSQL context factory is registered under.
pub const CONTEXT_NAME: &str = "postgres";

/// Backing context over a connection pool.
#[derive(Debug, Clone)]
pub struct PostgresContext {
    pool: PgPool,
    key: KeyKind,
}

impl PostgresContext {
    /// Wraps an existing pool. `key` must match the column type the schema
    /// was created with.
    #[must_use]
    pub fn new(pool: PgPool, key: KeyKind) -> Self {
        Self { pool, key }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[must_use]
    pub fn key_type(&self) -> KeyKind {
        self.key
    }
}

#[async_trait]
impl BackingContext for PostgresContext {
    fn name(&self) -> &str {
        CONTEXT_NAME
    }

    async fn session(&self) -> StoreResult<Box<dyn Session>> {
        let conn = self.pool.acquire().await.map_err(PostgresError::from)?;
        Ok(Box::new(PostgresSession {
            conn,
            key: self.key,
        }))
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("PostgreSQL pool closed");
    }
}

/// A session holding one pooled connection. The connection returns to the
/// pool when the session is dropped.
pub struct PostgresSession {
    conn: PoolConnection<Postgres>,
    key: KeyKind,
}

impl PostgresSession {
    fn decode(&self, kind: EntityKind, row: &PgRow) -> StoreResult<Row> {
        let mut decoded = Row::new();
        for column in kind.columns() {
            let value: ColumnValue = match column.ty {
                ColumnType::Key | ColumnType::Reference(_) => match self.key {
                    KeyKind::Text => get::<String>(row, column.name)?
                        .map(KeyValue::Text)
                        .into(),
                    KeyKind::Bigint => get::<i64>(row, column.name)?.map(KeyValue::Int).into(),
                    KeyKind::Uuid => get::<Uuid>(row, column.name)?.map(KeyValue::Uuid).into(),
                },
                ColumnType::Text(_) => get::<String>(row, column.name)?.into(),
                ColumnType::Timestamp => get::<OffsetDateTime>(row, column.name)?.into(),
            };
            decoded.set(column.name, value);
        }
        Ok(decoded)
    }
}

fn get<T>(row: &PgRow, column: &str) -> StoreResult<Option<T>>
where
    T: for<'r> sqlx_core::decode::Decode<'r, Postgres> + sqlx_core::types::Type<Postgres>,
{
    let value = row
        .try_get::<Option<T>, _>(column)
        .map_err(PostgresError::from)?;
    Ok(value)
}

#[async_trait]
impl Session for PostgresSession {
    #[instrument(skip(self, row), fields(table = kind.table()))]
    async fn insert(&mut self, kind: EntityKind, row: Row) -> StoreResult<Row> {
        let stmt = sql::insert(kind, self.key, &row)?;
        let stored = stmt
            .query()
            .fetch_one(&mut *self.conn)
            .await
            .map_err(PostgresError::from)?;
        self.decode(kind, &stored)
    }

    #[instrument(skip(self, expected_token, row), fields(table = kind.table()))]
    async fn update(
        &mut self,
        kind: EntityKind,
        id: &KeyValue,
        expected_token: &str,
        row: Row,
    ) -> StoreResult<u64> {
        let stmt = sql::update(kind, self.key, id, expected_token, &row)?;
        let result = stmt
            .query()
            .execute(&mut *self.conn)
            .await
            .map_err(PostgresError::from)?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, expected_token), fields(table = kind.table()))]
    async fn delete(
        &mut self,
        kind: EntityKind,
        id: &KeyValue,
        expected_token: &str,
        policy: DeletePolicy,
    ) -> StoreResult<DeleteOutcome> {
        let lock = sql::lock_row(kind, self.key, id, expected_token)?;
        let dependents = sql::count_dependents(kind, self.key, id)?;
        let cascade = sql::delete_dependents(kind, self.key, id)?;
        let delete = sql::delete_row(kind, self.key, id)?;

        let mut tx = self.conn.begin().await.map_err(PostgresError::from)?;

        let locked = lock
            .query()
            .fetch_optional(&mut *tx)
            .await
            .map_err(PostgresError::from)?;
        if locked.is_none() {
            return Ok(DeleteOutcome::Conflict);
        }

        let count = match dependents {
            Some(stmt) => {
                let row = stmt
                    .query()
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(PostgresError::from)?;
                let count: i64 = row.try_get(0).map_err(PostgresError::from)?;
                u64::try_from(count).unwrap_or_default()
            }
            None => 0,
        };
        if count > 0 && policy == DeletePolicy::Restrict {
            debug!(dependents = count, "Delete restricted by dependent rows");
            return Ok(DeleteOutcome::Referenced { dependents: count });
        }

        for stmt in &cascade {
            stmt.query()
                .execute(&mut *tx)
                .await
                .map_err(PostgresError::from)?;
        }
        delete
            .query()
            .execute(&mut *tx)
            .await
            .map_err(PostgresError::from)?;
        tx.commit().await.map_err(PostgresError::from)?;

        Ok(DeleteOutcome::Deleted { cascaded: count })
    }

    #[instrument(skip(self, query), fields(table = kind.table()))]
    async fn select(&mut self, kind: EntityKind, query: &RowQuery) -> StoreResult<Vec<Row>> {
        let stmt = sql::select(kind, self.key, query)?;
        let rows = stmt
            .query()
            .fetch_all(&mut *self.conn)
            .await
            .map_err(PostgresError::from)?;
        rows.iter().map(|row| self.decode(kind, row)).collect()
    }

    #[instrument(skip(self, filter), fields(table = kind.table()))]
    async fn count(&mut self, kind: EntityKind, filter: &Filter) -> StoreResult<u64> {
        let stmt = sql::count(kind, self.key, filter)?;
        let row = stmt
            .query()
            .fetch_one(&mut *self.conn)
            .await
            .map_err(PostgresError::from)?;
        let count: i64 = row.try_get(0).map_err(PostgresError::from)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    #[instrument(skip(self), fields(table = kind.table()))]
    async fn prune_batch(
        &mut self,
        kind: EntityKind,
        criteria: &PruneCriteria,
    ) -> StoreResult<u64> {
        let Some(stmt) = sql::prune_batch(kind, criteria) else {
            warn!("Prune requested for a kind that is never pruned");
            return Ok(0);
        };
        let result = stmt
            .query()
            .execute(&mut *self.conn)
            .await
            .map_err(PostgresError::from)?;
        Ok(result.rows_affected())
    }
}

/// Opens a pool from [`PostgresConfig`] and, if configured, applies the
/// schema.
#[derive(Debug, Clone)]
pub struct PostgresContextFactory {
    config: PostgresConfig,
}

impl PostgresContextFactory {
    #[must_use]
    pub fn new(config: PostgresConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &PostgresConfig {
        &self.config
    }
}

#[async_trait]
impl ContextFactory for PostgresContextFactory {
    fn name(&self) -> &str {
        CONTEXT_NAME
    }

    async fn create(&self) -> StoreResult<Arc<dyn BackingContext>> {
        let pool = create_pool(&self.config).await?;
        if self.config.apply_schema {
            apply_schema(&pool, self.config.key_type).await?;
        }
        Ok(Arc::new(PostgresContext::new(pool, self.config.key_type)))
    }
}
