use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt, stream};
use tracing::{debug, instrument, warn};

use super::{EntityStore, EntityStream, StoreRuntime};
use crate::codec::Codec;
use crate::error::{StoreError, StoreResult};
use crate::key::{EntityKey, new_concurrency_token};
use crate::models::{Model, Record};
use crate::query::{EntityQuery, Filter, RowQuery};
use crate::schema::{ColumnValue, EntityKind, Row, columns};
use crate::session::DeleteOutcome;

/// The store implementation for every model `T`.
///
/// Operations acquire a session from the runtime's binding, so a store fails
/// with a configuration error until a backing context is bound.
pub struct GenericStore<T> {
    runtime: Arc<StoreRuntime>,
    _model: PhantomData<fn() -> T>,
}

impl<T: Model> GenericStore<T> {
    const KIND: EntityKind = <T::Base as Record>::KIND;

    /// Creates a store over `runtime`.
    #[must_use]
    pub fn new(runtime: Arc<StoreRuntime>) -> Self {
        Self {
            runtime,
            _model: PhantomData,
        }
    }

    pub(super) fn runtime(&self) -> &StoreRuntime {
        &self.runtime
    }

    pub(super) fn codec(&self) -> &dyn Codec {
        self.runtime.codec()
    }

    fn decode(&self, row: Row) -> StoreResult<T> {
        let extension = match T::EXTENSION_PROPERTY {
            Some(key) => self
                .codec()
                .decode_properties(text_column(&row, columns::PROPERTIES))?
                .remove(key),
            None => None,
        };

        let mut entity = T::from_base(<T::Base as Record>::from_row(row)?);
        if let Some(value) = extension {
            entity.restore_extension(value)?;
        }
        Ok(entity)
    }

    /// The row written for `entity`, with its extension merged into
    /// `properties`.
    fn encode(&self, entity: &T) -> StoreResult<Row> {
        let mut row = entity.base().to_row();
        if let Some(key) = T::EXTENSION_PROPERTY {
            let mut properties = self
                .codec()
                .decode_properties(text_column(&row, columns::PROPERTIES))?;
            properties.insert(key.to_string(), entity.extension());
            row.set(
                columns::PROPERTIES,
                self.codec().encode_properties(&properties)?,
            );
        }
        Ok(row)
    }

    /// Fetches every entity matching `filter`, ordered by id.
    pub(super) async fn fetch_all(&self, filter: Filter) -> StoreResult<Vec<T>> {
        self.list(EntityQuery::new(filter)).await
    }

    async fn next_page(
        &self,
        row_query: RowQuery,
        cursor: Cursor,
        page_size: u64,
    ) -> StoreResult<Option<(Vec<T>, Cursor)>> {
        if cursor.exhausted || cursor.remaining == Some(0) {
            return Ok(None);
        }
        let limit = cursor.remaining.map_or(page_size, |r| r.min(page_size));
        let page = row_query.window(cursor.offset, Some(limit));

        let rows = {
            let mut session = self.runtime.binding().session().await?;
            session.select(Self::KIND, &page).await?
        };

        let fetched = rows.len() as u64;
        debug!(entity = %Self::KIND, offset = cursor.offset, fetched, "Fetched query page");
        let entities = rows
            .into_iter()
            .map(|row| self.decode(row))
            .collect::<StoreResult<Vec<_>>>()?;

        let next = Cursor {
            offset: cursor.offset + fetched,
            remaining: cursor.remaining.map(|r| r.saturating_sub(fetched)),
            exhausted: fetched < limit,
        };
        Ok(Some((entities, next)))
    }

    /// Fetches the first entity matching `filter`.
    pub(super) async fn fetch_one(&self, filter: Filter) -> StoreResult<Option<T>> {
        let query = RowQuery::new(Self::KIND, filter, Vec::new())?.window(0, Some(1));
        let mut session = self.runtime.binding().session().await?;
        let row = session.select(Self::KIND, &query).await?.into_iter().next();
        row.map(|row| self.decode(row)).transpose()
    }
}

#[async_trait]
impl<T: Model> EntityStore<T> for GenericStore<T> {
    fn kind(&self) -> EntityKind {
        Self::KIND
    }

    #[instrument(skip(self, entity))]
    async fn create(&self, mut entity: T) -> StoreResult<T> {
        let mut session = self.runtime.binding().session().await?;

        let base = entity.base_mut();
        if base.id().is_none() {
            if let Some(id) = <T::Key as EntityKey>::generate() {
                base.set_id(id);
            }
        }
        base.set_concurrency_token(Some(new_concurrency_token()));

        let stored = session.insert(Self::KIND, self.encode(&entity)?).await?;
        let base = entity.base_mut();
        *base = <T::Base as Record>::from_row(stored)?;

        debug!(entity = %Self::KIND, id = ?base.id(), "Entity created");
        Ok(entity)
    }

    #[instrument(skip(self, entity))]
    async fn update(&self, mut entity: T) -> StoreResult<T> {
        let base = entity.base_mut();
        let id = base.id().cloned().ok_or_else(|| missing_id("update", Self::KIND))?;
        let Some(expected) = base.concurrency_token().map(str::to_owned) else {
            warn!(entity = %Self::KIND, %id, "Update without a concurrency token");
            return Err(StoreError::concurrency_conflict(Self::KIND, &id));
        };

        base.set_concurrency_token(Some(new_concurrency_token()));
        let row = self.encode(&entity)?;

        let mut session = self.runtime.binding().session().await?;
        let written = session
            .update(Self::KIND, &id.to_key_value(), &expected, row)
            .await?;
        if written == 0 {
            warn!(entity = %Self::KIND, %id, "Concurrency conflict on update");
            return Err(StoreError::concurrency_conflict(Self::KIND, &id));
        }

        debug!(entity = %Self::KIND, %id, "Entity updated");
        Ok(entity)
    }

    #[instrument(skip(self, entity))]
    async fn delete(&self, entity: &T) -> StoreResult<()> {
        let base = entity.base();
        let id = base.id().ok_or_else(|| missing_id("delete", Self::KIND))?;
        let Some(expected) = base.concurrency_token() else {
            warn!(entity = %Self::KIND, %id, "Delete without a concurrency token");
            return Err(StoreError::concurrency_conflict(Self::KIND, id));
        };

        let policy = self.runtime.config().delete_policy;
        let mut session = self.runtime.binding().session().await?;
        match session
            .delete(Self::KIND, &id.to_key_value(), expected, policy)
            .await?
        {
            DeleteOutcome::Deleted { cascaded } => {
                debug!(entity = %Self::KIND, %id, cascaded, "Entity deleted");
                Ok(())
            }
            DeleteOutcome::Conflict => {
                warn!(entity = %Self::KIND, %id, "Concurrency conflict on delete");
                Err(StoreError::concurrency_conflict(Self::KIND, id))
            }
            DeleteOutcome::Referenced { dependents } => {
                warn!(
                    entity = %Self::KIND,
                    %id,
                    dependents,
                    "Delete blocked by dependent entities"
                );
                Err(StoreError::referential_conflict(Self::KIND, id, dependents))
            }
        }
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: &T::Key) -> StoreResult<Option<T>> {
        let filter = Filter::all().eq(columns::ID, id.to_key_value());
        self.fetch_one(filter).await
    }

    #[instrument(skip(self))]
    async fn find_by_unique_field(&self, value: &str) -> StoreResult<Option<T>> {
        let Some(column) = Self::KIND.unique_column() else {
            return Ok(None);
        };
        self.fetch_one(Filter::all().eq(column, value)).await
    }

    fn query(&self, query: EntityQuery) -> EntityStream<'_, T> {
        let row_query = match RowQuery::new(Self::KIND, query.filter, query.order) {
            Ok(row_query) => row_query,
            Err(e) => return stream::once(async move { Err(e) }).boxed(),
        };
        let page_size = self.runtime.config().query.page_size.max(1);
        let start = Cursor {
            offset: query.skip,
            remaining: query.take,
            exhausted: false,
        };

        stream::try_unfold(start, move |cursor| {
            let row_query = row_query.clone();
            async move { self.next_page(row_query, cursor, page_size).await }
        })
        .map_ok(|page| stream::iter(page.into_iter().map(Ok)))
        .try_flatten()
        .boxed()
    }

    #[instrument(skip(self))]
    async fn count(&self, filter: Filter) -> StoreResult<u64> {
        filter.validate(Self::KIND)?;
        let mut session = self.runtime.binding().session().await?;
        session.count(Self::KIND, &filter).await
    }
}

impl<T> fmt::Debug for GenericStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericStore")
            .field("model", &std::any::type_name::<T>())
            .finish()
    }
}

fn text_column<'a>(row: &'a Row, column: &str) -> Option<&'a str> {
    match row.get(column) {
        ColumnValue::Text(text) => Some(text.as_str()),
        _ => None,
    }
}

fn missing_id(operation: &str, kind: EntityKind) -> StoreError {
    StoreError::validation(format!("Cannot {operation} a {kind} without an id"))
}

/// Paging position of a streamed query.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    offset: u64,
    remaining: Option<u64>,
    exhausted: bool,
}
