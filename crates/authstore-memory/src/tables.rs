//! Table data and the row-level operations of the in-memory backend.
//!
//! Every operation here runs under the context's write (or read) lock, so a
//! single call is atomic with respect to every other session.

use std::collections::{BTreeMap, BTreeSet};

use authstore::{
    ColumnValue, DeleteOutcome, DeletePolicy, EntityKind, KeyValue, PruneCriteria, Row, StoreError,
    StoreResult, authorization_types, columns, statuses,
    query::{Filter, RowQuery},
};

/// Errors raised by the in-memory backend.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// A unique column already holds the value.
    #[error("duplicate value '{value}' for unique column {table}.{column}")]
    UniqueViolation {
        table: &'static str,
        column: &'static str,
        value: String,
    },

    /// A row with the same identifier exists.
    #[error("duplicate key '{id}' in {table}")]
    DuplicateKey { table: &'static str, id: KeyValue },
}

impl From<MemoryError> for StoreError {
    fn from(e: MemoryError) -> Self {
        StoreError::backend(e)
    }
}

#[derive(Debug)]
struct Table {
    rows: BTreeMap<KeyValue, Row>,
    next_identity: i64,
}

impl Default for Table {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_identity: 1,
        }
    }
}

/// The four tables.
#[derive(Debug, Default)]
pub(crate) struct Tables {
    tables: BTreeMap<EntityKind, Table>,
}

impl Tables {
    fn table(&self, kind: EntityKind) -> Option<&Table> {
        self.tables.get(&kind)
    }

    fn table_mut(&mut self, kind: EntityKind) -> &mut Table {
        self.tables.entry(kind).or_default()
    }

    fn rows(&self, kind: EntityKind) -> impl Iterator<Item = &Row> {
        self.table(kind).into_iter().flat_map(|table| table.rows.values())
    }

    pub(crate) fn len(&self, kind: EntityKind) -> usize {
        self.table(kind).map_or(0, |table| table.rows.len())
    }

    pub(crate) fn insert(&mut self, kind: EntityKind, mut row: Row) -> StoreResult<Row> {
        let table = self.table_mut(kind);
        let id = match row.get(columns::ID) {
            ColumnValue::Key(id) => id.clone(),
            _ => {
                let id = KeyValue::Int(table.next_identity);
                row.set(columns::ID, id.clone());
                id
            }
        };
        if let KeyValue::Int(value) = id {
            table.next_identity = table.next_identity.max(value + 1);
        }
        if table.rows.contains_key(&id) {
            return Err(MemoryError::DuplicateKey {
                table: kind.table(),
                id,
            }
            .into());
        }

        self.check_unique(kind, &row, None)?;
        self.table_mut(kind).rows.insert(id, row.clone());
        Ok(row)
    }

    pub(crate) fn update(
        &mut self,
        kind: EntityKind,
        id: &KeyValue,
        expected_token: &str,
        mut row: Row,
    ) -> StoreResult<u64> {
        if !self.token_matches(kind, id, expected_token) {
            return Ok(0);
        }
        self.check_unique(kind, &row, Some(id))?;

        row.set(columns::ID, id.clone());
        self.table_mut(kind).rows.insert(id.clone(), row);
        Ok(1)
    }

    pub(crate) fn delete(
        &mut self,
        kind: EntityKind,
        id: &KeyValue,
        expected_token: &str,
        policy: DeletePolicy,
    ) -> DeleteOutcome {
        if !self.token_matches(kind, id, expected_token) {
            return DeleteOutcome::Conflict;
        }

        let dependents = self.dependents(kind, id);
        let count: u64 = dependents.values().map(|ids| ids.len() as u64).sum();
        if count > 0 && policy == DeletePolicy::Restrict {
            return DeleteOutcome::Referenced { dependents: count };
        }

        for (dependent_kind, ids) in &dependents {
            let table = self.table_mut(*dependent_kind);
            for dependent in ids {
                table.rows.remove(dependent);
            }
        }
        self.table_mut(kind).rows.remove(id);
        DeleteOutcome::Deleted { cascaded: count }
    }

    pub(crate) fn select(&self, kind: EntityKind, query: &RowQuery) -> Vec<Row> {
        let mut rows: Vec<&Row> = self.rows(kind).filter(|row| query.filter.matches(row)).collect();
        rows.sort_by(|a, b| query.compare(a, b));

        let offset = usize::try_from(query.offset).unwrap_or(usize::MAX);
        let limit = query
            .limit
            .map_or(usize::MAX, |limit| usize::try_from(limit).unwrap_or(usize::MAX));
        rows.into_iter().skip(offset).take(limit).cloned().collect()
    }

    pub(crate) fn count(&self, kind: EntityKind, filter: &Filter) -> u64 {
        self.rows(kind).filter(|row| filter.matches(row)).count() as u64
    }

    pub(crate) fn prune_batch(&mut self, kind: EntityKind, criteria: &PruneCriteria) -> u64 {
        let limit = usize::try_from(criteria.batch_size).unwrap_or(usize::MAX);
        let eligible: Vec<KeyValue> = self
            .rows(kind)
            .filter(|row| match kind {
                EntityKind::Token => self.token_is_prunable(row, criteria),
                EntityKind::Authorization => self.authorization_is_prunable(row, criteria),
                EntityKind::Application | EntityKind::Scope => false,
            })
            .filter_map(|row| key(row.get(columns::ID)).cloned())
            .take(limit)
            .collect();

        if kind == EntityKind::Authorization {
            let pruned: BTreeSet<&KeyValue> = eligible.iter().collect();
            let table = self.table_mut(EntityKind::Token);
            table.rows.retain(|_, token| {
                key(token.get(columns::AUTHORIZATION_ID)).is_none_or(|id| !pruned.contains(id))
            });
        }

        let table = self.table_mut(kind);
        for id in &eligible {
            table.rows.remove(id);
        }
        eligible.len() as u64
    }

    fn token_matches(&self, kind: EntityKind, id: &KeyValue, expected_token: &str) -> bool {
        self.table(kind)
            .and_then(|table| table.rows.get(id))
            .is_some_and(|row| text(row, columns::CONCURRENCY_TOKEN) == Some(expected_token))
    }

    fn check_unique(
        &self,
        kind: EntityKind,
        row: &Row,
        updating: Option<&KeyValue>,
    ) -> Result<(), MemoryError> {
        let Some(column) = kind.unique_column() else {
            return Ok(());
        };
        let Some(value) = text(row, column) else {
            return Ok(());
        };

        let taken = self.rows(kind).any(|other| {
            text(other, column) == Some(value) && key(other.get(columns::ID)) != updating
        });
        if taken {
            return Err(MemoryError::UniqueViolation {
                table: kind.table(),
                column,
                value: value.to_string(),
            });
        }
        Ok(())
    }

    /// Identifiers of the `dependent` rows whose `column` references `id`.
    fn referencing(&self, dependent: EntityKind, column: &str, id: &KeyValue) -> BTreeSet<KeyValue> {
        self.rows(dependent)
            .filter(|row| key(row.get(column)) == Some(id))
            .filter_map(|row| key(row.get(columns::ID)).cloned())
            .collect()
    }

    /// Rows referencing `id`, grouped by kind.
    fn dependents(&self, kind: EntityKind, id: &KeyValue) -> BTreeMap<EntityKind, BTreeSet<KeyValue>> {
        let mut dependents = BTreeMap::new();
        match kind {
            EntityKind::Application => {
                let authorizations =
                    self.referencing(EntityKind::Authorization, columns::APPLICATION_ID, id);
                let mut tokens = self.referencing(EntityKind::Token, columns::APPLICATION_ID, id);
                for authorization in &authorizations {
                    tokens.extend(self.referencing(
                        EntityKind::Token,
                        columns::AUTHORIZATION_ID,
                        authorization,
                    ));
                }
                dependents.insert(EntityKind::Authorization, authorizations);
                dependents.insert(EntityKind::Token, tokens);
            }
            EntityKind::Authorization => {
                dependents.insert(
                    EntityKind::Token,
                    self.referencing(EntityKind::Token, columns::AUTHORIZATION_ID, id),
                );
            }
            EntityKind::Scope | EntityKind::Token => {}
        }
        dependents
    }

    fn token_is_prunable(&self, token: &Row, criteria: &PruneCriteria) -> bool {
        if !created_before(token, criteria) {
            return false;
        }

        let status_is_final = text(token, columns::STATUS)
            .is_some_and(|status| status != statuses::INACTIVE && status != statuses::VALID);
        let authorization_is_invalid = key(token.get(columns::AUTHORIZATION_ID))
            .and_then(|id| self.table(EntityKind::Authorization)?.rows.get(id))
            .and_then(|authorization| text(authorization, columns::STATUS))
            .is_some_and(|status| status != statuses::VALID);
        let expired = timestamp(token, columns::EXPIRATION_DATE).is_some_and(|at| at < criteria.now);

        status_is_final || authorization_is_invalid || expired
    }

    fn authorization_is_prunable(&self, authorization: &Row, criteria: &PruneCriteria) -> bool {
        if !created_before(authorization, criteria) {
            return false;
        }

        let status_is_invalid =
            text(authorization, columns::STATUS).is_some_and(|status| status != statuses::VALID);
        let is_ad_hoc = text(authorization, columns::TYPE) == Some(authorization_types::AD_HOC);
        let has_tokens = key(authorization.get(columns::ID)).is_some_and(|id| {
            self.rows(EntityKind::Token)
                .any(|token| key(token.get(columns::AUTHORIZATION_ID)) == Some(id))
        });

        status_is_invalid || (is_ad_hoc && !has_tokens)
    }
}

fn created_before(row: &Row, criteria: &PruneCriteria) -> bool {
    timestamp(row, columns::CREATION_DATE).is_some_and(|at| at < criteria.cutoff)
}

fn text<'a>(row: &'a Row, column: &str) -> Option<&'a str> {
    match row.get(column) {
        ColumnValue::Text(value) => Some(value),
        _ => None,
    }
}

fn timestamp(row: &Row, column: &str) -> Option<time::OffsetDateTime> {
    match row.get(column) {
        ColumnValue::Timestamp(value) => Some(*value),
        _ => None,
    }
}

fn key(value: &ColumnValue) -> Option<&KeyValue> {
    match value {
        ColumnValue::Key(id) => Some(id),
        _ => None,
    }
}
