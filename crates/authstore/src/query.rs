//! Filter, ordering and windowing of entity queries.
//!
//! Conditions follow SQL semantics: any comparison against `NULL` is unknown
//! and therefore never matches, except for [`Predicate::IsNull`] and
//! [`Predicate::IsNotNull`]. Every query is ordered with a final `id ASC`
//! tie-break so that paging is deterministic.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::schema::{ColumnValue, EntityKind, Row, columns};

/// A test applied to a single column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Eq(ColumnValue),
    Ne(ColumnValue),
    Lt(ColumnValue),
    Le(ColumnValue),
    Gt(ColumnValue),
    Ge(ColumnValue),
    IsNull,
    IsNotNull,
    /// Substring match on a text column (`LIKE '%value%'`).
    Contains(String),
    /// Membership in a set of values.
    In(Vec<ColumnValue>),
}

impl Predicate {
    /// Evaluates the predicate against a column value.
    #[must_use]
    pub fn matches(&self, value: &ColumnValue) -> bool {
        let compare = |other: &ColumnValue| value.partial_compare(other);
        match self {
            Self::Eq(other) => compare(other) == Some(Ordering::Equal),
            Self::Ne(other) => matches!(compare(other), Some(o) if o != Ordering::Equal),
            Self::Lt(other) => compare(other) == Some(Ordering::Less),
            Self::Le(other) => matches!(compare(other), Some(Ordering::Less | Ordering::Equal)),
            Self::Gt(other) => compare(other) == Some(Ordering::Greater),
            Self::Ge(other) => {
                matches!(compare(other), Some(Ordering::Greater | Ordering::Equal))
            }
            Self::IsNull => value.is_null(),
            Self::IsNotNull => !value.is_null(),
            Self::Contains(needle) => match value {
                ColumnValue::Text(text) => text.contains(needle.as_str()),
                _ => false,
            },
            Self::In(values) => values
                .iter()
                .any(|other| compare(other) == Some(Ordering::Equal)),
        }
    }
}

/// A predicate bound to a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub column: &'static str,
    pub predicate: Predicate,
}

/// A conjunction of conditions. An empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    /// Creates a filter matching every row.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Adds a condition.
    #[must_use]
    pub fn and(mut self, column: &'static str, predicate: Predicate) -> Self {
        self.conditions.push(Condition { column, predicate });
        self
    }

    /// Adds `column = value`.
    #[must_use]
    pub fn eq(self, column: &'static str, value: impl Into<ColumnValue>) -> Self {
        self.and(column, Predicate::Eq(value.into()))
    }

    /// Adds `column <> value`.
    #[must_use]
    pub fn ne(self, column: &'static str, value: impl Into<ColumnValue>) -> Self {
        self.and(column, Predicate::Ne(value.into()))
    }

    /// Adds `column < value`.
    #[must_use]
    pub fn lt(self, column: &'static str, value: impl Into<ColumnValue>) -> Self {
        self.and(column, Predicate::Lt(value.into()))
    }

    /// Adds `column > value`.
    #[must_use]
    pub fn gt(self, column: &'static str, value: impl Into<ColumnValue>) -> Self {
        self.and(column, Predicate::Gt(value.into()))
    }

    /// Adds `column IS NULL`.
    #[must_use]
    pub fn is_null(self, column: &'static str) -> Self {
        self.and(column, Predicate::IsNull)
    }

    /// Adds `column LIKE '%needle%'`.
    #[must_use]
    pub fn contains(self, column: &'static str, needle: impl Into<String>) -> Self {
        self.and(column, Predicate::Contains(needle.into()))
    }

    /// Adds `column IN (values...)`.
    #[must_use]
    pub fn is_in<V: Into<ColumnValue>>(
        self,
        column: &'static str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.and(column, Predicate::In(values))
    }

    /// Conditions in insertion order.
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Returns `true` if every condition holds for the row.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        self.conditions
            .iter()
            .all(|condition| condition.predicate.matches(row.get(condition.column)))
    }

    /// Checks that every referenced column exists on the kind's table.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the first unknown column.
    pub fn validate(&self, kind: EntityKind) -> StoreResult<()> {
        for condition in &self.conditions {
            ensure_column(kind, condition.column)?;
        }
        Ok(())
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// A single ordering term. `NULL`s sort last in ascending order and first in
/// descending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub column: &'static str,
    pub direction: Direction,
}

impl OrderBy {
    #[must_use]
    pub fn asc(column: &'static str) -> Self {
        Self {
            column,
            direction: Direction::Asc,
        }
    }

    #[must_use]
    pub fn desc(column: &'static str) -> Self {
        Self {
            column,
            direction: Direction::Desc,
        }
    }

    /// Compares two rows on this term.
    #[must_use]
    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        let (left, right) = (a.get(self.column), b.get(self.column));
        let ordering = match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => left.partial_compare(right).unwrap_or(Ordering::Equal),
        };
        match self.direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        }
    }
}

/// A caller-facing query: filter, ordering and a fixed `skip`/`take` window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityQuery {
    pub filter: Filter,
    pub order: Vec<OrderBy>,
    pub skip: u64,
    pub take: Option<u64>,
}

impl EntityQuery {
    /// Query matching `filter`, ordered by id.
    #[must_use]
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order.push(order);
        self
    }

    #[must_use]
    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    #[must_use]
    pub fn take(mut self, take: u64) -> Self {
        self.take = Some(take);
        self
    }
}

/// A query as handed to a session: validated, with a deterministic order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowQuery {
    pub filter: Filter,
    pub order: Vec<OrderBy>,
    pub offset: u64,
    pub limit: Option<u64>,
}

impl RowQuery {
    /// Builds a row query for `kind`, appending an `id ASC` tie-break.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the filter or ordering names a column the
    /// table does not have.
    pub fn new(kind: EntityKind, filter: Filter, mut order: Vec<OrderBy>) -> StoreResult<Self> {
        filter.validate(kind)?;
        for term in &order {
            ensure_column(kind, term.column)?;
        }
        if order.last().map(|term| term.column) != Some(columns::ID) {
            order.push(OrderBy::asc(columns::ID));
        }
        Ok(Self {
            filter,
            order,
            offset: 0,
            limit: None,
        })
    }

    /// Restricts the query to a window.
    #[must_use]
    pub fn window(mut self, offset: u64, limit: Option<u64>) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    /// Compares two rows on the full ordering.
    #[must_use]
    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        self.order
            .iter()
            .map(|term| term.compare(a, b))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

fn ensure_column(kind: EntityKind, column: &str) -> StoreResult<()> {
    if kind.column(column).is_none() {
        return Err(StoreError::validation(format!(
            "Unknown column '{column}' for {kind} queries"
        )));
    }
    Ok(())
}
