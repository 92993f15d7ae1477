//! SQL generation.
//!
//! Every statement is built as text with `$n` placeholders plus a list of
//! typed parameters. Identifiers are always quoted and values are always
//! bound, never inlined.

use authstore::query::{Filter, Predicate, RowQuery};
use authstore::schema::ColumnType;
use authstore::{
    ColumnValue, Direction, EntityKey, EntityKind, KeyKind, KeyValue, PruneCriteria, Row,
    StoreError, StoreResult, authorization_types, columns, statuses,
};
use sqlx_core::query::{Query, query};
use sqlx_postgres::{PgArguments, Postgres};
use time::OffsetDateTime;
use uuid::Uuid;

/// A bound parameter. Nulls keep their column type so PostgreSQL can infer
/// the placeholder type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Text(Option<String>),
    Int(Option<i64>),
    Uuid(Option<Uuid>),
    Timestamp(Option<OffsetDateTime>),
}

/// SQL text and its parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl Statement {
    fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    fn push(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    /// Appends a placeholder for `param`.
    fn bind(&mut self, param: SqlParam) {
        self.params.push(param);
        self.sql.push_str(&format!("${}", self.params.len()));
    }

    /// Prepares the statement for execution.
    pub(crate) fn query(&self) -> Query<'_, Postgres, PgArguments> {
        self.params
            .iter()
            .fold(query(&self.sql), |q, param| match param {
                SqlParam::Text(v) => q.bind(v.clone()),
                SqlParam::Int(v) => q.bind(*v),
                SqlParam::Uuid(v) => q.bind(*v),
                SqlParam::Timestamp(v) => q.bind(*v),
            })
    }
}

/// Quotes an identifier.
pub(crate) fn ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_list(kind: EntityKind) -> String {
    kind.columns()
        .iter()
        .map(|column| ident(column.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn column_type(kind: EntityKind, name: &str) -> StoreResult<ColumnType> {
    kind.column(name)
        .map(|column| column.ty)
        .ok_or_else(|| StoreError::validation(format!("Unknown column {kind}.{name}")))
}

/// Converts a column value into a parameter of the column's SQL type.
pub(crate) fn param(key: KeyKind, ty: ColumnType, value: &ColumnValue) -> StoreResult<SqlParam> {
    match ty {
        ColumnType::Key | ColumnType::Reference(_) => key_param(key, value),
        ColumnType::Text(_) => match value {
            ColumnValue::Null => Ok(SqlParam::Text(None)),
            ColumnValue::Text(text) => Ok(SqlParam::Text(Some(text.clone()))),
            ColumnValue::Key(id) => Ok(SqlParam::Text(Some(id.to_string()))),
            ColumnValue::Timestamp(_) => {
                Err(StoreError::validation("Timestamp bound to a text column"))
            }
        },
        ColumnType::Timestamp => match value {
            ColumnValue::Null => Ok(SqlParam::Timestamp(None)),
            ColumnValue::Timestamp(at) => Ok(SqlParam::Timestamp(Some(*at))),
            _ => Err(StoreError::validation(
                "Non-timestamp value bound to a timestamp column",
            )),
        },
    }
}

fn key_param(key: KeyKind, value: &ColumnValue) -> StoreResult<SqlParam> {
    let id = match value {
        ColumnValue::Null => {
            return Ok(match key {
                KeyKind::Text => SqlParam::Text(None),
                KeyKind::Bigint => SqlParam::Int(None),
                KeyKind::Uuid => SqlParam::Uuid(None),
            });
        }
        ColumnValue::Key(id) => id.clone(),
        ColumnValue::Text(text) => KeyValue::Text(text.clone()),
        ColumnValue::Timestamp(_) => {
            return Err(StoreError::validation("Timestamp bound to a key column"));
        }
    };
    key_value_param(key, id)
}

fn key_value_param(key: KeyKind, id: KeyValue) -> StoreResult<SqlParam> {
    Ok(match key {
        KeyKind::Text => SqlParam::Text(Some(String::from_key_value(id)?)),
        KeyKind::Bigint => SqlParam::Int(Some(i64::from_key_value(id)?)),
        KeyKind::Uuid => SqlParam::Uuid(Some(Uuid::from_key_value(id)?)),
    })
}

fn count_param(value: u64) -> SqlParam {
    SqlParam::Int(Some(i64::try_from(value).unwrap_or(i64::MAX)))
}

/// `INSERT ... RETURNING` every column. A null `id` is left to the identity
/// default.
pub fn insert(kind: EntityKind, key: KeyKind, row: &Row) -> StoreResult<Statement> {
    let targets: Vec<_> = kind
        .columns()
        .iter()
        .filter(|column| column.name != columns::ID || !row.get(columns::ID).is_null())
        .collect();

    let mut stmt = Statement::new(format!("INSERT INTO {} (", ident(kind.table())));
    let names: Vec<_> = targets.iter().map(|column| ident(column.name)).collect();
    stmt.push(&names.join(", "));
    stmt.push(") VALUES (");
    for (i, column) in targets.iter().enumerate() {
        if i > 0 {
            stmt.push(", ");
        }
        stmt.bind(param(key, column.ty, row.get(column.name))?);
    }
    stmt.push(&format!(") RETURNING {}", column_list(kind)));
    Ok(stmt)
}

/// Token-conditioned `UPDATE` of every non-key column.
pub fn update(
    kind: EntityKind,
    key: KeyKind,
    id: &KeyValue,
    expected_token: &str,
    row: &Row,
) -> StoreResult<Statement> {
    let mut stmt = Statement::new(format!("UPDATE {} SET ", ident(kind.table())));
    let assignments = kind
        .columns()
        .iter()
        .filter(|column| column.name != columns::ID);
    for (i, column) in assignments.enumerate() {
        if i > 0 {
            stmt.push(", ");
        }
        stmt.push(&format!("{} = ", ident(column.name)));
        stmt.bind(param(key, column.ty, row.get(column.name))?);
    }
    push_token_match(&mut stmt, key, id, expected_token)?;
    Ok(stmt)
}

fn push_token_match(
    stmt: &mut Statement,
    key: KeyKind,
    id: &KeyValue,
    expected_token: &str,
) -> StoreResult<()> {
    stmt.push(&format!(" WHERE {} = ", ident(columns::ID)));
    stmt.bind(key_value_param(key, id.clone())?);
    stmt.push(&format!(" AND {} = ", ident(columns::CONCURRENCY_TOKEN)));
    stmt.bind(SqlParam::Text(Some(expected_token.to_string())));
    Ok(())
}

/// Locks the row if its concurrency token still matches.
pub fn lock_row(
    kind: EntityKind,
    key: KeyKind,
    id: &KeyValue,
    expected_token: &str,
) -> StoreResult<Statement> {
    let mut stmt = Statement::new(format!("SELECT 1 FROM {}", ident(kind.table())));
    push_token_match(&mut stmt, key, id, expected_token)?;
    stmt.push(" FOR UPDATE");
    Ok(stmt)
}

/// Deletes a single row by identifier.
pub fn delete_row(kind: EntityKind, key: KeyKind, id: &KeyValue) -> StoreResult<Statement> {
    let mut stmt = Statement::new(format!(
        "DELETE FROM {} WHERE {} = ",
        ident(kind.table()),
        ident(columns::ID)
    ));
    stmt.bind(key_value_param(key, id.clone())?);
    Ok(stmt)
}

/// `(kind, condition on $1)` pairs selecting the rows that reference a row
/// of `kind`, tokens first.
fn dependent_conditions(kind: EntityKind) -> Vec<(EntityKind, String)> {
    let tokens_of_authorization = format!("{} = $1", ident(columns::AUTHORIZATION_ID));
    match kind {
        EntityKind::Application => vec![
            (
                EntityKind::Token,
                format!(
                    "{app} = $1 OR {authz} IN (SELECT {id} FROM {table} WHERE {app} = $1)",
                    app = ident(columns::APPLICATION_ID),
                    authz = ident(columns::AUTHORIZATION_ID),
                    id = ident(columns::ID),
                    table = ident(EntityKind::Authorization.table()),
                ),
            ),
            (
                EntityKind::Authorization,
                format!("{} = $1", ident(columns::APPLICATION_ID)),
            ),
        ],
        EntityKind::Authorization => vec![(EntityKind::Token, tokens_of_authorization)],
        EntityKind::Scope | EntityKind::Token => Vec::new(),
    }
}

/// Counts the rows referencing `id`, or `None` if `kind` cannot be
/// referenced.
pub fn count_dependents(
    kind: EntityKind,
    key: KeyKind,
    id: &KeyValue,
) -> StoreResult<Option<Statement>> {
    let conditions = dependent_conditions(kind);
    if conditions.is_empty() {
        return Ok(None);
    }
    let counts: Vec<_> = conditions
        .iter()
        .map(|(dependent, condition)| {
            format!(
                "(SELECT COUNT(*) FROM {} WHERE {condition})",
                ident(dependent.table())
            )
        })
        .collect();

    let mut stmt = Statement::new(format!("SELECT ({})::BIGINT", counts.join(" + ")));
    stmt.params.push(key_value_param(key, id.clone())?);
    Ok(Some(stmt))
}

/// Deletes the rows referencing `id`, tokens first.
pub fn delete_dependents(
    kind: EntityKind,
    key: KeyKind,
    id: &KeyValue,
) -> StoreResult<Vec<Statement>> {
    dependent_conditions(kind)
        .into_iter()
        .map(|(dependent, condition)| {
            let mut stmt = Statement::new(format!(
                "DELETE FROM {} WHERE {condition}",
                ident(dependent.table())
            ));
            stmt.params.push(key_value_param(key, id.clone())?);
            Ok(stmt)
        })
        .collect()
}

fn push_filter(
    stmt: &mut Statement,
    kind: EntityKind,
    key: KeyKind,
    filter: &Filter,
) -> StoreResult<()> {
    for (i, condition) in filter.conditions().iter().enumerate() {
        stmt.push(if i == 0 { " WHERE " } else { " AND " });
        let ty = column_type(kind, condition.column)?;
        let column = ident(condition.column);

        let comparison = |stmt: &mut Statement, op: &str, value: &ColumnValue| {
            stmt.push(&format!("{column} {op} "));
            stmt.bind(param(key, ty, value)?);
            Ok::<_, StoreError>(())
        };
        match &condition.predicate {
            Predicate::Eq(value) => comparison(stmt, "=", value)?,
            Predicate::Ne(value) => comparison(stmt, "<>", value)?,
            Predicate::Lt(value) => comparison(stmt, "<", value)?,
            Predicate::Le(value) => comparison(stmt, "<=", value)?,
            Predicate::Gt(value) => comparison(stmt, ">", value)?,
            Predicate::Ge(value) => comparison(stmt, ">=", value)?,
            Predicate::IsNull => stmt.push(&format!("{column} IS NULL")),
            Predicate::IsNotNull => stmt.push(&format!("{column} IS NOT NULL")),
            Predicate::Contains(needle) => {
                stmt.push(&format!("{column} LIKE "));
                stmt.bind(SqlParam::Text(Some(format!("%{}%", escape_like(needle)))));
                stmt.push(" ESCAPE '\\'");
            }
            Predicate::In(values) if values.is_empty() => stmt.push("FALSE"),
            Predicate::In(values) => {
                stmt.push(&format!("{column} IN ("));
                for (j, value) in values.iter().enumerate() {
                    if j > 0 {
                        stmt.push(", ");
                    }
                    stmt.bind(param(key, ty, value)?);
                }
                stmt.push(")");
            }
        }
    }
    Ok(())
}

/// Escapes `LIKE` wildcards with a backslash.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Ordered, windowed `SELECT`.
pub fn select(kind: EntityKind, key: KeyKind, query: &RowQuery) -> StoreResult<Statement> {
    let mut stmt = Statement::new(format!(
        "SELECT {} FROM {}",
        column_list(kind),
        ident(kind.table())
    ));
    push_filter(&mut stmt, kind, key, &query.filter)?;

    let order: Vec<_> = query
        .order
        .iter()
        .map(|term| {
            let direction = match term.direction {
                Direction::Asc => "ASC",
                Direction::Desc => "DESC",
            };
            format!("{} {direction}", ident(term.column))
        })
        .collect();
    if !order.is_empty() {
        stmt.push(&format!(" ORDER BY {}", order.join(", ")));
    }
    if let Some(limit) = query.limit {
        stmt.push(" LIMIT ");
        stmt.bind(count_param(limit));
    }
    if query.offset > 0 {
        stmt.push(" OFFSET ");
        stmt.bind(count_param(query.offset));
    }
    Ok(stmt)
}

/// `SELECT COUNT(*)` over a filter.
pub fn count(kind: EntityKind, key: KeyKind, filter: &Filter) -> StoreResult<Statement> {
    let mut stmt = Statement::new(format!("SELECT COUNT(*) FROM {}", ident(kind.table())));
    push_filter(&mut stmt, kind, key, filter)?;
    Ok(stmt)
}

/// Deletes one batch of prunable rows. Rows locked by concurrent writers are
/// skipped and picked up by a later batch. Pruned authorizations take their
/// tokens with them in the same statement.
///
/// Returns `None` for kinds that are never pruned.
pub fn prune_batch(kind: EntityKind, criteria: &PruneCriteria) -> Option<Statement> {
    let tokens = ident(EntityKind::Token.table());
    let authorizations = ident(EntityKind::Authorization.table());
    let id = ident(columns::ID);
    let status = ident(columns::STATUS);
    let created = ident(columns::CREATION_DATE);
    let authorization_id = ident(columns::AUTHORIZATION_ID);

    let (sql, params) = match kind {
        EntityKind::Token => (
            format!(
                "WITH batch AS (\
                 SELECT t.{id} FROM {tokens} t \
                 LEFT JOIN {authorizations} a ON a.{id} = t.{authorization_id} \
                 WHERE t.{created} < $1 \
                 AND ((t.{status} <> '{inactive}' AND t.{status} <> '{valid}') \
                 OR a.{status} <> '{valid}' \
                 OR t.{expires} < $2) \
                 ORDER BY t.{id} LIMIT $3 FOR UPDATE OF t SKIP LOCKED) \
                 DELETE FROM {tokens} WHERE {id} IN (SELECT {id} FROM batch)",
                inactive = statuses::INACTIVE,
                valid = statuses::VALID,
                expires = ident(columns::EXPIRATION_DATE),
            ),
            vec![
                SqlParam::Timestamp(Some(criteria.cutoff)),
                SqlParam::Timestamp(Some(criteria.now)),
                count_param(criteria.batch_size),
            ],
        ),
        EntityKind::Authorization => (
            format!(
                "WITH batch AS (\
                 SELECT a.{id} FROM {authorizations} a \
                 WHERE a.{created} < $1 \
                 AND (a.{status} <> '{valid}' \
                 OR (a.{ty} = '{ad_hoc}' AND NOT EXISTS \
                 (SELECT 1 FROM {tokens} t WHERE t.{authorization_id} = a.{id}))) \
                 ORDER BY a.{id} LIMIT $2 FOR UPDATE SKIP LOCKED), \
                 attached AS (DELETE FROM {tokens} \
                 WHERE {authorization_id} IN (SELECT {id} FROM batch)) \
                 DELETE FROM {authorizations} WHERE {id} IN (SELECT {id} FROM batch)",
                valid = statuses::VALID,
                ty = ident(columns::TYPE),
                ad_hoc = authorization_types::AD_HOC,
            ),
            vec![
                SqlParam::Timestamp(Some(criteria.cutoff)),
                count_param(criteria.batch_size),
            ],
        ),
        EntityKind::Application | EntityKind::Scope => return None,
    };
    Some(Statement { sql, params })
}

#[cfg(test)]
mod tests {
    use super::*;
    use authstore::OrderBy;
    use time::macros::datetime;

    #[test]
    fn test_insert_omits_null_identity() {
        let row = Row::new().with(columns::NAME, "api");
        let stmt = insert(EntityKind::Scope, KeyKind::Bigint, &row).unwrap();

        assert!(stmt.sql.starts_with(r#"INSERT INTO "authstore_scopes" ("concurrency_token""#));
        assert!(stmt.sql.contains(r#"RETURNING "id", "concurrency_token""#));
        assert_eq!(stmt.params.len(), EntityKind::Scope.columns().len() - 1);
        assert!(stmt.params.contains(&SqlParam::Text(Some("api".into()))));
    }

    #[test]
    fn test_insert_binds_supplied_identity_in_key_type() {
        let row = Row::new().with(columns::ID, KeyValue::Text("42".into()));
        let stmt = insert(EntityKind::Scope, KeyKind::Bigint, &row).unwrap();
        assert_eq!(stmt.params[0], SqlParam::Int(Some(42)));

        let err = insert(EntityKind::Scope, KeyKind::Uuid, &row).unwrap_err();
        assert!(err.is_validation_error());
    }

    #[test]
    fn test_typed_nulls() {
        let row = Row::new().with(columns::ID, KeyValue::Uuid(Uuid::nil()));
        let stmt = insert(EntityKind::Token, KeyKind::Uuid, &row).unwrap();

        assert!(stmt.params.contains(&SqlParam::Uuid(None)));
        assert!(stmt.params.contains(&SqlParam::Timestamp(None)));
        assert!(stmt.params.contains(&SqlParam::Text(None)));
    }

    #[test]
    fn test_update_is_conditioned_on_token() {
        let id = KeyValue::Int(7);
        let stmt = update(EntityKind::Scope, KeyKind::Bigint, &id, "old", &Row::new()).unwrap();

        let assignments = EntityKind::Scope.columns().len() - 1;
        assert!(stmt.sql.ends_with(&format!(
            r#"WHERE "id" = ${} AND "concurrency_token" = ${}"#,
            assignments + 1,
            assignments + 2
        )));
        assert!(!stmt.sql.contains(r#"SET "id""#));
        assert_eq!(stmt.params[assignments], SqlParam::Int(Some(7)));
        assert_eq!(
            stmt.params[assignments + 1],
            SqlParam::Text(Some("old".into()))
        );
    }

    #[test]
    fn test_select_with_filter_order_and_window() {
        let filter = Filter::all()
            .eq(columns::SUBJECT, "alice")
            .is_null(columns::TYPE)
            .is_in(columns::STATUS, ["valid", "inactive"]);
        let query = RowQuery::new(
            EntityKind::Authorization,
            filter,
            vec![OrderBy::desc(columns::CREATION_DATE)],
        )
        .unwrap()
        .window(10, Some(5));

        let stmt = select(EntityKind::Authorization, KeyKind::Text, &query).unwrap();
        assert!(stmt.sql.ends_with(
            r#" WHERE "subject" = $1 AND "type" IS NULL AND "status" IN ($2, $3) ORDER BY "creation_date" DESC, "id" ASC LIMIT $4 OFFSET $5"#
        ));
        assert_eq!(stmt.params[3], SqlParam::Int(Some(5)));
        assert_eq!(stmt.params[4], SqlParam::Int(Some(10)));
    }

    #[test]
    fn test_contains_escapes_wildcards() {
        let filter = Filter::all().contains(columns::REDIRECT_URIS, "\"a_b%\"");
        let stmt = count(EntityKind::Application, KeyKind::Text, &filter).unwrap();

        assert!(stmt.sql.ends_with(r#""redirect_uris" LIKE $1 ESCAPE '\'"#));
        assert_eq!(stmt.params, [SqlParam::Text(Some(r#"%"a\_b\%"%"#.into()))]);
    }

    #[test]
    fn test_empty_in_matches_nothing() {
        let filter = Filter::all().is_in(columns::NAME, Vec::<String>::new());
        let stmt = count(EntityKind::Scope, KeyKind::Text, &filter).unwrap();
        assert!(stmt.sql.ends_with(" WHERE FALSE"));
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_reference_filters_use_key_type() {
        let filter = Filter::all().eq(columns::AUTHORIZATION_ID, KeyValue::Int(3));
        let stmt = count(EntityKind::Token, KeyKind::Text, &filter).unwrap();
        assert_eq!(stmt.params, [SqlParam::Text(Some("3".into()))]);
    }

    #[test]
    fn test_dependents_of_application_include_authorization_tokens() {
        let id = KeyValue::Int(1);
        let stmt = count_dependents(EntityKind::Application, KeyKind::Bigint, &id)
            .unwrap()
            .unwrap();
        assert!(stmt.sql.contains(r#""authorization_id" IN (SELECT "id" FROM "authstore_authorizations""#));
        assert_eq!(stmt.params, [SqlParam::Int(Some(1))]);

        let deletes = delete_dependents(EntityKind::Application, KeyKind::Bigint, &id).unwrap();
        assert_eq!(deletes.len(), 2);
        assert!(deletes[0].sql.starts_with(r#"DELETE FROM "authstore_tokens""#));
        assert!(deletes[1].sql.starts_with(r#"DELETE FROM "authstore_authorizations""#));

        assert!(count_dependents(EntityKind::Scope, KeyKind::Bigint, &id).unwrap().is_none());
    }

    #[test]
    fn test_prune_statements() {
        let criteria = PruneCriteria {
            cutoff: datetime!(2025-01-01 0:00 UTC),
            now: datetime!(2025-01-15 0:00 UTC),
            batch_size: 500,
        };

        let tokens = prune_batch(EntityKind::Token, &criteria).unwrap();
        assert!(tokens.sql.contains("SKIP LOCKED"));
        assert!(tokens.sql.contains(r#"t."expiration_date" < $2"#));
        assert_eq!(tokens.params[2], SqlParam::Int(Some(500)));

        let authorizations = prune_batch(EntityKind::Authorization, &criteria).unwrap();
        assert!(authorizations.sql.contains("'ad-hoc'"));
        assert!(authorizations.sql.contains(r#"DELETE FROM "authstore_tokens""#));
        assert_eq!(authorizations.params[1], SqlParam::Int(Some(500)));

        assert!(prune_batch(EntityKind::Scope, &criteria).is_none());
    }

    #[test]
    fn test_identifiers_are_quoted() {
        assert_eq!(ident("type"), r#""type""#);
        assert_eq!(ident(r#"a"b"#), r#""a""b""#);
    }
}
