//! Table and index definitions.

use authstore::schema::ColumnType;
use authstore::{EntityKind, KeyKind, columns};
use sqlx_core::executor::Executor;
use sqlx_core::raw_sql::raw_sql;
use sqlx_postgres::{PgConnection, PgPool};
use tracing::{info, instrument};

use crate::error::{PostgresError, Result};
use crate::sql::ident;

/// Composite lookup indexes, beyond the primary and unique keys.
const LOOKUP_INDEXES: &[(EntityKind, &[&str])] = &[
    (
        EntityKind::Authorization,
        &[
            columns::APPLICATION_ID,
            columns::STATUS,
            columns::SUBJECT,
            columns::TYPE,
        ],
    ),
    (
        EntityKind::Token,
        &[
            columns::APPLICATION_ID,
            columns::STATUS,
            columns::SUBJECT,
            columns::TYPE,
        ],
    ),
    (EntityKind::Token, &[columns::AUTHORIZATION_ID]),
];

fn column_definition(key: KeyKind, name: &str, ty: ColumnType) -> String {
    let sql_type = match ty {
        ColumnType::Key if key == KeyKind::Bigint => {
            return format!(
                "{} BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY",
                ident(name)
            );
        }
        ColumnType::Key => return format!("{} {} PRIMARY KEY", ident(name), key.sql_type()),
        ColumnType::Reference(target) => format!(
            "{} REFERENCES {} ({})",
            key.sql_type(),
            ident(target.table()),
            ident(columns::ID)
        ),
        ColumnType::Text(Some(limit)) => format!("VARCHAR({limit})"),
        ColumnType::Text(None) => "TEXT".to_string(),
        ColumnType::Timestamp => "TIMESTAMPTZ".to_string(),
    };
    format!("{} {sql_type}", ident(name))
}

/// DDL creating the four tables and their indexes. Every statement is
/// idempotent.
///
/// References use the default `NO ACTION` rule; cascading deletes are issued
/// explicitly so the delete policy stays configurable.
#[must_use]
pub fn schema_sql(key: KeyKind) -> String {
    let mut sql = String::new();

    for kind in EntityKind::ALL {
        let definitions: Vec<_> = kind
            .columns()
            .iter()
            .map(|column| format!("    {}", column_definition(key, column.name, column.ty)))
            .collect();
        sql.push_str(&format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n);\n",
            ident(kind.table()),
            definitions.join(",\n")
        ));

        if let Some(unique) = kind.unique_column() {
            sql.push_str(&format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({});\n",
                ident(&format!("{}_{unique}_key", kind.table())),
                ident(kind.table()),
                ident(unique)
            ));
        }
    }

    for (kind, index_columns) in LOOKUP_INDEXES {
        let quoted: Vec<_> = index_columns.iter().map(|c| ident(c)).collect();
        sql.push_str(&format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({});\n",
            ident(&format!("{}_{}_idx", kind.table(), index_columns.join("_"))),
            ident(kind.table()),
            quoted.join(", ")
        ));
    }

    sql
}

/// Applies [`schema_sql`] in a single transaction.
///
/// # Errors
///
/// Returns an error if any statement fails; nothing is applied in that case.
#[instrument(skip(pool))]
pub async fn apply_schema(pool: &PgPool, key: KeyKind) -> Result<()> {
    let mut tx = pool.begin().await?;
    execute_script(&mut *tx, &schema_sql(key)).await?;
    tx.commit().await?;

    info!(key_type = key.sql_type(), "Schema applied");
    Ok(())
}

async fn execute_script(executor: &mut PgConnection, script: &str) -> Result<()> {
    executor
        .execute(raw_sql(script))
        .await
        .map_err(|e| PostgresError::Schema(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bigint_keys_use_identity() {
        let sql = schema_sql(KeyKind::Bigint);
        assert!(sql.contains(
            r#""id" BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY"#
        ));
        assert!(sql.contains(
            r#""authorization_id" BIGINT REFERENCES "authstore_authorizations" ("id")"#
        ));
    }

    #[test]
    fn test_uuid_keys() {
        let sql = schema_sql(KeyKind::Uuid);
        assert!(sql.contains(r#""id" UUID PRIMARY KEY"#));
        assert!(!sql.contains("IDENTITY"));
    }

    #[test]
    fn test_tables_are_created_before_references() {
        let sql = schema_sql(KeyKind::Text);
        let position = |table: &str| {
            sql.find(&format!("CREATE TABLE IF NOT EXISTS \"{table}\""))
                .unwrap()
        };
        assert!(position("authstore_applications") < position("authstore_authorizations"));
        assert!(position("authstore_authorizations") < position("authstore_tokens"));
    }

    #[test]
    fn test_unique_and_lookup_indexes() {
        let sql = schema_sql(KeyKind::Text);
        assert!(sql.contains(
            r#"CREATE UNIQUE INDEX IF NOT EXISTS "authstore_applications_client_id_key" ON "authstore_applications" ("client_id");"#
        ));
        assert!(sql.contains(r#"ON "authstore_scopes" ("name")"#));
        assert!(sql.contains(r#"ON "authstore_tokens" ("reference_id")"#));
        assert!(sql.contains(
            r#"ON "authstore_authorizations" ("application_id", "status", "subject", "type")"#
        ));
        assert!(sql.contains(r#"ON "authstore_tokens" ("authorization_id")"#));
        assert_eq!(sql.matches("CREATE UNIQUE INDEX").count(), 3);
    }

    #[test]
    fn test_limited_text_columns() {
        let sql = schema_sql(KeyKind::Text);
        assert!(sql.contains(r#""client_id" VARCHAR(100)"#));
        assert!(sql.contains(r#""subject" VARCHAR(400)"#));
        assert!(sql.contains(r#""creation_date" TIMESTAMPTZ"#));
    }
}
