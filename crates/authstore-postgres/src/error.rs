//! Error types for the PostgreSQL backing context.

use authstore::StoreError;
use sqlx_core::error::Error as SqlxError;

/// PostgreSQL error code for unique violations (23505).
pub const PG_UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL error code for foreign key violations (23503).
pub const PG_FOREIGN_KEY_VIOLATION: &str = "23503";

/// Checks if a sqlx error has a specific PostgreSQL error code.
pub fn has_pg_error_code(err: &SqlxError, code: &str) -> bool {
    if let SqlxError::Database(db_err) = err {
        db_err.code().as_deref() == Some(code)
    } else {
        false
    }
}

/// Errors raised by the PostgreSQL backing context.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// A query or connection failed.
    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    /// The schema could not be applied.
    #[error("Schema error: {0}")]
    Schema(String),
}

impl PostgresError {
    /// Returns `true` if the statement violated a unique index.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::Database(e) if has_pg_error_code(e, PG_UNIQUE_VIOLATION))
    }

    /// Returns `true` if the statement violated a foreign key.
    #[must_use]
    pub fn is_foreign_key_violation(&self) -> bool {
        matches!(self, Self::Database(e) if has_pg_error_code(e, PG_FOREIGN_KEY_VIOLATION))
    }
}

impl From<PostgresError> for StoreError {
    fn from(err: PostgresError) -> Self {
        StoreError::backend(err)
    }
}

/// Result type alias for PostgreSQL operations.
pub type Result<T> = std::result::Result<T, PostgresError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_keeps_driver_error_as_source() {
        let err: StoreError = PostgresError::Database(SqlxError::PoolTimedOut).into();
        assert!(err.is_backend_error());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_non_database_errors_have_no_code() {
        let err = PostgresError::Database(SqlxError::PoolClosed);
        assert!(!err.is_unique_violation());
        assert!(!err.is_foreign_key_violation());
        assert!(PostgresError::Schema("boom".into()).to_string().contains("Schema"));
    }
}
