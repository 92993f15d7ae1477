//! Store error types.
//!
//! Every store operation reports failures through [`StoreError`]. Absence of
//! an entity is never an error: finders return `Ok(None)`.

use std::fmt;

use crate::schema::EntityKind;

/// Errors that can occur during store resolution and store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The resolver cannot map the requested type to a store.
    #[error("Unsupported entity type '{type_name}' for the {kind} store")]
    UnsupportedEntity {
        /// Fully qualified name of the requested type.
        type_name: &'static str,
        /// Store family the type was requested from.
        kind: EntityKind,
    },

    /// No backing context is bound, or the binding is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// The concurrency token supplied with an update or delete is stale,
    /// or the entity no longer exists.
    #[error("Concurrency conflict on {kind} '{id}': the entity was modified or removed")]
    ConcurrencyConflict {
        /// Kind of the entity being written.
        kind: EntityKind,
        /// Identifier of the entity being written.
        id: String,
    },

    /// A delete was blocked because other entities still reference the target.
    #[error("Referential conflict on {kind} '{id}': {dependents} dependent entities remain")]
    ReferentialConflict {
        /// Kind of the entity being deleted.
        kind: EntityKind,
        /// Identifier of the entity being deleted.
        id: String,
        /// Number of dependent rows that block the delete.
        dependents: u64,
    },

    /// A stored or supplied value is malformed.
    #[error("Validation error: {message}")]
    Validation {
        /// Description of the malformed value.
        message: String,
    },

    /// The backing store failed. The driver error is kept as the source.
    #[error("Backend error: {source}")]
    Backend {
        /// The unmodified driver error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl StoreError {
    /// Creates a new `UnsupportedEntity` error.
    #[must_use]
    pub fn unsupported_entity(type_name: &'static str, kind: EntityKind) -> Self {
        Self::UnsupportedEntity { type_name, kind }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `ConcurrencyConflict` error.
    #[must_use]
    pub fn concurrency_conflict(kind: EntityKind, id: impl fmt::Display) -> Self {
        Self::ConcurrencyConflict {
            kind,
            id: id.to_string(),
        }
    }

    /// Creates a new `ReferentialConflict` error.
    #[must_use]
    pub fn referential_conflict(kind: EntityKind, id: impl fmt::Display, dependents: u64) -> Self {
        Self::ReferentialConflict {
            kind,
            id: id.to_string(),
            dependents,
        }
    }

    /// Creates a new `Validation` error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Wraps a backend driver error without altering it.
    #[must_use]
    pub fn backend(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend {
            source: Box::new(source),
        }
    }

    /// Returns `true` for conflicts the caller may resolve by re-reading
    /// and retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }

    /// Returns `true` for concurrency or referential conflicts.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::ConcurrencyConflict { .. } | Self::ReferentialConflict { .. }
        )
    }

    /// Returns `true` if this is a `Configuration` error.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// Returns `true` if this is an `UnsupportedEntity` error.
    #[must_use]
    pub fn is_unsupported_entity(&self) -> bool {
        matches!(self, Self::UnsupportedEntity { .. })
    }

    /// Returns `true` if this is a `Validation` error.
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Returns `true` if the failure came from the backing store.
    #[must_use]
    pub fn is_backend_error(&self) -> bool {
        matches!(self, Self::Backend { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnsupportedEntity { .. } | Self::Configuration { .. } => {
                ErrorCategory::Configuration
            }
            Self::ConcurrencyConflict { .. } | Self::ReferentialConflict { .. } => {
                ErrorCategory::Conflict
            }
            Self::Validation { .. } => ErrorCategory::DataIntegrity,
            Self::Backend { .. } => ErrorCategory::Backend,
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Coarse error categories for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Caller or deployment misconfiguration; not retryable.
    Configuration,
    /// Optimistic-concurrency or referential conflict; caller-driven retry.
    Conflict,
    /// Malformed persisted data; needs repair.
    DataIntegrity,
    /// Backing store I/O failure.
    Backend,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configuration => "configuration",
            Self::Conflict => "conflict",
            Self::DataIntegrity => "data_integrity",
            Self::Backend => "backend",
        };
        f.write_str(name)
    }
}
