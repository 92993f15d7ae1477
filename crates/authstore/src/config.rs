//! Store configuration.
//!
//! # Example (TOML)
//!
//! ```toml
//! context = "postgres"
//! delete_policy = "restrict"
//!
//! [query]
//! page_size = 100
//!
//! [prune]
//! batch_size = 1000
//! batch_delay = "0s"
//! interval = "1h"
//! token_retention = "14d"
//! authorization_retention = "14d"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What happens to dependent rows when an application or authorization is
/// deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletePolicy {
    /// Refuse the delete while dependents exist.
    #[default]
    Restrict,
    /// Delete dependents in the same atomic write.
    Cascade,
}

/// Root store configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Name of the backing context factory to bind (`"memory"`, `"postgres"`).
    /// When unset, every store operation fails with a configuration error.
    pub context: Option<String>,

    /// Policy applied when deleting entities that still have dependents.
    pub delete_policy: DeletePolicy,

    /// Query settings.
    pub query: QueryConfig,

    /// Pruning settings.
    pub prune: PruneConfig,
}

/// Query settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Rows fetched per round trip when streaming query results.
    pub page_size: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { page_size: 100 }
    }
}

/// Pruning settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PruneConfig {
    /// Maximum rows removed per batch.
    pub batch_size: u64,

    /// Pause between batches, to bound lock pressure on busy stores.
    #[serde(with = "humantime_serde")]
    pub batch_delay: Duration,

    /// Interval between sweeps of the periodic pruning job.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Tokens created earlier than `now - token_retention` are eligible.
    #[serde(with = "humantime_serde")]
    pub token_retention: Duration,

    /// Authorizations created earlier than `now - authorization_retention`
    /// are eligible.
    #[serde(with = "humantime_serde")]
    pub authorization_retention: Duration,

    /// Skip tokens in the periodic job.
    pub disable_token_pruning: bool,

    /// Skip authorizations in the periodic job.
    pub disable_authorization_pruning: bool,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            batch_delay: Duration::ZERO,
            interval: Duration::from_secs(3600), // 1 hour
            token_retention: Duration::from_secs(14 * 24 * 3600),
            authorization_retention: Duration::from_secs(14 * 24 * 3600),
            disable_token_pruning: false,
            disable_authorization_pruning: false,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// The configuration sources could not be read or merged.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Configuration sections that can check their own consistency.
pub trait Validate {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` or `ConfigError::Missing` describing
    /// the first problem found.
    fn validate(&self) -> Result<(), ConfigError>;
}

impl Validate for StoreConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.context.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(ConfigError::InvalidValue(
                "context cannot be empty".to_string(),
            ));
        }

        if self.query.page_size == 0 {
            return Err(ConfigError::InvalidValue(
                "query.page_size must be > 0".to_string(),
            ));
        }

        self.prune.validate()
    }
}

impl Validate for PruneConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue(
                "prune.batch_size must be > 0".to_string(),
            ));
        }
        if self.interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "prune.interval must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

pub mod loader {
    use std::path::{Path, PathBuf};

    use config::{Config, Environment, File};
    use serde::de::DeserializeOwned;

    use super::{ConfigError, Validate};

    /// Prefix of environment overrides, e.g. `AUTHSTORE__PRUNE__BATCH_SIZE=500`.
    pub const ENV_PREFIX: &str = "AUTHSTORE";

    /// Default configuration file, read when no path is given and it exists.
    pub const DEFAULT_PATH: &str = "authstore.toml";

    /// Loads and validates a configuration from a file plus environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Load` if a source cannot be parsed, or the
    /// validation error of the merged configuration.
    pub fn load_config<C>(path: Option<&Path>) -> Result<C, ConfigError>
    where
        C: DeserializeOwned + Validate,
    {
        let mut builder = Config::builder();
        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::Missing(format!(
                        "configuration file {}",
                        path.display()
                    )));
                }
                builder = builder.add_source(File::from(path.to_path_buf()));
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_PATH);
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .separator("__"),
        );

        let merged: C = builder.build()?.try_deserialize()?;
        merged.validate()?;
        Ok(merged)
    }
}
