//! Tool configuration: the store settings plus the database connection.
//!
//! ```toml
//! log_level = "info"
//! delete_policy = "restrict"
//!
//! [prune]
//! batch_size = 1000
//! token_retention = "14d"
//!
//! [postgres]
//! url = "postgres://localhost/authstore"
//! key_type = "text"
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use authstore::config::loader::load_config;
use authstore::{ConfigError, StoreConfig, Validate};
use authstore_postgres::PostgresConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    #[serde(flatten)]
    pub store: StoreConfig,

    /// Log level used when `RUST_LOG` is not set.
    pub log_level: String,

    pub postgres: PostgresConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            log_level: "info".to_string(),
            postgres: PostgresConfig::default(),
        }
    }
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.log_level.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "log_level cannot be empty".to_string(),
            ));
        }
        self.store.validate()?;
        self.postgres.validate()
    }
}

/// Loads the configuration and applies command-line overrides.
pub fn load(path: Option<&Path>, database_url: Option<&str>) -> Result<CliConfig> {
    let mut config: CliConfig = load_config(path).context("Failed to load configuration")?;
    if let Some(url) = database_url {
        config.postgres.url = url.to_string();
        config
            .validate()
            .context("Invalid --database-url")?;
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = CliConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_load_from_file_with_override() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
log_level = "debug"
delete_policy = "cascade"

[prune]
batch_size = 50

[postgres]
url = "postgres://file/auth"
key_type = "bigint"
"#
        )
        .unwrap();

        let config = load(Some(file.path()), Some("postgres://flag/auth")).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.store.delete_policy, authstore::DeletePolicy::Cascade);
        assert_eq!(config.store.prune.batch_size, 50);
        assert_eq!(config.postgres.key_type, authstore::KeyKind::Bigint);
        assert_eq!(config.postgres.url, "postgres://flag/auth");
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        assert!(load(Some(file.path()), Some("mysql://nope")).is_err());
    }
}
