//! Connection pool for the PostgreSQL backing context.

use std::time::Duration;

use sqlx_core::pool::PoolOptions;
use sqlx_postgres::{PgPool, Postgres};
use tracing::{debug, info, instrument};

use crate::config::PostgresConfig;
use crate::error::Result;

/// Opens a pool from the configuration.
///
/// # Errors
///
/// Returns an error if no connection can be established.
#[instrument(skip(config), fields(url = %mask_password(&config.url)))]
pub async fn create_pool(config: &PostgresConfig) -> Result<PgPool> {
    let min_connections = config
        .min_connections
        .unwrap_or(config.pool_size / 4)
        .max(1)
        .min(config.pool_size);
    info!(
        pool_size = config.pool_size,
        min_connections,
        connect_timeout_ms = config.connect_timeout_ms,
        "Opening PostgreSQL pool"
    );

    let mut options = PoolOptions::<Postgres>::new()
        .max_connections(config.pool_size)
        .min_connections(min_connections)
        .acquire_timeout(Duration::from_millis(config.connect_timeout_ms));
    if let Some(idle_timeout) = config.idle_timeout_ms {
        options = options.idle_timeout(Duration::from_millis(idle_timeout));
    }

    let pool = options.connect(&config.url).await?;
    debug!("PostgreSQL pool ready");
    Ok(pool)
}

/// Replaces the password of a connection URL for logging.
pub(crate) fn mask_password(url: &str) -> String {
    let Some(at) = url.find('@') else {
        return url.to_string();
    };
    let scheme_end = url.find("://").map_or(0, |p| p + 3);
    match url[..at].rfind(':') {
        Some(colon) if colon > scheme_end => format!("{}:****{}", &url[..colon], &url[at..]),
        _ => url.to_string(),
    }
}
