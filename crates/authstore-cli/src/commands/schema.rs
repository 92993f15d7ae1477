use anyhow::{Context, Result};
use authstore::KeyKind;
use authstore_postgres::{apply_schema, create_pool, schema_sql};
use tracing::info;

use crate::config::CliConfig;

pub async fn run(config: &CliConfig, key_type: Option<KeyKind>, apply: bool) -> Result<()> {
    let key = key_type.unwrap_or(config.postgres.key_type);

    if !apply {
        println!("{}", schema_sql(key));
        return Ok(());
    }

    let pool = create_pool(&config.postgres)
        .await
        .context("Failed to connect to database")?;
    apply_schema(&pool, key)
        .await
        .context("Failed to apply schema")?;
    pool.close().await;

    info!(key_type = ?key, "Schema applied");
    Ok(())
}
