use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use authstore::{Authorization, EntityKey, PruningJob, Token};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::build_services;
use crate::config::CliConfig;

/// Runs one pass and prints its summary as JSON. Ctrl-C cancels between
/// batches; rows already removed stay removed.
pub async fn run_once<K: EntityKey>(
    mut config: CliConfig,
    older_than: Option<Duration>,
) -> Result<()> {
    if let Some(retention) = older_than {
        config.store.prune.token_retention = retention;
        config.store.prune.authorization_retention = retention;
    }

    let services = build_services::<K>(&config)?;
    let job = PruningJob::<Authorization<K>, Token<K>>::from_services(&services)?;

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let result = job.run_once(&cancel).await;
    services.shutdown().await;
    let summary = result.context("Pruning failed")?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Runs the periodic job until interrupted.
pub async fn run_periodic<K: EntityKey>(config: CliConfig) -> Result<()> {
    let services = build_services::<K>(&config)?;
    let job = Arc::new(PruningJob::<Authorization<K>, Token<K>>::from_services(
        &services,
    )?);

    let cancel = CancellationToken::new();
    let handle = job.start(cancel.clone());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    info!("Interrupted, stopping pruning job");
    cancel.cancel();

    handle.await.context("Pruning job panicked")?;
    services.shutdown().await;
    Ok(())
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, finishing current batch");
            cancel.cancel();
        }
    });
}
