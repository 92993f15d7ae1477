//! Periodic pruning of stale tokens and authorizations.
//!
//! # Example
//!
//! ```ignore
//! let job = Arc::new(PruningJob::<Authorization, Token>::from_services(&services)?);
//! let cancel = CancellationToken::new();
//! let handle = job.start(cancel.clone());
//!
//! // On shutdown
//! cancel.cancel();
//! handle.await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::builder::StoreServices;
use crate::error::{StoreError, StoreResult};
use crate::models::Entity;
use crate::store::{AuthorizationStore, PruneReport, StoreRuntime, TokenStore};

/// Result of one pruning pass. A kind disabled in the configuration reports
/// `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub tokens: Option<PruneReport>,
    pub authorizations: Option<PruneReport>,
}

/// Prunes tokens, then authorizations, every `prune.interval`.
pub struct PruningJob<A: Entity, T: Entity> {
    runtime: Arc<StoreRuntime>,
    authorizations: Arc<dyn AuthorizationStore<A>>,
    tokens: Arc<dyn TokenStore<T>>,
}

impl<A: Entity, T: Entity> PruningJob<A, T> {
    #[must_use]
    pub fn new(
        runtime: Arc<StoreRuntime>,
        authorizations: Arc<dyn AuthorizationStore<A>>,
        tokens: Arc<dyn TokenStore<T>>,
    ) -> Self {
        Self {
            runtime,
            authorizations,
            tokens,
        }
    }

    /// Resolves the stores for `A` and `T` from `services`.
    ///
    /// # Errors
    ///
    /// Returns the resolution error if either type is not supported.
    pub fn from_services(services: &StoreServices) -> StoreResult<Self> {
        Ok(Self::new(
            Arc::clone(services.runtime()),
            services.authorization_store::<A>()?,
            services.token_store::<T>()?,
        ))
    }

    /// Runs a single pass: tokens first, so that authorizations emptied by the
    /// token sweep become prunable in the same pass.
    ///
    /// # Errors
    ///
    /// Returns the first store error; the remaining kind is not swept.
    #[instrument(skip_all, name = "pruning_pass")]
    pub async fn run_once(&self, cancel: &CancellationToken) -> StoreResult<SweepSummary> {
        let config = &self.runtime.config().prune;
        let now = self.runtime.clock().now();
        let mut summary = SweepSummary::default();

        if !config.disable_token_pruning {
            let cutoff = retention_cutoff(now, config.token_retention, "token_retention")?;
            summary.tokens = Some(self.tokens.prune_until_cancelled(cutoff, cancel).await?);
        }

        if !config.disable_authorization_pruning && !cancel.is_cancelled() {
            let cutoff = retention_cutoff(
                now,
                config.authorization_retention,
                "authorization_retention",
            )?;
            summary.authorizations = Some(
                self.authorizations
                    .prune_until_cancelled(cutoff, cancel)
                    .await?,
            );
        }

        Ok(summary)
    }

    /// Spawns the periodic job. The first pass runs immediately; the task
    /// stops once `cancel` fires. Errors are logged and the next pass runs on
    /// schedule.
    pub fn start(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let period = self.runtime.config().prune.interval;
        info!(interval = ?period, "Starting pruning job");

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                match self.run_once(&cancel).await {
                    Ok(summary) => {
                        info!(
                            tokens = summary.tokens.map(|r| r.deleted),
                            authorizations = summary.authorizations.map(|r| r.deleted),
                            "Pruning pass completed"
                        );
                    }
                    Err(e) => {
                        error!(error = %e, category = %e.category(), "Pruning pass failed");
                    }
                }
            }

            info!("Pruning job stopped");
        })
    }
}

/// `now - retention`, or a configuration error when that falls outside the
/// representable date range.
fn retention_cutoff(
    now: OffsetDateTime,
    retention: Duration,
    setting: &str,
) -> StoreResult<OffsetDateTime> {
    time::Duration::try_from(retention)
        .ok()
        .and_then(|retention| now.checked_sub(retention))
        .ok_or_else(|| {
            StoreError::configuration(format!("prune.{setting} of {retention:?} is out of range"))
        })
}
