use serde::Serialize;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::StoreRuntime;
use crate::error::StoreResult;
use crate::schema::EntityKind;
use crate::session::PruneCriteria;

/// Outcome of a prune sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    /// Rows of the pruned kind removed.
    pub deleted: u64,
    /// Batches executed.
    pub batches: u64,
    /// `true` if the sweep stopped early because it was cancelled.
    pub cancelled: bool,
}

/// Deletes prunable rows of `kind` batch by batch until a batch comes back
/// short or `cancel` fires.
///
/// Each batch runs on its own session and is atomic. Between batches the
/// sweep yields to the scheduler and waits `prune.batch_delay`.
pub(super) async fn sweep(
    runtime: &StoreRuntime,
    kind: EntityKind,
    cutoff: OffsetDateTime,
    cancel: &CancellationToken,
) -> StoreResult<PruneReport> {
    let config = &runtime.config().prune;
    let mut report = PruneReport::default();

    loop {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }

        let criteria = PruneCriteria {
            cutoff,
            now: runtime.clock().now(),
            batch_size: config.batch_size,
        };
        let deleted = {
            let mut session = runtime.binding().session().await?;
            session.prune_batch(kind, &criteria).await?
        };
        report.batches += 1;
        report.deleted += deleted;
        debug!(entity = %kind, batch = report.batches, deleted, "Prune batch completed");

        if deleted < config.batch_size {
            break;
        }

        tokio::task::yield_now().await;
        if !config.batch_delay.is_zero() {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(config.batch_delay) => {}
            }
        }
    }

    info!(
        entity = %kind,
        deleted = report.deleted,
        batches = report.batches,
        cancelled = report.cancelled,
        "Prune sweep finished"
    );
    Ok(report)
}
