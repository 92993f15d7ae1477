//! Batched pruning of tokens and authorizations.

mod common;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use authstore::prelude::*;
use authstore::{EntityKind, PruningJob, authorization_types, statuses};
use common::{NOW, harness, harness_with};
use time::{Duration, OffsetDateTime};
use tokio_util::sync::CancellationToken;

fn days_ago(days: i64) -> OffsetDateTime {
    NOW - Duration::days(days)
}

fn cutoff() -> OffsetDateTime {
    days_ago(14)
}

fn token(status: &str, expires: Option<OffsetDateTime>) -> Token {
    Token {
        creation_date: Some(days_ago(30)),
        expiration_date: expires,
        status: Some(status.to_string()),
        ..Token::default()
    }
}

fn authorization(status: &str, kind: &str) -> Authorization {
    Authorization {
        creation_date: Some(days_ago(30)),
        status: Some(status.to_string()),
        authorization_type: Some(kind.to_string()),
        ..Authorization::default()
    }
}

#[tokio::test]
async fn test_prune_removes_expired_tokens_only() {
    let h = harness();
    let authorizations = h.services.authorization_store::<Authorization>().unwrap();
    let tokens = h.services.token_store::<Token>().unwrap();

    let grant = authorizations
        .create(authorization(statuses::VALID, authorization_types::PERMANENT))
        .await
        .unwrap();
    for expires in [days_ago(1), days_ago(2), NOW + Duration::days(1)] {
        let mut token = token(statuses::VALID, Some(expires));
        token.authorization_id = grant.id.clone();
        tokens.create(token).await.unwrap();
    }

    let report = tokens.prune(cutoff()).await.unwrap();
    assert_eq!(report.deleted, 2);
    assert!(!report.cancelled);
    assert_eq!(h.context.row_count(EntityKind::Token).await, 1);

    let report = authorizations.prune(cutoff()).await.unwrap();
    assert_eq!(report.deleted, 0);
    assert_eq!(h.context.row_count(EntityKind::Authorization).await, 1);

    let again = tokens.prune(cutoff()).await.unwrap();
    assert_eq!(again.deleted, 0);
}

#[tokio::test]
async fn test_prune_respects_cutoff() {
    let h = harness();
    let tokens = h.services.token_store::<Token>().unwrap();

    let mut recent = token(statuses::REVOKED, None);
    recent.creation_date = Some(days_ago(1));
    tokens.create(recent).await.unwrap();
    let mut undated = token(statuses::REVOKED, None);
    undated.creation_date = None;
    tokens.create(undated).await.unwrap();
    tokens.create(token(statuses::REVOKED, None)).await.unwrap();

    let report = tokens.prune(cutoff()).await.unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(h.context.row_count(EntityKind::Token).await, 2);
}

#[tokio::test]
async fn test_prune_keeps_live_tokens() {
    let h = harness();
    let tokens = h.services.token_store::<Token>().unwrap();

    tokens.create(token(statuses::VALID, None)).await.unwrap();
    tokens.create(token(statuses::INACTIVE, None)).await.unwrap();
    tokens.create(token(statuses::REDEEMED, None)).await.unwrap();
    tokens.create(token(statuses::REJECTED, None)).await.unwrap();

    let report = tokens.prune(cutoff()).await.unwrap();
    assert_eq!(report.deleted, 2);
    assert_eq!(
        tokens
            .count(Filter::all().is_in(
                authstore::columns::STATUS,
                [statuses::VALID, statuses::INACTIVE]
            ))
            .await
            .unwrap(),
        2
    );
}

#[tokio::test]
async fn test_tokens_of_invalid_authorizations_are_pruned() {
    let h = harness();
    let authorizations = h.services.authorization_store::<Authorization>().unwrap();
    let tokens = h.services.token_store::<Token>().unwrap();

    let revoked = authorizations
        .create(authorization(statuses::REVOKED, authorization_types::PERMANENT))
        .await
        .unwrap();
    let mut attached = token(statuses::VALID, None);
    attached.authorization_id = revoked.id.clone();
    tokens.create(attached).await.unwrap();

    assert_eq!(tokens.prune(cutoff()).await.unwrap().deleted, 1);
}

#[tokio::test]
async fn test_prune_runs_in_batches() {
    let h = harness_with(|builder| builder.configure(|config| config.prune.batch_size = 2));
    let tokens = h.services.token_store::<Token>().unwrap();
    for _ in 0..5 {
        tokens.create(token(statuses::REVOKED, None)).await.unwrap();
    }

    let report = tokens.prune(cutoff()).await.unwrap();
    assert_eq!(report.deleted, 5);
    assert_eq!(report.batches, 3);
    assert_eq!(h.context.row_count(EntityKind::Token).await, 0);
}

#[tokio::test]
async fn test_cancelled_prune_stops_and_resumes() {
    let h = harness_with(|builder| builder.configure(|config| config.prune.batch_size = 1));
    let tokens = h.services.token_store::<Token>().unwrap();
    for _ in 0..3 {
        tokens.create(token(statuses::REVOKED, None)).await.unwrap();
    }

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = tokens.prune_until_cancelled(cutoff(), &cancel).await.unwrap();
    assert!(report.cancelled);
    assert_eq!(report.deleted, 0);
    assert_eq!(h.context.row_count(EntityKind::Token).await, 3);

    let report = tokens.prune(cutoff()).await.unwrap();
    assert!(!report.cancelled);
    assert_eq!(report.deleted, 3);
}

#[tokio::test]
async fn test_cancellation_during_batch_delay() {
    let h = harness_with(|builder| {
        builder.configure(|config| {
            config.prune.batch_size = 1;
            config.prune.batch_delay = StdDuration::from_secs(3600);
        })
    });
    let tokens = h.services.token_store::<Token>().unwrap();
    for _ in 0..3 {
        tokens.create(token(statuses::REVOKED, None)).await.unwrap();
    }

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        trigger.cancel();
    });

    let report = tokens.prune_until_cancelled(cutoff(), &cancel).await.unwrap();
    assert!(report.cancelled);
    assert_eq!(report.deleted, 1);
    assert_eq!(h.context.row_count(EntityKind::Token).await, 2);
}

#[tokio::test]
async fn test_authorization_prune_removes_attached_tokens() {
    let h = harness();
    let authorizations = h.services.authorization_store::<Authorization>().unwrap();
    let tokens = h.services.token_store::<Token>().unwrap();

    let rejected = authorizations
        .create(authorization(statuses::REJECTED, authorization_types::PERMANENT))
        .await
        .unwrap();
    let mut attached = token(statuses::VALID, None);
    attached.creation_date = Some(NOW);
    attached.authorization_id = rejected.id.clone();
    tokens.create(attached).await.unwrap();

    let report = authorizations.prune(cutoff()).await.unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(h.context.row_count(EntityKind::Token).await, 0);
}

#[tokio::test]
async fn test_pruning_job_pass_empties_ad_hoc_authorizations() {
    let h = harness();
    let authorizations = h.services.authorization_store::<Authorization>().unwrap();
    let tokens = h.services.token_store::<Token>().unwrap();

    let ad_hoc = authorizations
        .create(authorization(statuses::VALID, authorization_types::AD_HOC))
        .await
        .unwrap();
    let mut revoked = token(statuses::REVOKED, None);
    revoked.authorization_id = ad_hoc.id.clone();
    tokens.create(revoked).await.unwrap();

    authorizations
        .create(authorization(statuses::VALID, authorization_types::AD_HOC))
        .await
        .unwrap();
    authorizations
        .create(authorization(statuses::VALID, authorization_types::PERMANENT))
        .await
        .unwrap();

    let job = PruningJob::<Authorization, Token>::from_services(&h.services).unwrap();
    let summary = job.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(summary.tokens.map(|r| r.deleted), Some(1));
    assert_eq!(summary.authorizations.map(|r| r.deleted), Some(2));
    assert_eq!(h.context.row_count(EntityKind::Authorization).await, 1);
}

#[tokio::test]
async fn test_pruning_job_honours_disable_flags_and_clock() {
    let h = harness_with(|builder| {
        builder.configure(|config| config.prune.disable_authorization_pruning = true)
    });
    let tokens = h.services.token_store::<Token>().unwrap();
    let mut fresh = token(statuses::REVOKED, None);
    fresh.creation_date = Some(NOW);
    tokens.create(fresh).await.unwrap();

    let job = PruningJob::<Authorization, Token>::from_services(&h.services).unwrap();
    let summary = job.run_once(&CancellationToken::new()).await.unwrap();
    assert_eq!(summary.tokens.map(|r| r.deleted), Some(0));
    assert_eq!(summary.authorizations, None);

    h.clock.advance(Duration::days(15));
    let summary = job.run_once(&CancellationToken::new()).await.unwrap();
    assert_eq!(summary.tokens.map(|r| r.deleted), Some(1));
}

#[tokio::test]
async fn test_out_of_range_retention_is_a_configuration_error() {
    let h = harness_with(|builder| {
        builder.configure(|config| {
            config.prune.token_retention = StdDuration::from_secs(u64::MAX / 4);
        })
    });
    let tokens = h.services.token_store::<Token>().unwrap();
    tokens.create(token(statuses::REVOKED, None)).await.unwrap();

    let job = PruningJob::<Authorization, Token>::from_services(&h.services).unwrap();
    let err = job.run_once(&CancellationToken::new()).await.unwrap_err();
    assert!(err.is_configuration_error());
    assert_eq!(h.context.row_count(EntityKind::Token).await, 1);
}

#[tokio::test]
async fn test_out_of_range_authorization_retention_is_rejected() {
    let h = harness_with(|builder| {
        builder.configure(|config| {
            config.prune.disable_token_pruning = true;
            config.prune.authorization_retention = StdDuration::from_secs(400_000 * 365 * 86_400);
        })
    });

    let job = PruningJob::<Authorization, Token>::from_services(&h.services).unwrap();
    let err = job.run_once(&CancellationToken::new()).await.unwrap_err();
    assert!(err.is_configuration_error());
}

#[tokio::test]
async fn test_pruning_job_stops_on_cancel() {
    let h = harness();
    let job = Arc::new(PruningJob::<Authorization, Token>::from_services(&h.services).unwrap());

    let cancel = CancellationToken::new();
    let handle = Arc::clone(&job).start(cancel.clone());
    cancel.cancel();

    tokio::time::timeout(StdDuration::from_secs(5), handle)
        .await
        .expect("job stops after cancellation")
        .unwrap();
}
