//! Records that exhaust their retries

use crate::common::{booking, fast_config, memory_context};
use assert_matches::assert_matches;
use booking_sync::shared::{
    OperationKind, RecordStatus, RejectionCode, SyncConfig, SyncError,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;

fn single_attempt() -> SyncConfig {
    SyncConfig::builder()
        .max_attempts(1)
        .backoff(Duration::ZERO, Duration::ZERO)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_terminal_record_blocks_only_its_entity() {
    let ctx = memory_context(single_attempt()).await;
    ctx.remote.seed(booking("B1"), serde_json::Map::new()).await;
    ctx.remote.seed(booking("B2"), serde_json::Map::new()).await;
    ctx.go_offline().await;

    let blocked = assert_ok!(
        ctx.manager
            .perform(OperationKind::Update, "bookings", "B1", json!({ "paid": 1 }))
            .await
    );
    assert_ok!(
        ctx.manager
            .perform(OperationKind::Update, "bookings", "B1", json!({ "paid": 2 }))
            .await
    );
    assert_ok!(
        ctx.manager
            .perform(OperationKind::Update, "bookings", "B2", json!({ "paid": 3 }))
            .await
    );

    ctx.remote.set_online(true).await;
    ctx.remote
        .reject_entity(booking("B1"), RejectionCode::PermissionDenied, "booking is locked")
        .await;

    let report = assert_ok!(ctx.manager.sync().await);
    assert_report!(report, succeeded = 1, terminal = 1, held = 1);
    assert_eq!(
        ctx.remote.document(&booking("B2")).await.unwrap().fields["paid"],
        json!(3)
    );

    let record = assert_ok!(ctx.manager.queue().get(blocked.operation_id()).await).unwrap();
    assert_eq!(record.status, RecordStatus::FailedTerminal);
    assert!(ctx.manager.status().has_terminal_failures);

    // The later B1 record stays held on every pass
    let submissions = ctx.remote.submission_count().await;
    let again = assert_ok!(ctx.manager.sync().await);
    assert_report!(again, succeeded = 0, held = 1);
    assert_eq!(ctx.remote.submission_count().await, submissions);
}

#[tokio::test]
async fn test_discarding_terminal_record_releases_entity() {
    let ctx = memory_context(single_attempt()).await;
    ctx.remote.seed(booking("B1"), serde_json::Map::new()).await;
    ctx.go_offline().await;

    let doomed = assert_ok!(
        ctx.manager
            .perform(OperationKind::Update, "bookings", "B1", json!({ "status": "Cancelled" }))
            .await
    );
    assert_ok!(
        ctx.manager
            .perform(OperationKind::Update, "bookings", "B1", json!({ "paid": 2500 }))
            .await
    );

    ctx.remote.set_online(true).await;
    ctx.remote
        .reject_entity(booking("B1"), RejectionCode::Validation, "already checked in")
        .await;
    assert_ok!(ctx.manager.sync().await);

    ctx.remote.clear_rejection(&booking("B1")).await;
    let discarded = assert_ok!(ctx.manager.discard(doomed.operation_id()).await);
    assert_eq!(discarded.operation_id(), doomed.operation_id());

    assert_ok!(ctx.manager.sync().await);
    assert_eq!(assert_ok!(ctx.manager.queue().count().await), 0);

    let document = ctx.remote.document(&booking("B1")).await.unwrap();
    assert_eq!(document.fields["paid"], json!(2500));
    assert!(document.fields.get("status").is_none());
}

#[tokio::test]
async fn test_terminal_create_is_surfaced_and_can_be_retried() {
    let ctx = memory_context(single_attempt()).await;
    ctx.go_offline().await;

    let create = assert_ok!(
        ctx.manager
            .perform(OperationKind::Create, "bookings", "local-1", json!({ "guest": "Ada" }))
            .await
    );

    ctx.remote.set_online(true).await;
    ctx.remote
        .reject_entity(booking("local-1"), RejectionCode::Validation, "room unavailable")
        .await;
    let report = assert_ok!(ctx.manager.sync().await);
    assert_report!(report, terminal = 1);

    let status = ctx.manager.status();
    assert_eq!(status.terminal_creates, vec![create.operation_id()]);
    assert_eq!(status.pending_count, 0);

    ctx.remote.clear_rejection(&booking("local-1")).await;
    let record = assert_ok!(ctx.manager.retry_terminal(create.operation_id()).await);
    assert_eq!(record.status, RecordStatus::Pending);
    assert_eq!(record.attempt_count, 0);

    assert_ok!(ctx.manager.sync().await);
    assert!(ctx.remote.document(&booking("local-1")).await.is_some());
    assert!(ctx.manager.status().terminal_creates.is_empty());
}

#[tokio::test]
async fn test_discard_requires_terminal_record() {
    let ctx = memory_context(fast_config()).await;
    ctx.go_offline().await;
    let queued = assert_ok!(
        ctx.manager
            .perform(OperationKind::Delete, "bookings", "B1", serde_json::Value::Null)
            .await
    );

    assert_matches!(
        ctx.manager.discard(queued.operation_id()).await,
        Err(SyncError::InvalidTransition { status: RecordStatus::Pending, .. })
    );
    assert_ok!(ctx.manager.queue().get(queued.operation_id()).await).unwrap();
}
