//! Replays never apply a write twice

use crate::common::{booking, fast_config, memory_context};
use booking_sync::client::remote::RemoteStore;
use booking_sync::shared::{Mutation, OperationKind, RemoteError};
use serde_json::json;

#[tokio::test]
async fn test_repeated_submission_applies_once() {
    let ctx = memory_context(fast_config()).await;
    ctx.remote.seed(booking("B1"), serde_json::Map::new()).await;
    let mutation = Mutation::new(OperationKind::Update, "bookings", "B1", json!({ "paid": 2500 }));

    assert_ok!(ctx.remote.apply_idempotent(&mutation).await);
    let second = ctx.remote.apply_idempotent(&mutation).await;

    assert_eq!(second, Err(RemoteError::AlreadyApplied(mutation.operation_id)));
    assert_eq!(ctx.remote.applied().await.len(), 1);
}

#[tokio::test]
async fn test_lost_response_during_direct_attempt_is_not_reapplied() {
    let ctx = memory_context(fast_config()).await;
    ctx.remote.lose_next_responses(1).await;

    // Applied remotely, but the client only saw a dropped connection
    let outcome = assert_ok!(
        ctx.manager
            .perform(OperationKind::Create, "bookings", "B1", json!({ "guest": "Ada" }))
            .await
    );
    assert!(outcome.is_queued());
    assert!(ctx.remote.document(&booking("B1")).await.is_some());

    let report = assert_ok!(ctx.manager.sync().await);

    // Replay is recognized by operation id and counted as success
    assert_report!(report, succeeded = 1, retried = 0, terminal = 0);
    assert_eq!(ctx.remote.applied().await.len(), 1);
    assert_eq!(ctx.remote.submission_count().await, 2);
    assert_eq!(assert_ok!(ctx.manager.queue().count().await), 0);
}

#[tokio::test]
async fn test_lost_response_during_sync_is_not_reapplied() {
    let ctx = memory_context(fast_config()).await;
    ctx.remote.seed(booking("B1"), serde_json::Map::new()).await;
    ctx.go_offline().await;
    assert_ok!(
        ctx.manager
            .perform(OperationKind::Update, "bookings", "B1", json!({ "paid": 100 }))
            .await
    );

    ctx.remote.set_online(true).await;
    ctx.remote.lose_next_responses(1).await;
    let interrupted = assert_ok!(ctx.manager.sync().await);
    assert!(interrupted.is_aborted());

    let report = assert_ok!(ctx.manager.sync().await);
    assert_report!(report, succeeded = 1);

    let applied = ctx.remote.applied().await;
    assert_eq!(applied.len(), 1);
    assert_eq!(ctx.remote.document(&booking("B1")).await.unwrap().fields["paid"], json!(100));
}
