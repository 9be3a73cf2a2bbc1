//! Queue contents survive a process restart

use crate::common::{booking, fast_config, file_context};
use booking_sync::client::remote::InMemoryRemoteStore;
use booking_sync::shared::{OperationKind, RecordPatch, RecordStatus};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_queued_write_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.db");
    let remote = Arc::new(InMemoryRemoteStore::new());

    let queued = {
        let ctx = file_context(&path, remote.clone(), fast_config()).await;
        ctx.go_offline().await;
        let outcome = assert_ok!(
            ctx.manager
                .perform(OperationKind::Create, "bookings", "B1", json!({ "guest": "Ada" }))
                .await
        );
        ctx.manager.shutdown().await;
        ctx.manager.queue().database().close().await;
        outcome
    };

    remote.set_online(true).await;
    let ctx = file_context(&path, remote.clone(), fast_config()).await;
    assert_eq!(ctx.manager.status().pending_count, 1);

    let record = assert_ok!(ctx.manager.queue().get(queued.operation_id()).await).unwrap();
    assert_eq!(record.mutation.payload, json!({ "guest": "Ada" }));

    let report = assert_ok!(ctx.manager.sync().await);
    assert_report!(report, succeeded = 1);
    assert!(remote.document(&booking("B1")).await.is_some());
}

#[tokio::test]
async fn test_record_left_in_flight_is_retried_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.db");
    let remote = Arc::new(InMemoryRemoteStore::new());

    let queued = {
        let ctx = file_context(&path, remote.clone(), fast_config()).await;
        ctx.go_offline().await;
        let outcome = assert_ok!(
            ctx.manager
                .perform(OperationKind::Create, "bookings", "B1", json!({}))
                .await
        );
        // Crash in the middle of a submission
        assert_ok!(
            ctx.manager
                .queue()
                .update(outcome.operation_id(), RecordPatch::status(RecordStatus::InFlight))
                .await
        );
        ctx.manager.shutdown().await;
        ctx.manager.queue().database().close().await;
        outcome
    };

    remote.set_online(true).await;
    let ctx = file_context(&path, remote.clone(), fast_config()).await;
    let report = assert_ok!(ctx.manager.sync().await);

    assert_report!(report, succeeded = 1);
    assert!(assert_ok!(ctx.manager.queue().get(queued.operation_id()).await).is_none());
}

#[tokio::test]
async fn test_last_pass_is_restored_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.db");
    let remote = Arc::new(InMemoryRemoteStore::new());

    let report = {
        let ctx = file_context(&path, remote.clone(), fast_config()).await;
        let report = assert_ok!(ctx.manager.sync().await);
        ctx.manager.shutdown().await;
        ctx.manager.queue().database().close().await;
        report
    };

    let ctx = file_context(&path, remote, fast_config()).await;
    let status = ctx.manager.status();
    assert_eq!(status.last_sync_report, Some(report));
    assert!(status.last_sync_at.is_some());
}
