//! At most one pass, within a context and across contexts

use crate::common::{booking, fast_config, file_context, memory_context};
use booking_sync::client::remote::InMemoryRemoteStore;
use booking_sync::shared::{OperationKind, SyncConfig};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_concurrent_sync_calls_share_one_pass() {
    let ctx = memory_context(fast_config()).await;
    ctx.go_offline().await;
    for id in ["B1", "B2", "B3"] {
        assert_ok!(
            ctx.manager
                .perform(OperationKind::Create, "bookings", id, json!({}))
                .await
        );
    }
    ctx.remote.set_online(true).await;
    ctx.remote.set_latency(Some(Duration::from_millis(50))).await;

    let (first, second) = tokio::join!(ctx.manager.sync(), ctx.manager.sync());
    let first = assert_ok!(first);
    let second = assert_ok!(second);

    assert_eq!(first, second);
    assert_report!(first, succeeded = 3);
    assert_eq!(ctx.remote.submission_count().await, 3);
}

#[tokio::test]
async fn test_second_context_waits_for_running_pass() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.db");
    let remote = Arc::new(InMemoryRemoteStore::new());

    let foreground = file_context(&path, remote.clone(), fast_config()).await;
    let background = file_context(&path, remote.clone(), fast_config()).await;

    foreground.go_offline().await;
    assert_ok!(
        foreground
            .manager
            .perform(OperationKind::Create, "bookings", "B1", json!({ "guest": "Ada" }))
            .await
    );
    remote.set_online(true).await;
    remote.set_latency(Some(Duration::from_millis(300))).await;

    let running = {
        let manager = foreground.manager.clone();
        tokio::spawn(async move { manager.sync().await })
    };

    // Wait until the foreground pass holds the persisted lock
    let db = foreground.manager.queue().database().clone();
    tokio::time::timeout(Duration::from_secs(5), async {
        while assert_ok!(db.sync_lock_holder().await).is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("foreground pass never took the lock");

    let observed = assert_ok!(background.manager.sync().await);
    let report = assert_ok!(running.await.unwrap());

    assert_eq!(observed, report);
    assert_report!(report, succeeded = 1);
    assert_eq!(remote.submission_count().await, 1);
    assert_eq!(background.manager.status().last_sync_report, Some(report));
}

#[tokio::test]
async fn test_stale_lock_is_reclaimed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.db");
    let remote = Arc::new(InMemoryRemoteStore::new());
    let config = SyncConfig::builder()
        .submit_timeout(Duration::from_millis(100))
        .lock_stale_after(Duration::from_millis(200))
        .lock_poll_interval(Duration::from_millis(20))
        .build()
        .unwrap();

    let ctx = file_context(&path, remote.clone(), config).await;
    ctx.go_offline().await;
    assert_ok!(
        ctx.manager
            .perform(OperationKind::Create, "bookings", "B1", json!({}))
            .await
    );
    remote.set_online(true).await;

    // A context that died while holding the lock
    let db = ctx.manager.queue().database().clone();
    assert_ok!(db.try_acquire_sync_lock("crashed-worker", Duration::from_secs(60)).await);
    tokio::time::sleep(Duration::from_millis(250)).await;

    let report = assert_ok!(ctx.manager.sync().await);

    assert!(report.reclaimed_stale_lock);
    assert_report!(report, succeeded = 1);
    assert_eq!(assert_ok!(db.sync_lock_holder().await), None);
    assert!(remote.document(&booking("B1")).await.is_some());
}
