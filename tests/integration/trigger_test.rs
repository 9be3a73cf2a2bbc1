//! Passes started by connectivity, requests and background signals

use crate::common::{booking, fast_config, memory_context};
use booking_sync::client::{register_global, sync_manager};
use booking_sync::client::sync::SyncStatus;
use booking_sync::shared::{OperationKind, RemoteError, SyncConfig};
use serde_json::json;
use std::time::Duration;
use tokio::sync::watch;

async fn wait_for_pending(status: &mut watch::Receiver<SyncStatus>, pending: u64) {
    tokio::time::timeout(
        Duration::from_secs(5),
        status.wait_for(|s| s.pending_count == pending && !s.syncing && s.last_sync_report.is_some()),
    )
    .await
    .expect("status never reached the expected pending count")
    .unwrap();
}

#[tokio::test]
async fn test_connectivity_restored_replays_queue() {
    let ctx = memory_context(fast_config()).await;
    ctx.go_offline().await;
    assert_ok!(
        ctx.manager
            .perform(OperationKind::Create, "bookings", "B1", json!({ "guest": "Ada" }))
            .await
    );
    let mut status = ctx.manager.subscribe();

    ctx.remote.set_online(true).await;
    ctx.monitor.set_online(true);

    wait_for_pending(&mut status, 0).await;
    assert!(ctx.remote.document(&booking("B1")).await.is_some());
    assert!(ctx.manager.status().network.is_online());
}

#[tokio::test]
async fn test_request_sync_does_not_block() {
    let ctx = memory_context(fast_config()).await;
    ctx.remote.set_online(false).await;
    assert_ok!(
        ctx.manager
            .perform(OperationKind::Create, "bookings", "B1", json!({}))
            .await
    );
    ctx.remote.set_online(true).await;
    ctx.remote.set_latency(Some(Duration::from_millis(100))).await;
    let mut status = ctx.manager.subscribe();

    let started = std::time::Instant::now();
    assert!(ctx.manager.request_sync());
    assert!(started.elapsed() < Duration::from_millis(50));

    wait_for_pending(&mut status, 0).await;
}

#[tokio::test]
async fn test_retry_wakeup_replays_failed_record() {
    let config = SyncConfig::builder()
        .backoff(Duration::from_millis(100), Duration::from_millis(100))
        .build()
        .unwrap();
    let ctx = memory_context(config).await;
    ctx.remote.set_online(false).await;
    assert_ok!(
        ctx.manager
            .perform(OperationKind::Create, "bookings", "B1", json!({}))
            .await
    );
    ctx.remote.set_online(true).await;
    ctx.remote
        .fail_next(RemoteError::unavailable("503 Service Unavailable"))
        .await;
    let mut status = ctx.manager.subscribe();

    // First pass fails; the scheduled wakeup runs the second
    assert!(ctx.manager.request_sync());

    wait_for_pending(&mut status, 0).await;
    assert_eq!(ctx.remote.submission_count().await, 3);
}

#[tokio::test]
async fn test_background_signal_through_global_handle() {
    let ctx = memory_context(fast_config()).await;
    ctx.remote.set_online(false).await;
    assert_ok!(
        ctx.manager
            .perform(OperationKind::Create, "bookings", "B1", json!({}))
            .await
    );
    ctx.remote.set_online(true).await;
    let mut status = ctx.manager.subscribe();

    // Only this test registers a global manager
    assert!(register_global(ctx.manager.clone()).is_ok());
    let global = sync_manager().expect("registered manager");
    assert!(global.background_signal());

    wait_for_pending(&mut status, 0).await;
    assert!(ctx.remote.document(&booking("B1")).await.is_some());
}

#[tokio::test]
async fn test_triggers_ignored_while_offline() {
    let ctx = memory_context(fast_config()).await;
    ctx.go_offline().await;
    assert_ok!(
        ctx.manager
            .perform(OperationKind::Create, "bookings", "B1", json!({}))
            .await
    );
    ctx.remote.set_online(true).await;

    assert!(ctx.manager.request_sync());
    assert!(ctx.manager.background_signal());
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(ctx.remote.submission_count().await, 0);
    assert_eq!(ctx.manager.status().pending_count, 1);
}
