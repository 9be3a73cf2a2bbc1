//! Context fixtures
//!
//! A "context" is one `SyncManager` with its own connectivity monitor, as the
//! foreground app or the background worker would run it. Several contexts
//! can share one queue file and one remote store.

use booking_sync::client::local_db::LocalDatabase;
use booking_sync::client::remote::InMemoryRemoteStore;
use booking_sync::client::sync::{ConnectivityMonitor, NetworkStatus, SyncStatus};
use booking_sync::client::SyncManager;
use booking_sync::shared::{EntityKey, SyncConfig};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub struct TestContext {
    pub manager: SyncManager,
    pub remote: Arc<InMemoryRemoteStore>,
    pub monitor: ConnectivityMonitor,
}

impl TestContext {
    /// Lose the network on both sides: the monitor knows and the store is unreachable
    pub async fn go_offline(&self) {
        self.remote.set_online(false).await;
        self.monitor.set_online(false);
    }

    /// Wait until the published status satisfies `predicate`
    pub async fn wait_for_status(&self, predicate: impl FnMut(&SyncStatus) -> bool) -> SyncStatus {
        let mut status = self.manager.subscribe();
        let seen = tokio::time::timeout(Duration::from_secs(5), status.wait_for(predicate))
            .await
            .expect("status never reached the expected state")
            .expect("status channel closed");
        seen.clone()
    }
}

/// Retries are due immediately and lock polling is quick
pub fn fast_config() -> SyncConfig {
    SyncConfig::builder()
        .backoff(Duration::ZERO, Duration::ZERO)
        .submit_timeout(Duration::from_secs(2))
        .lock_poll_interval(Duration::from_millis(20))
        .build()
        .expect("valid test config")
}

pub fn booking(id: &str) -> EntityKey {
    EntityKey::new("bookings", id)
}

/// Context over an in-memory queue
pub async fn memory_context(config: SyncConfig) -> TestContext {
    let db = LocalDatabase::in_memory().await.expect("in-memory database");
    start_context(db, Arc::new(InMemoryRemoteStore::new()), config).await
}

/// Context over a queue file, sharing `remote` with other contexts
pub async fn file_context(
    path: &Path,
    remote: Arc<InMemoryRemoteStore>,
    config: SyncConfig,
) -> TestContext {
    let db = LocalDatabase::open(path).await.expect("queue database");
    start_context(db, remote, config).await
}

pub async fn start_context(
    db: LocalDatabase,
    remote: Arc<InMemoryRemoteStore>,
    config: SyncConfig,
) -> TestContext {
    let monitor = ConnectivityMonitor::with_status(NetworkStatus::Online);
    let manager = SyncManager::start(config, db, remote.clone(), monitor.clone())
        .await
        .expect("sync manager");
    TestContext {
        manager,
        remote,
        monitor,
    }
}
