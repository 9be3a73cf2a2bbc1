//! Client-side offline queue
//!
//! Everything one context (the foreground app or the background worker)
//! needs to record user writes and replay them against the remote store.
//!
//! # Architecture
//!
//! - **`local_db`** - SQLite storage for the queue, sync metadata and lock
//! - **`offline`** - durable queue, mutation recorder and retry policy
//! - **`remote`** - remote store boundary (HTTP and in-memory)
//! - **`sync`** - synchronizer, trigger surface and status channel
//! - **`config`** - environment-driven configuration
//!
//! [`SyncManager`] wires these together and is the handle the interface
//! layer holds. It is cheap to clone; contexts that cannot receive a handle
//! (signal handlers, OS callbacks) can reach one through [`sync_manager`]
//! after [`register_global`].

pub mod config;
pub mod local_db;
pub mod offline;
pub mod remote;
pub mod sync;

use self::config::Config;
use self::local_db::LocalDatabase;
use self::offline::{DurableQueue, MutationRecorder, PerformOutcome};
use self::remote::{HttpRemoteStore, RemoteStore};
use self::sync::{ConnectivityMonitor, StatusChannel, SyncStatus, Synchronizer, TriggerSurface};
use crate::shared::config::SyncConfig;
use crate::shared::error::SyncError;
use crate::shared::record::{OperationId, OperationKind, QueueRecord};
use crate::shared::report::SyncReport;
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;

static GLOBAL: OnceLock<SyncManager> = OnceLock::new();

/// Make `manager` reachable through [`sync_manager`]
///
/// Only the first registration wins; later ones get their manager back.
pub fn register_global(manager: SyncManager) -> Result<(), SyncManager> {
    GLOBAL.set(manager)
}

/// The manager registered for this process, if any
pub fn sync_manager() -> Option<&'static SyncManager> {
    GLOBAL.get()
}

/// Offline queue handle of one context
#[derive(Debug, Clone)]
pub struct SyncManager {
    inner: Arc<ManagerInner>,
}

#[derive(Debug)]
struct ManagerInner {
    queue: DurableQueue,
    recorder: MutationRecorder,
    synchronizer: Synchronizer,
    monitor: ConnectivityMonitor,
    status: StatusChannel,
    triggers: TriggerSurface,
    status_task: JoinHandle<()>,
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        self.status_task.abort();
    }
}

impl SyncManager {
    /// Wire up the queue and start the trigger loop
    pub async fn start(
        config: SyncConfig,
        db: LocalDatabase,
        remote: Arc<dyn RemoteStore>,
        monitor: ConnectivityMonitor,
    ) -> Result<Self, SyncError> {
        config
            .validate()
            .map_err(|e| SyncError::Config(e.to_string()))?;

        let queue = DurableQueue::new(db).await?;
        let status = StatusChannel::new(monitor.get_status());
        status.refresh(&queue).await?;
        status.load_last_pass(&queue).await?;
        let status_task = status.follow(queue.clone());

        let recorder = MutationRecorder::new(
            queue.clone(),
            Arc::clone(&remote),
            monitor.clone(),
            status.clone(),
            config.submit_timeout,
        );
        let trigger_buffer = config.trigger_buffer;
        let synchronizer = Synchronizer::new(queue.clone(), remote, config, status.clone());
        let triggers = TriggerSurface::spawn(
            synchronizer.clone(),
            monitor.clone(),
            status.clone(),
            trigger_buffer,
        );

        tracing::info!(holder = synchronizer.holder(), "sync manager started");

        Ok(Self {
            inner: Arc::new(ManagerInner {
                queue,
                recorder,
                synchronizer,
                monitor,
                status,
                triggers,
                status_task,
            }),
        })
    }

    /// Open the configured queue file and talk to the configured HTTP store
    pub async fn from_config(config: &Config, monitor: ConnectivityMonitor) -> Result<Self, SyncError> {
        let db = LocalDatabase::open(config.db_path()).await?;
        let remote = HttpRemoteStore::new(config.remote_url(), config.sync().submit_timeout)
            .with_token(config.token().map(str::to_string));
        Self::start(config.sync().clone(), db, Arc::new(remote), monitor).await
    }

    /// Record a user write; see [`MutationRecorder::perform`]
    pub async fn perform(
        &self,
        kind: OperationKind,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        payload: Value,
    ) -> Result<PerformOutcome, SyncError> {
        self.inner
            .recorder
            .perform(kind, entity_type, entity_id, payload)
            .await
    }

    /// Run a pass now and wait for its report
    pub async fn sync(&self) -> Result<SyncReport, SyncError> {
        self.inner.synchronizer.sync().await
    }

    /// Ask for a pass without waiting for it
    pub fn request_sync(&self) -> bool {
        self.inner.triggers.request_sync()
    }

    /// Entry point for OS background-task callbacks
    pub fn background_signal(&self) -> bool {
        self.inner.triggers.background_signal()
    }

    pub fn status(&self) -> SyncStatus {
        self.inner.status.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }

    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.inner.monitor
    }

    pub fn queue(&self) -> &DurableQueue {
        &self.inner.queue
    }

    /// Records waiting for a user decision
    pub async fn list_terminal(&self) -> Result<Vec<QueueRecord>, SyncError> {
        self.inner.queue.list_terminal().await
    }

    /// Drop a terminal record; later records of its entity become syncable
    pub async fn discard(&self, operation_id: OperationId) -> Result<QueueRecord, SyncError> {
        let record = self.inner.queue.discard(operation_id).await?;
        self.request_sync();
        Ok(record)
    }

    /// Give a terminal record a fresh set of attempts
    pub async fn retry_terminal(&self, operation_id: OperationId) -> Result<QueueRecord, SyncError> {
        let record = self.inner.queue.retry_terminal(operation_id).await?;
        self.request_sync();
        Ok(record)
    }

    /// Stop reacting to triggers; a running pass still completes
    pub async fn shutdown(&self) {
        self.inner.triggers.shutdown().await;
        self.inner.status_task.abort();
        tracing::info!(holder = self.inner.synchronizer.holder(), "sync manager stopped");
    }
}
