//! # Sync Status Channel
//!
//! Read-only projection of the offline queue for the interface layer:
//! how many writes are waiting, whether any need the user's attention, and
//! how the last sync pass went. Consumers get a [`watch::Receiver`] or a
//! snapshot; only the queue machinery publishes.
//!
//! Queue-derived fields follow the queue's depth notifications (see
//! [`StatusChannel::follow`]), so writes made through any handle to the queue
//! show up here.

use crate::client::offline::DurableQueue;
use crate::client::sync::network_monitor::NetworkStatus;
use crate::shared::error::SyncError;
use crate::shared::record::{OperationId, OperationKind};
use crate::shared::report::SyncReport;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatus {
    /// Records still waiting to reach the remote store
    pub pending_count: u64,
    /// Records that exhausted their retries
    pub terminal_count: u64,
    pub has_terminal_failures: bool,
    /// Terminal creations of locally generated entities, awaiting a user decision
    pub terminal_creates: Vec<OperationId>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_sync_report: Option<SyncReport>,
    /// Whether this context is running a pass right now
    pub syncing: bool,
    pub network: NetworkStatus,
    /// Last failure of the local queue storage; user actions may have been lost
    pub storage_error: Option<String>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            pending_count: 0,
            terminal_count: 0,
            has_terminal_failures: false,
            terminal_creates: Vec::new(),
            last_sync_at: None,
            last_sync_report: None,
            syncing: false,
            network: NetworkStatus::Online,
            storage_error: None,
        }
    }
}

/// Publisher side of the status projection
#[derive(Debug, Clone)]
pub struct StatusChannel {
    tx: Arc<watch::Sender<SyncStatus>>,
    /// Held across read and publish so an older read never overwrites a newer one
    refreshing: Arc<Mutex<()>>,
}

impl StatusChannel {
    pub fn new(network: NetworkStatus) -> Self {
        let (tx, _) = watch::channel(SyncStatus {
            network,
            ..SyncStatus::default()
        });
        Self {
            tx: Arc::new(tx),
            refreshing: Arc::new(Mutex::new(())),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> SyncStatus {
        self.tx.borrow().clone()
    }

    /// Refresh queue-derived fields whenever the queue changes
    ///
    /// The task runs until aborted.
    pub(crate) fn follow(&self, queue: DurableQueue) -> JoinHandle<()> {
        let mut depth = queue.subscribe_depth();
        let status = self.clone();
        tokio::spawn(async move {
            while depth.changed().await.is_ok() {
                if let Err(err) = status.refresh(&queue).await {
                    tracing::error!(error = %err, "failed to refresh sync status");
                    status.record_storage_failure(err.to_string());
                }
            }
        })
    }

    /// Recompute queue-derived fields from storage
    pub(crate) async fn refresh(&self, queue: &DurableQueue) -> Result<(), SyncError> {
        let _guard = self.refreshing.lock().await;
        let total = queue.count().await?;
        let terminal = queue.list_terminal().await?;
        let terminal_creates: Vec<OperationId> = terminal
            .iter()
            .filter(|record| record.mutation.kind == OperationKind::Create)
            .map(|record| record.operation_id())
            .collect();
        let terminal_count = terminal.len() as u64;

        self.tx.send_modify(|status| {
            status.pending_count = total.saturating_sub(terminal_count);
            status.terminal_count = terminal_count;
            status.has_terminal_failures = terminal_count > 0;
            status.terminal_creates = terminal_creates;
        });
        Ok(())
    }

    /// Seed the last pass from storage (e.g. written by another context)
    pub(crate) async fn load_last_pass(&self, queue: &DurableQueue) -> Result<(), SyncError> {
        if let Some((at, report)) = queue.database().last_sync_pass().await? {
            self.record_pass(at, report);
        }
        Ok(())
    }

    pub(crate) fn record_pass(&self, at: DateTime<Utc>, report: SyncReport) {
        self.tx.send_modify(|status| {
            status.last_sync_at = Some(at);
            status.last_sync_report = Some(report);
        });
    }

    pub(crate) fn set_syncing(&self, syncing: bool) {
        self.tx.send_if_modified(|status| {
            let changed = status.syncing != syncing;
            status.syncing = syncing;
            changed
        });
    }

    pub(crate) fn set_network(&self, network: NetworkStatus) {
        self.tx.send_if_modified(|status| {
            let changed = status.network != network;
            status.network = network;
            changed
        });
    }

    pub(crate) fn record_storage_failure(&self, message: impl Into<String>) {
        let message = message.into();
        self.tx.send_modify(|status| status.storage_error = Some(message));
    }
}
