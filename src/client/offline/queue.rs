//! # Durable Operation Queue
//!
//! The persistent, ordered log of pending mutations. Every call returns only
//! after SQLite has committed the change, so a crash right after `enqueue`
//! never loses the record.
//!
//! ## Features
//!
//! - **Persistent Queue**: records survive restarts (see [`LocalDatabase`])
//! - **Ordering**: `list_pending` yields records oldest first, which keeps
//!   every entity's records in FIFO order
//! - **Status Tracking**: pending, in flight, retryable and terminal records
//! - **Depth Notifications**: each mutating call publishes the new queue depth,
//!   status-only changes included
//!
//! ## Usage
//!
//! ```rust,no_run
//! use booking_sync::client::local_db::LocalDatabase;
//! use booking_sync::client::offline::DurableQueue;
//! use booking_sync::shared::record::{Mutation, OperationKind, QueueRecord};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), booking_sync::shared::SyncError> {
//! let queue = DurableQueue::new(LocalDatabase::in_memory().await?).await?;
//! let mutation = Mutation::new(OperationKind::Update, "bookings", "B1", json!({ "status": "Approved" }));
//! let id = queue.enqueue(QueueRecord::pending(mutation)).await?;
//!
//! for record in queue.list_pending().await? {
//!     // submit...
//!     queue.remove(record.operation_id()).await?;
//! }
//! # let _ = id;
//! # Ok(())
//! # }
//! ```

use crate::client::local_db::LocalDatabase;
use crate::shared::error::SyncError;
use crate::shared::record::{EntityKey, OperationId, QueueRecord, RecordPatch, RecordStatus};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;

/// Durable queue of pending mutations
#[derive(Debug, Clone)]
pub struct DurableQueue {
    /// Local database holding the records
    db: LocalDatabase,
    /// Queue depth notifications
    depth: Arc<watch::Sender<u64>>,
}

impl DurableQueue {
    /// Wrap a database, seeding the depth channel with the stored record count
    pub async fn new(db: LocalDatabase) -> Result<Self, SyncError> {
        let count = db.count_records().await?;
        let (depth, _) = watch::channel(count);
        Ok(Self {
            db,
            depth: Arc::new(depth),
        })
    }

    /// Underlying database
    pub fn database(&self) -> &LocalDatabase {
        &self.db
    }

    /// Persist a record
    ///
    /// Enqueueing an operation id that is already stored keeps the existing
    /// record, so one user action is never represented twice.
    pub async fn enqueue(&self, record: QueueRecord) -> Result<OperationId, SyncError> {
        let operation_id = record.operation_id();
        if self.db.insert_record(&record).await? {
            tracing::debug!(
                %operation_id,
                entity = %record.entity(),
                kind = record.mutation.kind.as_str(),
                "queued mutation"
            );
            self.publish_depth().await?;
        } else {
            tracing::debug!(%operation_id, "mutation already queued");
        }
        Ok(operation_id)
    }

    /// Records eligible for synchronization, ordered by `created_at`
    pub async fn list_pending(&self) -> Result<Vec<QueueRecord>, SyncError> {
        self.db.fetch_syncable().await
    }

    /// Records that reached the retry ceiling
    pub async fn list_terminal(&self) -> Result<Vec<QueueRecord>, SyncError> {
        self.db.fetch_by_status(RecordStatus::FailedTerminal).await
    }

    pub async fn get(&self, operation_id: OperationId) -> Result<Option<QueueRecord>, SyncError> {
        self.db.fetch_record(operation_id).await
    }

    /// Update a record's sync metadata
    pub async fn update(
        &self,
        operation_id: OperationId,
        patch: RecordPatch,
    ) -> Result<QueueRecord, SyncError> {
        let record = self.db.patch_record(operation_id, patch).await?;
        self.publish_depth().await?;
        Ok(record)
    }

    /// Remove a record after the remote store acknowledged it
    pub async fn remove(&self, operation_id: OperationId) -> Result<(), SyncError> {
        if !self.db.delete_record(operation_id).await? {
            return Err(SyncError::RecordNotFound(operation_id));
        }
        self.publish_depth().await
    }

    /// Total number of stored records
    pub async fn count(&self) -> Result<u64, SyncError> {
        self.db.count_records().await
    }

    pub async fn count_by_status(&self, status: RecordStatus) -> Result<u64, SyncError> {
        self.db.count_with_status(status).await
    }

    /// Whether `entity` still has queued writes in any state
    pub async fn has_records_for(&self, entity: &EntityKey) -> Result<bool, SyncError> {
        self.db.has_records_for(entity).await
    }

    /// Entities whose queue is blocked by a terminal record
    pub async fn terminal_entities(&self) -> Result<HashSet<EntityKey>, SyncError> {
        self.db.terminal_entity_keys().await
    }

    /// Return records left in flight by an interrupted pass to pending
    pub async fn reset_in_flight(&self) -> Result<u64, SyncError> {
        let reset = self.db.reset_in_flight().await?;
        if reset > 0 {
            tracing::info!(reset, "returned interrupted records to pending");
            self.publish_depth().await?;
        }
        Ok(reset)
    }

    /// Earliest backoff deadline among retryable records
    pub async fn next_retry_at(&self) -> Result<Option<DateTime<Utc>>, SyncError> {
        self.db.earliest_retry().await
    }

    /// Drop a terminal record on the user's request
    pub async fn discard(&self, operation_id: OperationId) -> Result<QueueRecord, SyncError> {
        let record = self.require_terminal(operation_id, "discard").await?;
        self.remove(operation_id).await?;
        tracing::info!(%operation_id, entity = %record.entity(), "discarded terminal mutation");
        Ok(record)
    }

    /// Give a terminal record a fresh set of attempts on the user's request
    pub async fn retry_terminal(&self, operation_id: OperationId) -> Result<QueueRecord, SyncError> {
        self.require_terminal(operation_id, "retry").await?;
        let record = self
            .update(
                operation_id,
                RecordPatch {
                    status: Some(RecordStatus::Pending),
                    attempt_count: Some(0),
                    last_error: Some(None),
                    next_attempt_at: Some(None),
                },
            )
            .await?;
        tracing::info!(%operation_id, entity = %record.entity(), "terminal mutation re-queued");
        Ok(record)
    }

    /// Subscribe to queue depth changes
    pub fn subscribe_depth(&self) -> watch::Receiver<u64> {
        self.depth.subscribe()
    }

    async fn require_terminal(
        &self,
        operation_id: OperationId,
        action: &'static str,
    ) -> Result<QueueRecord, SyncError> {
        let record = self
            .get(operation_id)
            .await?
            .ok_or(SyncError::RecordNotFound(operation_id))?;
        if record.status != RecordStatus::FailedTerminal {
            return Err(SyncError::InvalidTransition {
                operation_id,
                status: record.status,
                action,
            });
        }
        Ok(record)
    }

    async fn publish_depth(&self) -> Result<(), SyncError> {
        let count = self.db.count_records().await?;
        // Modify unconditionally so subscribers also hear about status-only changes
        self.depth.send_modify(|depth| *depth = count);
        Ok(())
    }
}
