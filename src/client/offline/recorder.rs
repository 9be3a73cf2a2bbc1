//! # Mutation Recorder
//!
//! Entry point for every user-initiated write. The recorder tries the remote
//! store first and falls back to the durable queue when the store cannot be
//! reached, so the interface layer never waits on the network beyond one
//! bounded attempt.
//!
//! A write for an entity that still has queued records goes to the back of
//! the queue instead of the remote store, so it can never overtake them.
//!
//! The operation id is minted before the direct attempt. If that attempt
//! reached the store but its answer was lost, the queued replay carries the
//! same id and the store recognizes it as already applied.

use super::queue::DurableQueue;
use crate::client::remote::{Ack, RemoteStore};
use crate::client::sync::network_monitor::ConnectivityMonitor;
use crate::client::sync::status::StatusChannel;
use crate::shared::error::{RemoteError, SyncError};
use crate::shared::record::{Mutation, OperationId, OperationKind, QueueRecord};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// What happened to a user action
#[derive(Debug, Clone, PartialEq)]
pub enum PerformOutcome {
    /// The remote store holds the write
    Applied {
        operation_id: OperationId,
        /// Absent when the store reported the id as already applied
        ack: Option<Ack>,
    },
    /// The write is stored locally and will be replayed by the synchronizer
    Queued(OperationId),
}

impl PerformOutcome {
    pub fn operation_id(&self) -> OperationId {
        match self {
            PerformOutcome::Applied { operation_id, .. } => *operation_id,
            PerformOutcome::Queued(operation_id) => *operation_id,
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, PerformOutcome::Queued(_))
    }
}

/// Records user writes against the remote store or the offline queue
#[derive(Clone)]
pub struct MutationRecorder {
    queue: DurableQueue,
    remote: Arc<dyn RemoteStore>,
    monitor: ConnectivityMonitor,
    status: StatusChannel,
    submit_timeout: Duration,
}

impl std::fmt::Debug for MutationRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationRecorder")
            .field("submit_timeout", &self.submit_timeout)
            .finish_non_exhaustive()
    }
}

impl MutationRecorder {
    pub fn new(
        queue: DurableQueue,
        remote: Arc<dyn RemoteStore>,
        monitor: ConnectivityMonitor,
        status: StatusChannel,
        submit_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            remote,
            monitor,
            status,
            submit_timeout,
        }
    }

    /// Apply a user write now, or queue it for later
    ///
    /// # Errors
    ///
    /// - [`SyncError::Rejected`] when the store refused the write. Nothing is
    ///   queued; the caller shows the reason to the user.
    /// - [`SyncError::QueueStorage`] when the write had to be queued but the
    ///   queue could not persist it. `lost` carries the mutation.
    pub async fn perform(
        &self,
        kind: OperationKind,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        payload: Value,
    ) -> Result<PerformOutcome, SyncError> {
        let mutation = Mutation::new(kind, entity_type, entity_id, payload);
        let operation_id = mutation.operation_id;

        if !self.monitor.is_online() {
            tracing::debug!(%operation_id, entity = %mutation.entity, "offline, queueing write");
            return self.enqueue(mutation).await;
        }

        match self.queue.has_records_for(&mutation.entity).await {
            Ok(false) => {}
            Ok(true) => {
                tracing::debug!(%operation_id, entity = %mutation.entity, "entity has queued writes, queueing behind them");
                return self.enqueue(mutation).await;
            }
            Err(err) => return Err(self.storage_failure(err, mutation)),
        }

        let submitted = tokio::time::timeout(self.submit_timeout, self.remote.apply_idempotent(&mutation))
            .await
            .unwrap_or(Err(RemoteError::Timeout(self.submit_timeout)));

        match submitted {
            Ok(ack) => {
                tracing::debug!(%operation_id, server_timestamp = %ack.server_timestamp, "write applied");
                Ok(PerformOutcome::Applied {
                    operation_id,
                    ack: Some(ack),
                })
            }
            Err(RemoteError::AlreadyApplied(_)) => Ok(PerformOutcome::Applied {
                operation_id,
                ack: None,
            }),
            Err(RemoteError::Rejected { code, reason }) => {
                tracing::info!(%operation_id, entity = %mutation.entity, %code, %reason, "write rejected");
                Err(SyncError::Rejected {
                    operation_id,
                    code,
                    reason,
                })
            }
            Err(err) => {
                tracing::info!(%operation_id, error = %err, "remote store unavailable, queueing write");
                self.enqueue(mutation).await
            }
        }
    }

    async fn enqueue(&self, mutation: Mutation) -> Result<PerformOutcome, SyncError> {
        match self.queue.enqueue(QueueRecord::pending(mutation.clone())).await {
            Ok(operation_id) => Ok(PerformOutcome::Queued(operation_id)),
            Err(err) => Err(self.storage_failure(err, mutation)),
        }
    }

    fn storage_failure(&self, err: SyncError, mutation: Mutation) -> SyncError {
        tracing::error!(
            operation_id = %mutation.operation_id,
            entity = %mutation.entity,
            kind = mutation.kind.as_str(),
            error = %err,
            "failed to persist offline write, user action lost"
        );
        self.status.record_storage_failure(err.to_string());
        let err = if err.is_storage() {
            err
        } else {
            SyncError::storage(err.to_string())
        };
        err.with_lost(mutation)
    }
}
