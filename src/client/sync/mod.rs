//! # Synchronizer
//!
//! Drains the durable queue into the remote store. A pass lists the
//! syncable records, splits them into per-entity partitions that keep
//! creation order, and drains several partitions concurrently while each
//! partition stays strictly sequential.
//!
//! ## At most one pass
//!
//! - Within a process, concurrent [`Synchronizer::sync`] calls join the pass
//!   already running and receive its outcome.
//! - Across processes sharing the queue file, the `sync_lock` row decides who
//!   runs. A context that finds a live lock waits for its release and returns
//!   the report the other context persisted. A lock whose heartbeat went
//!   stale is taken over.
//!
//! ## Failure handling
//!
//! - Acknowledged or already applied: the record is removed.
//! - Rejected, unavailable or timed out: the attempt is counted and the
//!   record is rescheduled with exponential backoff or, at the retry
//!   ceiling, marked terminal. The rest of its partition waits.
//! - Unreachable: the pass stops. The record goes back to pending without
//!   counting an attempt, and no partition starts another record.
//!
//! Passes run on their own task, so dropping a caller never leaves a record
//! half-processed.

pub mod network_monitor;
pub mod scheduler;
pub mod status;
pub mod trigger;

pub use network_monitor::{ConnectivityMonitor, NetworkStatus};
pub use scheduler::RetryScheduler;
pub use status::{StatusChannel, SyncStatus};
pub use trigger::{SyncTrigger, TriggerHandle, TriggerSurface};

use crate::client::local_db::sync::LockAcquisition;
use crate::client::offline::retry::{RetryDecision, RetryPolicy};
use crate::client::offline::DurableQueue;
use crate::client::remote::RemoteStore;
use crate::shared::config::SyncConfig;
use crate::shared::error::{RemoteError, SyncError};
use crate::shared::record::{EntityKey, OperationKind, QueueRecord, RecordPatch, RecordStatus};
use crate::shared::report::SyncReport;
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

type PassOutcome = Result<SyncReport, SyncError>;

/// How a single record attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Applied,
    Retrying,
    Terminal,
    /// Put back untouched because the remote store could not be reached
    Reverted,
}

/// Queue-to-remote synchronizer of one context
#[derive(Clone)]
pub struct Synchronizer {
    inner: Arc<Inner>,
}

struct Inner {
    queue: DurableQueue,
    remote: Arc<dyn RemoteStore>,
    policy: RetryPolicy,
    config: SyncConfig,
    status: StatusChannel,
    /// Identity written into the persisted lock
    holder: String,
    running: Mutex<Option<watch::Receiver<Option<PassOutcome>>>>,
}

impl std::fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("holder", &self.inner.holder)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl Synchronizer {
    pub fn new(
        queue: DurableQueue,
        remote: Arc<dyn RemoteStore>,
        config: SyncConfig,
        status: StatusChannel,
    ) -> Self {
        let holder = format!("{}-{}", std::process::id(), Uuid::new_v4());
        Self {
            inner: Arc::new(Inner {
                queue,
                remote,
                policy: RetryPolicy::from_config(&config),
                config,
                status,
                holder,
                running: Mutex::new(None),
            }),
        }
    }

    /// Lock holder id of this context
    pub fn holder(&self) -> &str {
        &self.inner.holder
    }

    pub fn queue(&self) -> &DurableQueue {
        &self.inner.queue
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Run a pass, or join the one already running in this context
    ///
    /// Connectivity loss is reported through [`SyncReport::aborted`], never as
    /// an error. Errors are local storage failures.
    pub async fn sync(&self) -> PassOutcome {
        let receiver = {
            let mut running = self.inner.running.lock().await;
            // A closed channel means the pass task is gone
            let live = running
                .as_ref()
                .filter(|receiver| receiver.has_changed().is_ok())
                .cloned();
            match live {
                Some(receiver) => {
                    tracing::debug!("joining sync pass already in progress");
                    receiver
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    *running = Some(rx.clone());

                    let inner = Arc::clone(&self.inner);
                    tokio::spawn(async move {
                        let outcome = inner.run_exclusive().await;
                        *inner.running.lock().await = None;
                        tx.send_replace(Some(outcome));
                    });
                    rx
                }
            }
        };

        Self::join(receiver).await
    }

    async fn join(mut receiver: watch::Receiver<Option<PassOutcome>>) -> PassOutcome {
        let outcome = receiver
            .wait_for(Option::is_some)
            .await
            .map_err(|_| SyncError::PassAborted)?;
        match &*outcome {
            Some(outcome) => outcome.clone(),
            None => Err(SyncError::PassAborted),
        }
    }
}

impl Inner {
    async fn run_exclusive(&self) -> PassOutcome {
        self.status.set_syncing(true);
        let outcome = self.acquire_and_run().await;
        self.status.set_syncing(false);

        if let Err(err) = &outcome {
            tracing::error!(error = %err, "sync pass failed");
            self.status.record_storage_failure(err.to_string());
        }
        if let Err(err) = self.status.refresh(&self.queue).await {
            tracing::error!(error = %err, "failed to refresh sync status");
            self.status.record_storage_failure(err.to_string());
        }
        outcome
    }

    async fn acquire_and_run(&self) -> PassOutcome {
        let db = self.queue.database();
        let mut waiting_on: Option<String> = None;

        loop {
            match db
                .try_acquire_sync_lock(&self.holder, self.config.lock_stale_after)
                .await?
            {
                LockAcquisition::Acquired => return self.run_locked(false).await,
                LockAcquisition::Reclaimed { previous_holder } => {
                    tracing::warn!(
                        %previous_holder,
                        holder = %self.holder,
                        "reclaimed stale sync lock"
                    );
                    return self.run_locked(true).await;
                }
                LockAcquisition::HeldBy { holder, heartbeat_at } => {
                    if waiting_on.is_none() {
                        tracing::info!(%holder, %heartbeat_at, "sync pass running in another context, waiting");
                    }
                    waiting_on = Some(holder);
                }
            }

            tokio::time::sleep(self.config.lock_poll_interval).await;

            let current = db.sync_lock_holder().await?;
            let still_held = matches!(
                (&current, &waiting_on),
                (Some((holder, _)), Some(waited)) if holder == waited
            );
            if !still_held {
                return self.persisted_outcome().await;
            }
        }
    }

    /// Report written by the pass another context just finished
    async fn persisted_outcome(&self) -> PassOutcome {
        match self.queue.database().last_sync_pass().await? {
            Some((at, report)) => {
                self.status.record_pass(at, report.clone());
                Ok(report)
            }
            None => Err(SyncError::PassAborted),
        }
    }

    async fn run_locked(&self, reclaimed: bool) -> PassOutcome {
        let outcome = self.run_pass(reclaimed).await;

        match self.queue.database().release_sync_lock(&self.holder).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(holder = %self.holder, "sync lock was taken over during the pass"),
            Err(err) => tracing::error!(error = %err, "failed to release sync lock"),
        }
        outcome
    }

    async fn run_pass(&self, reclaimed: bool) -> PassOutcome {
        let reverted = self.queue.reset_in_flight().await?;
        if reverted > 0 {
            tracing::warn!(reverted, "reverted records left in flight by an interrupted pass");
        }

        let pending = self.queue.list_pending().await?;
        let blocked = self.queue.terminal_entities().await?;

        let mut report = SyncReport {
            reclaimed_stale_lock: reclaimed,
            ..SyncReport::default()
        };

        let mut runnable = Vec::new();
        for (entity, records) in partition(pending) {
            if blocked.contains(&entity) {
                tracing::debug!(%entity, held = records.len(), "entity blocked by a terminal record");
                report.held += records.len() as u32;
            } else {
                runnable.push(records);
            }
        }

        let abort = OnceLock::new();
        let abort_ref = &abort;
        let mut failure: Option<SyncError> = None;
        {
            let mut partials = stream::iter(runnable)
                .map(|records| self.drain_partition(records, abort_ref))
                .buffer_unordered(self.config.max_parallel_partitions);

            while let Some(partial) = partials.next().await {
                match partial {
                    Ok(partial) => report.merge(partial),
                    Err(err) => {
                        let _ = abort.set(err.to_string());
                        failure.get_or_insert(err);
                    }
                }
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }

        if let Some(reason) = abort.get() {
            report.aborted = Some(reason.clone());
            self.queue.reset_in_flight().await?;
        }

        let finished = Utc::now();
        self.queue.database().record_sync_pass(finished, &report).await?;
        self.status.record_pass(finished, report.clone());

        tracing::info!(
            succeeded = report.succeeded,
            retried = report.retried,
            terminal = report.terminal,
            deferred = report.deferred,
            held = report.held,
            aborted = report.aborted.as_deref().unwrap_or(""),
            "sync pass finished"
        );
        Ok(report)
    }

    /// Drain one entity's records in order, stopping at the first record that
    /// does not succeed
    async fn drain_partition(
        &self,
        records: Vec<QueueRecord>,
        abort: &OnceLock<String>,
    ) -> PassOutcome {
        let mut partial = SyncReport::default();
        let total = records.len() as u32;

        for (index, record) in records.into_iter().enumerate() {
            let after = total - index as u32 - 1;

            if abort.get().is_some() {
                break;
            }
            if !record.is_due(Utc::now()) {
                tracing::debug!(
                    operation_id = %record.operation_id(),
                    next_attempt_at = ?record.next_attempt_at,
                    "backoff window not elapsed"
                );
                partial.deferred += after + 1;
                break;
            }

            let attempt = self.attempt(&record, abort).await?;

            if !self.queue.database().heartbeat_sync_lock(&self.holder).await? {
                let _ = abort.set("sync lock lost to another context".to_string());
            }

            match attempt {
                Attempt::Applied => partial.succeeded += 1,
                Attempt::Retrying => {
                    partial.retried += 1;
                    partial.held += after;
                    break;
                }
                Attempt::Terminal => {
                    partial.terminal += 1;
                    partial.held += after;
                    break;
                }
                Attempt::Reverted => break,
            }
        }

        Ok(partial)
    }

    async fn attempt(&self, record: &QueueRecord, abort: &OnceLock<String>) -> Result<Attempt, SyncError> {
        let operation_id = record.operation_id();
        self.queue
            .update(operation_id, RecordPatch::status(RecordStatus::InFlight))
            .await?;

        let submitted = tokio::time::timeout(
            self.config.submit_timeout,
            self.remote.apply_idempotent(&record.mutation),
        )
        .await
        .unwrap_or(Err(RemoteError::Timeout(self.config.submit_timeout)));

        match submitted {
            Ok(ack) => {
                self.queue.remove(operation_id).await?;
                tracing::debug!(%operation_id, server_timestamp = %ack.server_timestamp, "operation applied");
                Ok(Attempt::Applied)
            }
            Err(RemoteError::AlreadyApplied(_)) => {
                self.queue.remove(operation_id).await?;
                tracing::debug!(%operation_id, "operation was already applied remotely");
                Ok(Attempt::Applied)
            }
            Err(err @ RemoteError::Unreachable { .. }) => {
                self.queue
                    .update(operation_id, RecordPatch::status(RecordStatus::Pending))
                    .await?;
                tracing::warn!(%operation_id, error = %err, "remote store unreachable, stopping pass");
                let _ = abort.set(err.to_string());
                Ok(Attempt::Reverted)
            }
            Err(err) => {
                let attempt = self.record_failure(record, &err).await?;
                if matches!(err, RemoteError::Timeout(_)) {
                    let _ = abort.set(err.to_string());
                }
                Ok(attempt)
            }
        }
    }

    async fn record_failure(&self, record: &QueueRecord, err: &RemoteError) -> Result<Attempt, SyncError> {
        let operation_id = record.operation_id();

        match self.policy.decide(record.attempt_count, Utc::now()) {
            RetryDecision::Retry { attempt, next_attempt_at } => {
                self.queue
                    .update(
                        operation_id,
                        RecordPatch::status(RecordStatus::FailedRetryable)
                            .with_attempts(attempt)
                            .with_error(err.to_string())
                            .with_next_attempt(Some(next_attempt_at)),
                    )
                    .await?;
                tracing::warn!(%operation_id, attempt, %next_attempt_at, error = %err, "operation failed, will retry");
                Ok(Attempt::Retrying)
            }
            RetryDecision::GiveUp { attempt } => {
                self.queue
                    .update(
                        operation_id,
                        RecordPatch::status(RecordStatus::FailedTerminal)
                            .with_attempts(attempt)
                            .with_error(err.to_string())
                            .with_next_attempt(None),
                    )
                    .await?;
                if record.mutation.kind == OperationKind::Create {
                    tracing::warn!(
                        %operation_id,
                        entity = %record.entity(),
                        error = %err,
                        "creation failed permanently, user decision required"
                    );
                } else {
                    tracing::warn!(%operation_id, attempt, error = %err, "operation failed permanently");
                }
                Ok(Attempt::Terminal)
            }
        }
    }
}

/// Group records by entity, keeping the queue order within and across groups
fn partition(records: Vec<QueueRecord>) -> Vec<(EntityKey, Vec<QueueRecord>)> {
    let mut index: HashMap<EntityKey, usize> = HashMap::new();
    let mut partitions: Vec<(EntityKey, Vec<QueueRecord>)> = Vec::new();

    for record in records {
        match index.get(record.entity()) {
            Some(&slot) => partitions[slot].1.push(record),
            None => {
                index.insert(record.entity().clone(), partitions.len());
                partitions.push((record.entity().clone(), vec![record]));
            }
        }
    }
    partitions
}
