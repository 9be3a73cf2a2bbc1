//! # Sync Trigger Surface
//!
//! Decides when the synchronizer runs. Sources:
//!
//! - offline→online edges of the [`ConnectivityMonitor`]
//! - explicit requests from the interface layer
//! - background signals delivered by the host OS
//! - the [`RetryScheduler`] wakeup for the earliest backoff window
//!
//! Triggers travel through a bounded channel and are sent with `try_send`,
//! so firing one never blocks. A burst of triggers collapses into one pass,
//! and triggers that arrive while the context is known to be offline are
//! dropped.
//!
//! A pass that aborts leaves overdue records behind. The next wakeup after
//! an aborted pass is therefore pushed back by its own doubling backoff,
//! reset by the first pass that completes.

use super::network_monitor::{ConnectivityMonitor, NetworkStatus};
use super::scheduler::RetryScheduler;
use super::status::StatusChannel;
use super::Synchronizer;
use crate::client::offline::BackoffStrategy;
use crate::shared::config::SyncConfig;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Shortest wait after an aborted pass
const MIN_ABORT_BACKOFF: Duration = Duration::from_millis(250);

/// Reason a pass was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    ConnectivityRestored,
    Requested,
    BackgroundSignal,
    RetryDue,
}

/// Cheap cloneable sender for sync triggers
#[derive(Debug, Clone)]
pub struct TriggerHandle {
    tx: mpsc::Sender<SyncTrigger>,
}

impl TriggerHandle {
    /// Fire a trigger without waiting
    ///
    /// Returns `false` once the trigger surface has stopped.
    pub fn fire(&self, trigger: SyncTrigger) -> bool {
        match self.tx.try_send(trigger) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::trace!(?trigger, "trigger coalesced with pending ones");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn request_sync(&self) -> bool {
        self.fire(SyncTrigger::Requested)
    }

    pub fn background_signal(&self) -> bool {
        self.fire(SyncTrigger::BackgroundSignal)
    }
}

/// Running trigger loop of one context
#[derive(Debug)]
pub struct TriggerSurface {
    handle: TriggerHandle,
    scheduler: Arc<RetryScheduler>,
    task: JoinHandle<()>,
}

impl TriggerSurface {
    /// Start reacting to triggers
    pub fn spawn(
        synchronizer: Synchronizer,
        monitor: ConnectivityMonitor,
        status: StatusChannel,
        buffer: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let scheduler = Arc::new(RetryScheduler::new(tx.clone()));

        // Seen before spawning so an edge right after `spawn` is not missed
        let mut network = monitor.subscribe();
        let initial = *network.borrow_and_update();
        let task = tokio::spawn(run_loop(
            rx,
            network,
            initial,
            synchronizer,
            monitor,
            status,
            Arc::clone(&scheduler),
        ));

        Self {
            handle: TriggerHandle { tx },
            scheduler,
            task,
        }
    }

    pub fn handle(&self) -> TriggerHandle {
        self.handle.clone()
    }

    pub fn request_sync(&self) -> bool {
        self.handle.request_sync()
    }

    pub fn background_signal(&self) -> bool {
        self.handle.background_signal()
    }

    pub fn scheduler(&self) -> &RetryScheduler {
        &self.scheduler
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the loop and cancel any armed retry wakeup
    ///
    /// A pass already running finishes on its own task.
    pub async fn shutdown(&self) {
        self.task.abort();
        self.scheduler.cancel().await;
        tracing::debug!("trigger surface stopped");
    }
}

async fn run_loop(
    mut triggers: mpsc::Receiver<SyncTrigger>,
    mut network: watch::Receiver<NetworkStatus>,
    mut last_network: NetworkStatus,
    synchronizer: Synchronizer,
    monitor: ConnectivityMonitor,
    status: StatusChannel,
    scheduler: Arc<RetryScheduler>,
) {
    let mut network_open = true;
    let mut aborts = AbortBackoff::new(synchronizer.config());
    arm_retry(&synchronizer, &scheduler, &status, None).await;

    loop {
        let trigger = tokio::select! {
            received = triggers.recv() => match received {
                Some(trigger) => trigger,
                None => break,
            },
            changed = network.changed(), if network_open => {
                if changed.is_err() {
                    network_open = false;
                    continue;
                }
                let current = *network.borrow_and_update();
                status.set_network(current);
                let restored = !last_network.is_online() && current.is_online();
                last_network = current;
                if !restored {
                    continue;
                }
                SyncTrigger::ConnectivityRestored
            }
        };

        let mut coalesced = 0usize;
        while triggers.try_recv().is_ok() {
            coalesced += 1;
        }

        if !monitor.is_online() {
            tracing::debug!(?trigger, coalesced, "offline, skipping sync trigger");
            continue;
        }

        tracing::debug!(?trigger, coalesced, "sync triggered");
        let aborted = match synchronizer.sync().await {
            Ok(report) => report.is_aborted(),
            Err(err) => {
                tracing::error!(?trigger, error = %err, "triggered sync pass failed");
                true
            }
        };

        let not_before = aborts.after_pass(aborted, Utc::now());
        arm_retry(&synchronizer, &scheduler, &status, not_before).await;
    }
}

/// Spacing of wakeups while passes keep aborting
#[derive(Debug)]
struct AbortBackoff {
    backoff: BackoffStrategy,
    consecutive: u32,
}

impl AbortBackoff {
    fn new(config: &SyncConfig) -> Self {
        Self {
            backoff: BackoffStrategy::exponential(
                config.backoff_base.max(MIN_ABORT_BACKOFF),
                config.backoff_max.max(MIN_ABORT_BACKOFF),
            ),
            consecutive: 0,
        }
    }

    /// Earliest time the next wakeup may fire
    fn after_pass(&mut self, aborted: bool, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !aborted {
            self.consecutive = 0;
            return None;
        }
        let delay = self.backoff.delay(self.consecutive);
        self.consecutive = self.consecutive.saturating_add(1);
        let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
        Some(now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC))
    }
}

/// Arm the wakeup for the earliest pending backoff window
///
/// After an aborted pass the wakeup fires no earlier than `not_before`, even
/// when no record is waiting on a backoff window.
async fn arm_retry(
    synchronizer: &Synchronizer,
    scheduler: &RetryScheduler,
    status: &StatusChannel,
    not_before: Option<DateTime<Utc>>,
) {
    let next = match synchronizer.queue().next_retry_at().await {
        Ok(next) => next,
        Err(err) => {
            tracing::error!(error = %err, "failed to read next retry time");
            status.record_storage_failure(err.to_string());
            return;
        }
    };

    match (next, not_before) {
        (Some(at), Some(floor)) => scheduler.schedule(at.max(floor)).await,
        (Some(at), None) => scheduler.schedule(at).await,
        (None, Some(floor)) => scheduler.schedule(floor).await,
        (None, None) => scheduler.cancel().await,
    }
}
