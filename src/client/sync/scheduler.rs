//! # Retry Scheduler
//!
//! Wakes the trigger surface when the earliest backoff window of the queue
//! elapses. Only one wakeup is armed at a time: scheduling again replaces the
//! previous timer, and cancelling aborts it.

use super::trigger::SyncTrigger;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

#[derive(Debug)]
struct ArmedTimer {
    at: DateTime<Utc>,
    handle: JoinHandle<()>,
}

/// Single cancellable wakeup feeding [`SyncTrigger::RetryDue`]
#[derive(Debug)]
pub struct RetryScheduler {
    triggers: mpsc::Sender<SyncTrigger>,
    armed: Mutex<Option<ArmedTimer>>,
}

impl RetryScheduler {
    pub fn new(triggers: mpsc::Sender<SyncTrigger>) -> Self {
        Self {
            triggers,
            armed: Mutex::new(None),
        }
    }

    /// Arm a wakeup at `at`, replacing any earlier one
    pub async fn schedule(&self, at: DateTime<Utc>) {
        let mut armed = self.armed.lock().await;
        if let Some(previous) = armed.take() {
            previous.handle.abort();
        }

        let delay = at
            .signed_duration_since(Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let triggers = self.triggers.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // A full channel already carries a pending trigger
            let _ = triggers.try_send(SyncTrigger::RetryDue);
        });

        tracing::debug!(%at, delay_ms = delay.as_millis() as u64, "retry wakeup scheduled");
        *armed = Some(ArmedTimer { at, handle });
    }

    /// Abort the armed wakeup, if any
    pub async fn cancel(&self) {
        if let Some(previous) = self.armed.lock().await.take() {
            previous.handle.abort();
        }
    }

    /// Time of the armed wakeup, if it has not fired yet
    pub async fn scheduled_at(&self) -> Option<DateTime<Utc>> {
        self.armed
            .lock()
            .await
            .as_ref()
            .filter(|timer| !timer.handle.is_finished())
            .map(|timer| timer.at)
    }
}

impl Drop for RetryScheduler {
    fn drop(&mut self) {
        if let Some(timer) = self.armed.get_mut().take() {
            timer.handle.abort();
        }
    }
}
