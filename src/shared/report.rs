//! Sync pass reports
//!
//! Outcome counters of one synchronizer pass. Reports are persisted in the
//! local database so a context that waited on another context's pass can
//! read the result back.

use serde::{Deserialize, Serialize};

/// Outcome of one synchronizer pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Records acknowledged by the remote store and removed locally
    pub succeeded: u32,
    /// Records that failed and were rescheduled
    pub retried: u32,
    /// Records that reached the retry ceiling during this pass
    pub terminal: u32,
    /// Records skipped because their backoff window had not elapsed
    #[serde(default)]
    pub deferred: u32,
    /// Records held back behind an unfinished or terminal record of the same entity
    #[serde(default)]
    pub held: u32,
    /// Set when the remote store became unreachable and the pass stopped early
    #[serde(default)]
    pub aborted: Option<String>,
    /// Set when this pass took over a lock abandoned by another context
    #[serde(default)]
    pub reclaimed_stale_lock: bool,
}

impl SyncReport {
    /// Fold the counters of a partition into this report
    pub fn merge(&mut self, other: SyncReport) {
        self.succeeded += other.succeeded;
        self.retried += other.retried;
        self.terminal += other.terminal;
        self.deferred += other.deferred;
        self.held += other.held;
        if self.aborted.is_none() {
            self.aborted = other.aborted;
        }
        self.reclaimed_stale_lock |= other.reclaimed_stale_lock;
    }

    /// Number of records the pass looked at
    pub fn processed(&self) -> u32 {
        self.succeeded + self.retried + self.terminal
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }
}
