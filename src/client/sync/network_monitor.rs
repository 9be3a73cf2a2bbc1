//! # Network Monitor
//!
//! Holds the application's view of connectivity and notifies subscribers on
//! every transition. The embedding application feeds it (OS network events,
//! failed health checks); the recorder reads it to skip doomed remote calls
//! and the trigger surface watches it for offline→online edges.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkStatus {
    Online,
    Offline,
}

impl NetworkStatus {
    pub fn is_online(&self) -> bool {
        matches!(self, NetworkStatus::Online)
    }
}

/// Connectivity state shared by every component of one context
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    status: Arc<watch::Sender<NetworkStatus>>,
}

impl ConnectivityMonitor {
    /// Assume online initially; the first failed call or OS event corrects it
    pub fn new() -> Self {
        Self::with_status(NetworkStatus::Online)
    }

    pub fn with_status(initial: NetworkStatus) -> Self {
        let (status, _) = watch::channel(initial);
        Self {
            status: Arc::new(status),
        }
    }

    pub fn get_status(&self) -> NetworkStatus {
        *self.status.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.get_status().is_online()
    }

    /// Record the current connectivity; subscribers are woken only on change
    pub fn set_online(&self, online: bool) {
        let next = if online {
            NetworkStatus::Online
        } else {
            NetworkStatus::Offline
        };
        let changed = self.status.send_if_modified(|status| {
            if *status == next {
                return false;
            }
            *status = next;
            true
        });
        if changed {
            tracing::info!(status = ?next, "connectivity changed");
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.status.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}
