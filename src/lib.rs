//! booking-sync - offline write queue for the booking client
//!
//! Records user writes (create, update, delete of remote documents) while the
//! remote store cannot be reached, keeps them across restarts in a local
//! SQLite queue, and replays them exactly once per operation id, in creation
//! order per entity, once connectivity returns.
//!
//! # Module Structure
//!
//! - **`shared`** - plain data shared by every context
//!   - Queue records, mutations, pass reports
//!   - Error types
//!   - Synchronization configuration
//!
//! - **`client`** - the machinery of one context
//!   - Durable queue store and mutation recorder
//!   - Synchronizer with cross-process locking
//!   - Trigger surface and status channel
//!   - Remote store clients
//!
//! # Usage
//!
//! ```rust,no_run
//! use booking_sync::client::local_db::LocalDatabase;
//! use booking_sync::client::remote::InMemoryRemoteStore;
//! use booking_sync::client::sync::ConnectivityMonitor;
//! use booking_sync::client::SyncManager;
//! use booking_sync::shared::{OperationKind, SyncConfig};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), booking_sync::shared::SyncError> {
//! let manager = SyncManager::start(
//!     SyncConfig::default(),
//!     LocalDatabase::open("offline_queue.db").await?,
//!     Arc::new(InMemoryRemoteStore::new()),
//!     ConnectivityMonitor::new(),
//! )
//! .await?;
//!
//! manager
//!     .perform(OperationKind::Update, "bookings", "B1", json!({ "status": "Approved" }))
//!     .await?;
//!
//! let report = manager.sync().await?;
//! println!("{} writes replayed", report.succeeded);
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! All handles are `Send + Sync` and cheap to clone. Queue state lives in
//! SQLite; in-process notifications go through `tokio::sync::watch`.

/// Shared types and data structures
pub mod shared;

/// Offline queue machinery of one context
pub mod client;
