//! Shared Module
//!
//! Types shared between the foreground client and the background worker:
//! the queue record model, pass reports, error types and configuration.
//! Everything here is plain data and serializes with serde.

/// Queue record data model
pub mod record;

/// Sync pass reports
pub mod report;

/// Shared error types
pub mod error;

/// Synchronization configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use config::{ConfigError, SyncConfig, SyncConfigBuilder};
pub use error::{RejectionCode, RemoteError, SyncError};
pub use record::{EntityKey, Mutation, OperationId, OperationKind, QueueRecord, RecordPatch, RecordStatus};
pub use report::SyncReport;
