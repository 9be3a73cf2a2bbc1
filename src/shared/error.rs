//! Shared Error Types
//!
//! Error types for the offline queue and the remote store boundary.
//!
//! # Error Categories
//!
//! - [`RemoteError`] - failures reported by (or on the way to) the remote store
//!   - `Unreachable`, `Timeout` - connectivity failures, deferred to the queue
//!   - `Unavailable` - transient server-side failure, deferred to the queue
//!   - `Rejected` - deterministic rejection, surfaced to the caller
//!   - `AlreadyApplied` - idempotency conflict, treated as success
//! - [`SyncError`] - failures surfaced by the recorder and the synchronizer
//!
//! # Usage
//!
//! ```rust
//! use booking_sync::shared::error::{RejectionCode, RemoteError};
//!
//! let error = RemoteError::rejected(RejectionCode::Validation, "amount must be positive");
//! assert!(!error.is_transient());
//! ```
//!
//! # Thread Safety
//!
//! All error types are `Send + Sync + Clone` so a single pass outcome can be
//! handed to every caller waiting on it.
use crate::shared::record::{Mutation, OperationId, RecordStatus};
use std::time::Duration;
use thiserror::Error;

/// Why the remote store refused an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionCode {
    /// Payload failed the remote store's validation
    Validation,
    /// Caller lacks permission for the target document
    PermissionDenied,
    /// Target document does not exist
    NotFound,
    /// Target document is in a state that forbids the operation
    Conflict,
}

impl std::fmt::Display for RejectionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RejectionCode::Validation => "validation",
            RejectionCode::PermissionDenied => "permission denied",
            RejectionCode::NotFound => "not found",
            RejectionCode::Conflict => "conflict",
        };
        f.write_str(name)
    }
}

/// Errors returned by a [`RemoteStore`](crate::client::remote::RemoteStore)
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RemoteError {
    /// Network unreachable, connection refused, DNS failure
    #[error("remote store unreachable: {message}")]
    Unreachable {
        /// Human-readable error message
        message: String,
    },

    /// No response within the submission timeout
    #[error("remote store did not answer within {0:?}")]
    Timeout(Duration),

    /// Remote store answered with a transient server-side failure
    #[error("remote store unavailable: {message}")]
    Unavailable {
        /// Human-readable error message
        message: String,
    },

    /// Remote store refused the operation; retrying will not help
    #[error("remote store rejected the operation ({code}): {reason}")]
    Rejected {
        code: RejectionCode,
        reason: String,
    },

    /// The operation id was already applied by an earlier submission
    #[error("operation {0} was already applied")]
    AlreadyApplied(OperationId),
}

impl RemoteError {
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable {
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn rejected(code: RejectionCode, reason: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            reason: reason.into(),
        }
    }

    /// Failures caused by the network rather than by the request
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::Timeout(_))
    }

    /// Failures worth deferring to the offline queue
    pub fn is_transient(&self) -> bool {
        self.is_connectivity() || matches!(self, Self::Unavailable { .. })
    }
}

/// Errors surfaced by the offline queue
#[derive(Debug, Error, Clone)]
pub enum SyncError {
    /// The remote store refused a write; it was not queued
    #[error("operation {operation_id} rejected ({code}): {reason}")]
    Rejected {
        operation_id: OperationId,
        code: RejectionCode,
        reason: String,
    },

    /// The local queue could not be read or written.
    ///
    /// When raised while enqueueing, `lost` carries the user action that
    /// could not be persisted.
    #[error("queue storage failure: {message}")]
    QueueStorage {
        /// Human-readable error message
        message: String,
        /// Mutation that was not persisted, if any
        lost: Option<Box<Mutation>>,
    },

    /// A payload or persisted report could not be (de)serialized
    #[error("serialization error: {message}")]
    Serialization {
        /// Human-readable error message
        message: String,
    },

    /// No record with this operation id exists
    #[error("no queued operation {0}")]
    RecordNotFound(OperationId),

    /// The record is not in a state that allows the requested change
    #[error("operation {operation_id} is {status:?}, cannot {action}")]
    InvalidTransition {
        operation_id: OperationId,
        status: RecordStatus,
        action: &'static str,
    },

    /// The pass this caller was waiting on ended without a result
    #[error("sync pass ended without reporting a result")]
    PassAborted,

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::QueueStorage {
            message: message.into(),
            lost: None,
        }
    }

    /// Attach the mutation that could not be persisted
    pub fn with_lost(self, mutation: Mutation) -> Self {
        match self {
            Self::QueueStorage { message, .. } => Self::QueueStorage {
                message,
                lost: Some(Box::new(mutation)),
            },
            other => other,
        }
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, Self::QueueStorage { .. })
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        Self::storage(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: format!("JSON error: {}", err),
        }
    }
}
