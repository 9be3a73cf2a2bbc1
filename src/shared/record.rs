//! Queue Record Model
//!
//! Types describing a pending local write and its synchronization metadata.
//!
//! A [`Mutation`] is the user intent exactly as it is submitted to the remote
//! store. A [`QueueRecord`] wraps a mutation with the bookkeeping the
//! synchronizer needs: ordering timestamp, attempt counter, status and the
//! backoff schedule.
//!
//! # Usage
//!
//! ```rust
//! use booking_sync::shared::record::{Mutation, OperationKind, QueueRecord};
//! use serde_json::json;
//!
//! let mutation = Mutation::new(OperationKind::Update, "bookings", "B1", json!({ "status": "Approved" }));
//! let record = QueueRecord::pending(mutation);
//! assert_eq!(record.attempt_count, 0);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Idempotency key of a queued mutation
pub type OperationId = Uuid;

/// Address of a document in the remote store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    /// Collection name (e.g. `bookings`)
    pub entity_type: String,
    /// Document id within the collection
    pub entity_id: String,
}

impl EntityKey {
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.entity_id)
    }
}

/// Kind of write carried by a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    /// Name used in the local database and on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "create" => Some(OperationKind::Create),
            "update" => Some(OperationKind::Update),
            "delete" => Some(OperationKind::Delete),
            _ => None,
        }
    }
}

/// Synchronization status of a queued record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Waiting for the next sync pass
    Pending,
    /// Submitted by the current sync pass
    InFlight,
    /// Failed, will be retried once its backoff has elapsed
    FailedRetryable,
    /// Retry ceiling reached; kept for reporting, never retried automatically
    FailedTerminal,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::InFlight => "in_flight",
            RecordStatus::FailedRetryable => "failed_retryable",
            RecordStatus::FailedTerminal => "failed_terminal",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(RecordStatus::Pending),
            "in_flight" => Some(RecordStatus::InFlight),
            "failed_retryable" => Some(RecordStatus::FailedRetryable),
            "failed_terminal" => Some(RecordStatus::FailedTerminal),
            _ => None,
        }
    }

    /// Whether a sync pass may pick the record up
    pub fn is_syncable(&self) -> bool {
        matches!(self, RecordStatus::Pending | RecordStatus::FailedRetryable)
    }
}

/// A write intended for the remote store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    /// Idempotency token, generated when the user acted
    pub operation_id: OperationId,
    /// Target document
    #[serde(flatten)]
    pub entity: EntityKey,
    /// Create, update or delete
    pub kind: OperationKind,
    /// Field-level changes; partial for updates
    pub payload: serde_json::Value,
}

impl Mutation {
    /// Build a mutation with a freshly generated operation id
    pub fn new(
        kind: OperationKind,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            operation_id: Uuid::new_v4(),
            entity: EntityKey::new(entity_type, entity_id),
            kind,
            payload,
        }
    }
}

/// A persisted mutation awaiting synchronization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueRecord {
    #[serde(flatten)]
    pub mutation: Mutation,
    /// Local time of the user action, used for ordering
    pub created_at: DateTime<Utc>,
    /// Number of synchronization attempts so far
    pub attempt_count: u32,
    /// Reason of the last failure
    pub last_error: Option<String>,
    pub status: RecordStatus,
    /// Earliest time the record may be retried
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl QueueRecord {
    /// Wrap a mutation as a fresh pending record stamped with the current time
    pub fn pending(mutation: Mutation) -> Self {
        Self::pending_at(mutation, Utc::now())
    }

    pub fn pending_at(mutation: Mutation, created_at: DateTime<Utc>) -> Self {
        Self {
            mutation,
            created_at,
            attempt_count: 0,
            last_error: None,
            status: RecordStatus::Pending,
            next_attempt_at: None,
        }
    }

    pub fn operation_id(&self) -> OperationId {
        self.mutation.operation_id
    }

    pub fn entity(&self) -> &EntityKey {
        &self.mutation.entity
    }

    /// Whether the backoff window has elapsed at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_attempt_at.map_or(true, |at| at <= now)
    }

    /// Apply a patch in place
    pub fn apply(&mut self, patch: RecordPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(attempt_count) = patch.attempt_count {
            self.attempt_count = attempt_count;
        }
        if let Some(last_error) = patch.last_error {
            self.last_error = last_error;
        }
        if let Some(next_attempt_at) = patch.next_attempt_at {
            self.next_attempt_at = next_attempt_at;
        }
    }
}

/// Partial update of a record's synchronization metadata
///
/// `None` leaves a field untouched; the nested options allow clearing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub status: Option<RecordStatus>,
    pub attempt_count: Option<u32>,
    pub last_error: Option<Option<String>>,
    pub next_attempt_at: Option<Option<DateTime<Utc>>>,
}

impl RecordPatch {
    pub fn status(status: RecordStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_attempts(mut self, attempt_count: u32) -> Self {
        self.attempt_count = Some(attempt_count);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.last_error = Some(Some(error.into()));
        self
    }

    pub fn with_next_attempt(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.next_attempt_at = Some(at);
        self
    }
}
