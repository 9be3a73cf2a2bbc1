//! # Remote Store Boundary
//!
//! The hosted document database seen as an opaque, key-addressed collection.
//! The offline queue needs only two calls from it: reading a document and
//! applying a mutation idempotently under its operation id.
//!
//! ## Implementations
//!
//! - [`HttpRemoteStore`]: JSON over HTTP with an `Idempotency-Key` header
//! - [`InMemoryRemoteStore`]: process-local store with fault injection, used
//!   by tests and local development

pub mod http;
pub mod memory;

pub use http::{HttpRemoteStore, IDEMPOTENCY_HEADER};
pub use memory::InMemoryRemoteStore;

use crate::shared::error::RemoteError;
use crate::shared::record::{EntityKey, Mutation};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Acknowledgement of an applied mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    /// Time the remote store applied the mutation
    pub server_timestamp: DateTime<Utc>,
}

/// A document as stored remotely
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub entity_type: String,
    pub entity_id: String,
    pub fields: Map<String, Value>,
    /// Server time of the last applied write
    pub updated_at: DateTime<Utc>,
}

/// Operations the offline queue needs from the remote store
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Read a document; `None` when it does not exist
    async fn get(&self, entity: &EntityKey) -> Result<Option<Document>, RemoteError>;

    /// Apply a mutation at most once per operation id
    ///
    /// A repeated submission of an already applied operation id fails with
    /// [`RemoteError::AlreadyApplied`] and leaves the document untouched.
    async fn apply_idempotent(&self, mutation: &Mutation) -> Result<Ack, RemoteError>;
}
