//! In-memory remote store
//!
//! A process-local stand-in for the hosted document database. It applies
//! mutations with the same contract as the real service (idempotent per
//! operation id, field-level last-write-wins for updates, server-assigned
//! timestamps) and lets callers inject the failures the offline queue has to
//! cope with: lost connectivity, rejections, transient server errors and
//! responses lost after the write was applied.

use super::{Ack, Document, RemoteStore};
use crate::shared::error::{RejectionCode, RemoteError};
use crate::shared::record::{EntityKey, Mutation, OperationId, OperationKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct RemoteState {
    documents: HashMap<EntityKey, Document>,
    applied: HashMap<OperationId, Ack>,
    history: Vec<Mutation>,
    offline: bool,
    rejections: HashMap<EntityKey, (RejectionCode, String)>,
    scripted_failures: VecDeque<RemoteError>,
    lost_responses: u32,
    submissions: u64,
    latency: Option<Duration>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl RemoteState {
    /// Strictly increasing server clock
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_timestamp {
            Some(last) if last >= now => last + chrono::Duration::milliseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(ts);
        ts
    }

    fn write(&mut self, mutation: &Mutation, at: DateTime<Utc>) -> Result<(), RemoteError> {
        let key = &mutation.entity;
        match mutation.kind {
            OperationKind::Create => {
                if self.documents.contains_key(key) {
                    return Err(RemoteError::rejected(
                        RejectionCode::Conflict,
                        format!("{} already exists", key),
                    ));
                }
                let fields = object_fields(&mutation.payload)?;
                self.documents.insert(
                    key.clone(),
                    Document {
                        entity_type: key.entity_type.clone(),
                        entity_id: key.entity_id.clone(),
                        fields,
                        updated_at: at,
                    },
                );
            }
            OperationKind::Update => {
                let fields = object_fields(&mutation.payload)?;
                let document = self.documents.get_mut(key).ok_or_else(|| {
                    RemoteError::rejected(RejectionCode::NotFound, format!("{} does not exist", key))
                })?;
                // Last write wins per field
                for (field, value) in fields {
                    document.fields.insert(field, value);
                }
                document.updated_at = at;
            }
            OperationKind::Delete => {
                if self.documents.remove(key).is_none() {
                    return Err(RemoteError::rejected(
                        RejectionCode::NotFound,
                        format!("{} does not exist", key),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn object_fields(payload: &Value) -> Result<serde_json::Map<String, Value>, RemoteError> {
    match payload {
        Value::Object(map) => Ok(map.clone()),
        _ => Err(RemoteError::rejected(
            RejectionCode::Validation,
            "payload must be a JSON object",
        )),
    }
}

/// Remote store kept in process memory
#[derive(Debug, Default)]
pub struct InMemoryRemoteStore {
    state: Mutex<RemoteState>,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate losing or regaining the network
    pub async fn set_online(&self, online: bool) {
        self.state.lock().await.offline = !online;
    }

    /// Reject every mutation targeting `entity`
    pub async fn reject_entity(&self, entity: EntityKey, code: RejectionCode, reason: impl Into<String>) {
        self.state
            .lock()
            .await
            .rejections
            .insert(entity, (code, reason.into()));
    }

    pub async fn clear_rejection(&self, entity: &EntityKey) {
        self.state.lock().await.rejections.remove(entity);
    }

    /// Fail the next submission with `error`, before anything is applied
    pub async fn fail_next(&self, error: RemoteError) {
        self.state.lock().await.scripted_failures.push_back(error);
    }

    /// Apply the next `count` submissions but report them as unreachable,
    /// as if the response had been lost on the way back
    pub async fn lose_next_responses(&self, count: u32) {
        self.state.lock().await.lost_responses += count;
    }

    /// Delay every submission, to widen race windows in tests
    pub async fn set_latency(&self, latency: Option<Duration>) {
        self.state.lock().await.latency = latency;
    }

    /// Insert a document directly, bypassing the mutation log
    pub async fn seed(&self, entity: EntityKey, fields: serde_json::Map<String, Value>) {
        let mut state = self.state.lock().await;
        let updated_at = state.next_timestamp();
        state.documents.insert(
            entity.clone(),
            Document {
                entity_type: entity.entity_type,
                entity_id: entity.entity_id,
                fields,
                updated_at,
            },
        );
    }

    pub async fn document(&self, entity: &EntityKey) -> Option<Document> {
        self.state.lock().await.documents.get(entity).cloned()
    }

    /// Mutations in the order they were applied
    pub async fn applied(&self) -> Vec<Mutation> {
        self.state.lock().await.history.clone()
    }

    /// Number of `apply_idempotent` calls received, including failed ones
    pub async fn submission_count(&self) -> u64 {
        self.state.lock().await.submissions
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn get(&self, entity: &EntityKey) -> Result<Option<Document>, RemoteError> {
        let state = self.state.lock().await;
        if state.offline {
            return Err(RemoteError::unreachable("network is offline"));
        }
        Ok(state.documents.get(entity).cloned())
    }

    async fn apply_idempotent(&self, mutation: &Mutation) -> Result<Ack, RemoteError> {
        let latency = self.state.lock().await.latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().await;
        state.submissions += 1;

        if state.offline {
            return Err(RemoteError::unreachable("network is offline"));
        }
        if let Some(error) = state.scripted_failures.pop_front() {
            return Err(error);
        }
        if state.applied.contains_key(&mutation.operation_id) {
            return Err(RemoteError::AlreadyApplied(mutation.operation_id));
        }
        if let Some((code, reason)) = state.rejections.get(&mutation.entity) {
            return Err(RemoteError::rejected(*code, reason.clone()));
        }

        let at = state.next_timestamp();
        state.write(mutation, at)?;

        let ack = Ack { server_timestamp: at };
        state.applied.insert(mutation.operation_id, ack.clone());
        state.history.push(mutation.clone());

        if state.lost_responses > 0 {
            state.lost_responses -= 1;
            return Err(RemoteError::unreachable("connection reset before response"));
        }
        Ok(ack)
    }
}
