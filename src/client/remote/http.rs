//! HTTP remote store client
//!
//! Talks to the document service over JSON:
//!
//! - `GET  {base}/{entity_type}/{entity_id}` reads a document (404 = absent)
//! - `POST {base}/{entity_type}/{entity_id}/mutations` applies a mutation; the
//!   operation id travels both in the body and in the `Idempotency-Key` header
//!
//! Status codes map onto [`RemoteError`] so the recorder and synchronizer can
//! tell deferrable failures from deterministic rejections.

use super::{Ack, Document, RemoteStore};
use crate::shared::error::{RejectionCode, RemoteError};
use crate::shared::record::{EntityKey, Mutation};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use std::time::Duration;

/// Header carrying the operation id
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Remote store reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: Client,
    base_url: String,
    token: Option<String>,
    timeout: Duration,
}

#[derive(Serialize)]
struct MutationBody<'a> {
    operation_id: String,
    kind: &'static str,
    payload: &'a serde_json::Value,
}

impl HttpRemoteStore {
    /// Create a client for `base_url` with a per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            timeout,
        }
    }

    /// Send `Authorization: Bearer <token>` with every request
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn document_url(&self, entity: &EntityKey) -> String {
        format!("{}/{}/{}", self.base_url, entity.entity_type, entity.entity_id)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> RemoteError {
        if err.is_timeout() {
            RemoteError::Timeout(self.timeout)
        } else {
            RemoteError::unreachable(format!("Network error: {}", err))
        }
    }

    async fn status_error(response: Response, mutation: Option<&Mutation>) -> RemoteError {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| status.to_string());

        match status {
            StatusCode::CONFLICT => match mutation {
                Some(mutation) => RemoteError::AlreadyApplied(mutation.operation_id),
                None => RemoteError::rejected(RejectionCode::Conflict, body),
            },
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                RemoteError::rejected(RejectionCode::Validation, body)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                RemoteError::rejected(RejectionCode::PermissionDenied, body)
            }
            StatusCode::NOT_FOUND | StatusCode::GONE => {
                RemoteError::rejected(RejectionCode::NotFound, body)
            }
            StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
                RemoteError::unavailable(format!("{} - {}", status, body))
            }
            status if status.is_server_error() => {
                RemoteError::unavailable(format!("{} - {}", status, body))
            }
            status => RemoteError::rejected(
                RejectionCode::Validation,
                format!("unexpected status {} - {}", status, body),
            ),
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn get(&self, entity: &EntityKey) -> Result<Option<Document>, RemoteError> {
        let request = self
            .authorize(self.client.get(self.document_url(entity)))
            .timeout(self.timeout);

        let response = request.send().await.map_err(|e| self.transport_error(e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::status_error(response, None).await);
        }

        response
            .json::<Document>()
            .await
            .map(Some)
            .map_err(|e| RemoteError::unavailable(format!("malformed document: {}", e)))
    }

    async fn apply_idempotent(&self, mutation: &Mutation) -> Result<Ack, RemoteError> {
        let url = format!("{}/mutations", self.document_url(&mutation.entity));
        let body = MutationBody {
            operation_id: mutation.operation_id.to_string(),
            kind: mutation.kind.as_str(),
            payload: &mutation.payload,
        };

        let request = self
            .authorize(self.client.post(&url))
            .header(IDEMPOTENCY_HEADER, mutation.operation_id.to_string())
            .timeout(self.timeout)
            .json(&body);

        let response = request.send().await.map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            return Err(Self::status_error(response, Some(mutation)).await);
        }

        response
            .json::<Ack>()
            .await
            .map_err(|e| RemoteError::unavailable(format!("malformed acknowledgement: {}", e)))
    }
}
