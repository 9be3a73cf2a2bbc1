//! Mock server helpers for the HTTP remote store
//!
//! Thin wrappers over `wiremock` for the two endpoints the client calls.

use booking_sync::client::remote::HttpRemoteStore;
use booking_sync::shared::EntityKey;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mount path prefix of the document service
pub const API_PREFIX: &str = "/api";

pub fn mutations_path(entity: &EntityKey) -> String {
    format!("{}/{}/{}/mutations", API_PREFIX, entity.entity_type, entity.entity_id)
}

pub fn document_path(entity: &EntityKey) -> String {
    format!("{}/{}/{}", API_PREFIX, entity.entity_type, entity.entity_id)
}

/// Client pointed at `server`
pub fn http_store(server: &MockServer, timeout: Duration) -> HttpRemoteStore {
    HttpRemoteStore::new(format!("{}{}", server.uri(), API_PREFIX), timeout)
}

/// Answer every mutation of `entity` with `template`
pub async fn mount_mutation_response(server: &MockServer, entity: &EntityKey, template: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path(mutations_path(entity)))
        .respond_with(template)
        .mount(server)
        .await;
}

/// Successful acknowledgement body
pub fn ack_body() -> serde_json::Value {
    json!({ "server_timestamp": "2025-03-01T12:00:00Z" })
}
