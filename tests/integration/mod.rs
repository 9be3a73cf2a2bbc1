//! Integration tests
//!
//! Exercise `SyncManager` end to end against the in-memory remote store,
//! and the HTTP remote store against a mock server.

pub mod concurrency_test;
pub mod idempotency_test;
pub mod restart_test;
pub mod terminal_failure_test;
pub mod trigger_test;
