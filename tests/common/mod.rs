//! Common test utilities and helpers
//!
//! This module provides shared utilities for all tests including:
//! - Context fixtures wiring a `SyncManager` to an in-memory remote store
//! - Mock HTTP server helpers for the remote store client
//! - Custom assertion macros

#[macro_use]
pub mod assertions;
pub mod context;
pub mod mock_server;

// Re-export commonly used utilities
pub use context::*;
pub use mock_server::*;
