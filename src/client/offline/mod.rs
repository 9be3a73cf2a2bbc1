//! # Offline Write Queue
//!
//! Keeps user writes durable while the remote store is out of reach.
//!
//! - `queue.rs`: SQLite-backed queue with depth notifications
//! - `recorder.rs`: direct attempt with fallback to the queue
//! - `retry.rs`: retry ceiling and backoff schedule

pub mod queue;
pub mod recorder;
pub mod retry;

pub use queue::DurableQueue;
pub use recorder::{MutationRecorder, PerformOutcome};
pub use retry::{BackoffStrategy, RetryDecision, RetryPolicy};
