//! Database Schema Definitions
//!
//! Schema version bookkeeping and the DDL of each migration.

/// Current database schema version
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Schema migration versions
pub const MIGRATION_VERSIONS: &[i32] = &[1];

/// Migration 1: offline queue, sync metadata and the cross-context sync lock
pub const MIGRATION_1: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS offline_queue (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        operation_id TEXT NOT NULL UNIQUE,
        entity_type TEXT NOT NULL,
        entity_id TEXT NOT NULL,
        operation_kind TEXT NOT NULL,
        payload TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        attempt_count INTEGER NOT NULL DEFAULT 0,
        last_error TEXT,
        status TEXT NOT NULL,
        next_attempt_at INTEGER,
        updated_at INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_offline_queue_order
        ON offline_queue (created_at, seq)",
    "CREATE INDEX IF NOT EXISTS idx_offline_queue_entity
        ON offline_queue (entity_type, entity_id, status)",
    "CREATE TABLE IF NOT EXISTS sync_metadata (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS sync_lock (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        holder TEXT NOT NULL,
        heartbeat_at INTEGER NOT NULL
    )",
];

/// Check if database needs migration
pub fn needs_migration(current_version: i32) -> bool {
    current_version < CURRENT_SCHEMA_VERSION
}

/// Get pending migrations
pub fn get_pending_migrations(current_version: i32) -> Vec<i32> {
    MIGRATION_VERSIONS
        .iter()
        .filter(|&&v| v > current_version)
        .cloned()
        .collect()
}

/// Statements of a migration version
pub fn migration_statements(version: i32) -> &'static [&'static str] {
    match version {
        1 => MIGRATION_1,
        _ => &[],
    }
}
