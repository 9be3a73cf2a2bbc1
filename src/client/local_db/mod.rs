//! # Local Database Module
//!
//! Local SQLite storage backing the offline queue. Every context of the
//! application (foreground client, background worker) opens the same file;
//! the database is the only state they share.
//!
//! ## Key Components
//!
//! - `LocalDatabase`: connection pool, pragmas and schema management
//! - `schema.rs`: schema versions and migration DDL
//! - `queue.rs`: queue record storage
//! - `sync.rs`: sync metadata and the cross-context sync lock
//!
//! ## Usage
//!
//! ```rust,no_run
//! use booking_sync::client::local_db::LocalDatabase;
//!
//! # async fn example() -> Result<(), booking_sync::shared::SyncError> {
//! let db = LocalDatabase::open("/tmp/booking-sync/queue.db").await?;
//! let stats = db.get_stats().await?;
//! println!("{} operations waiting", stats.queued_operations);
//! # Ok(())
//! # }
//! ```

pub mod queue;
pub mod schema;
pub mod sync;

use crate::shared::error::SyncError;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Result type for local database operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Local database connection manager
#[derive(Debug, Clone)]
pub struct LocalDatabase {
    pool: SqlitePool,
}

impl LocalDatabase {
    /// Open or create the database file at `path`
    ///
    /// Uses WAL mode so a second process can read while another writes, and
    /// `synchronous=FULL` so a committed enqueue survives a crash.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Ensure directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| SyncError::storage(format!("cannot create {}: {}", parent.display(), e)))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init_schema().await?;
        tracing::debug!(path = %path.display(), "opened local queue database");
        Ok(db)
    }

    /// Open a private in-memory database
    ///
    /// The pool is pinned to a single connection that never expires, since an
    /// in-memory SQLite database lives and dies with its connection.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// Initialize database schema
    ///
    /// Creates the migrations table and applies any pending migrations.
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let current_version: (i32,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;

        if !schema::needs_migration(current_version.0) {
            return Ok(());
        }

        for version in schema::get_pending_migrations(current_version.0) {
            self.apply_migration(version).await?;
        }

        Ok(())
    }

    /// Apply one migration and record it, atomically
    async fn apply_migration(&self, version: i32) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for statement in schema::migration_statements(version) {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
            .bind(version)
            .bind(now_millis())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(version, "applied local schema migration");
        Ok(())
    }

    /// Get connection pool reference
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get database statistics
    pub async fn get_stats(&self) -> Result<DatabaseStats> {
        let (queued, terminal): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(status = 'failed_terminal'), 0) FROM offline_queue",
        )
        .fetch_one(&self.pool)
        .await?;

        let schema_version: (i32,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;

        Ok(DatabaseStats {
            queued_operations: queued as u64,
            terminal_operations: terminal as u64,
            schema_version: schema_version.0,
        })
    }

    /// Close the pool, flushing the WAL
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    /// Records currently stored in the offline queue
    pub queued_operations: u64,
    /// Records that reached the retry ceiling
    pub terminal_operations: u64,
    /// Applied schema version
    pub schema_version: i32,
}

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub(crate) fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| SyncError::storage(format!("timestamp out of range: {}", millis)))
}
