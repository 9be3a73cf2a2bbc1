//! # Sync Metadata Operations
//!
//! Key/value sync metadata and the persisted sync lock.
//!
//! The lock is a single row in `sync_lock` naming the context that is running
//! a pass and the time of its last heartbeat. All transitions are single
//! conditional statements, so two processes racing for the lock cannot both
//! win. A row whose heartbeat is older than the staleness threshold belongs to
//! a context that died mid-pass and may be taken over.

use super::{from_millis, now_millis, to_millis, LocalDatabase, Result};
use crate::shared::report::SyncReport;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::time::Duration;

const LAST_SYNC_AT: &str = "last_sync_at";
const LAST_SYNC_REPORT: &str = "last_sync_report";

/// Outcome of a lock acquisition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockAcquisition {
    /// The lock was free (or already ours)
    Acquired,
    /// The lock was taken over from a context whose heartbeat went stale
    Reclaimed {
        /// Context that abandoned the lock
        previous_holder: String,
    },
    /// Another context holds a live lock
    HeldBy {
        holder: String,
        heartbeat_at: DateTime<Utc>,
    },
}

impl LockAcquisition {
    pub fn is_owned(&self) -> bool {
        !matches!(self, LockAcquisition::HeldBy { .. })
    }
}

impl LocalDatabase {
    /// Try to take the sync lock for `holder`
    pub async fn try_acquire_sync_lock(
        &self,
        holder: &str,
        stale_after: Duration,
    ) -> Result<LockAcquisition> {
        let stale_after = chrono::Duration::from_std(stale_after).unwrap_or(chrono::Duration::MAX);

        loop {
            let now = Utc::now();

            let inserted = sqlx::query(
                "INSERT INTO sync_lock (id, holder, heartbeat_at) VALUES (1, ?, ?)
                 ON CONFLICT(id) DO NOTHING",
            )
            .bind(holder)
            .bind(to_millis(now))
            .execute(&self.pool)
            .await?;

            if inserted.rows_affected() == 1 {
                return Ok(LockAcquisition::Acquired);
            }

            // Released between the two statements
            let Some((current, heartbeat_at)) = self.sync_lock_holder().await? else {
                continue;
            };

            if current == holder {
                self.heartbeat_sync_lock(holder).await?;
                return Ok(LockAcquisition::Acquired);
            }

            if now.signed_duration_since(heartbeat_at) < stale_after {
                return Ok(LockAcquisition::HeldBy {
                    holder: current,
                    heartbeat_at,
                });
            }

            // Compare-and-swap on the exact row judged stale
            let swapped = sqlx::query(
                "UPDATE sync_lock SET holder = ?, heartbeat_at = ?
                 WHERE id = 1 AND holder = ? AND heartbeat_at = ?",
            )
            .bind(holder)
            .bind(to_millis(now))
            .bind(&current)
            .bind(to_millis(heartbeat_at))
            .execute(&self.pool)
            .await?;

            if swapped.rows_affected() == 1 {
                return Ok(LockAcquisition::Reclaimed {
                    previous_holder: current,
                });
            }
            // Another context won the takeover or refreshed; look again
        }
    }

    /// Refresh the heartbeat; returns `false` if `holder` no longer owns the lock
    pub async fn heartbeat_sync_lock(&self, holder: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE sync_lock SET heartbeat_at = ? WHERE id = 1 AND holder = ?")
            .bind(now_millis())
            .bind(holder)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Release the lock if `holder` owns it
    pub async fn release_sync_lock(&self, holder: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sync_lock WHERE id = 1 AND holder = ?")
            .bind(holder)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Current lock owner and heartbeat, if any
    pub async fn sync_lock_holder(&self) -> Result<Option<(String, DateTime<Utc>)>> {
        let row = sqlx::query("SELECT holder, heartbeat_at FROM sync_lock WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let holder: String = row.try_get("holder")?;
                let heartbeat_at = from_millis(row.try_get("heartbeat_at")?)?;
                Ok(Some((holder, heartbeat_at)))
            }
            None => Ok(None),
        }
    }

    /// Set sync metadata
    pub async fn set_sync_metadata(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO sync_metadata (key, value, updated_at)
             VALUES (?, ?, ?)",
        )
        .bind(key)
        .bind(value)
        .bind(now_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get sync metadata
    pub async fn get_sync_metadata(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM sync_metadata WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("value")?)),
            None => Ok(None),
        }
    }

    /// Persist the outcome of a finished pass so other contexts can read it
    pub async fn record_sync_pass(&self, at: DateTime<Utc>, report: &SyncReport) -> Result<()> {
        let report = serde_json::to_string(report)?;
        let mut tx = self.pool.begin().await?;
        for (key, value) in [
            (LAST_SYNC_AT, to_millis(at).to_string()),
            (LAST_SYNC_REPORT, report),
        ] {
            sqlx::query(
                "INSERT OR REPLACE INTO sync_metadata (key, value, updated_at)
                 VALUES (?, ?, ?)",
            )
            .bind(key)
            .bind(value)
            .bind(now_millis())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Time and report of the most recent finished pass, from any context
    pub async fn last_sync_pass(&self) -> Result<Option<(DateTime<Utc>, SyncReport)>> {
        let at = self.get_sync_metadata(LAST_SYNC_AT).await?;
        let report = self.get_sync_metadata(LAST_SYNC_REPORT).await?;

        match (at, report) {
            (Some(at), Some(report)) => {
                let millis = at
                    .parse::<i64>()
                    .map_err(|e| crate::shared::SyncError::storage(format!("corrupt last_sync_at: {}", e)))?;
                Ok(Some((from_millis(millis)?, serde_json::from_str(&report)?)))
            }
            _ => Ok(None),
        }
    }
}
