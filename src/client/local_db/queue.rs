//! # Offline Queue Storage
//!
//! Row-level storage of queue records in the `offline_queue` table.
//! Records are ordered by their local `created_at` timestamp, ties broken by
//! insertion sequence, so per-entity FIFO order survives restarts.
//!
//! Higher-level lifecycle rules (which transitions are allowed, depth
//! notifications) live in [`crate::client::offline::queue`].

use super::{from_millis, now_millis, to_millis, LocalDatabase, Result};
use crate::shared::error::SyncError;
use crate::shared::record::{
    EntityKey, Mutation, OperationId, OperationKind, QueueRecord, RecordPatch, RecordStatus,
};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::HashSet;
use uuid::Uuid;

const RECORD_COLUMNS: &str = "operation_id, entity_type, entity_id, operation_kind, payload,
     created_at, attempt_count, last_error, status, next_attempt_at";

impl LocalDatabase {
    /// Insert a record; returns `false` when the operation id is already queued
    pub async fn insert_record(&self, record: &QueueRecord) -> Result<bool> {
        let payload = serde_json::to_string(&record.mutation.payload)?;

        let result = sqlx::query(
            "INSERT INTO offline_queue (
                operation_id, entity_type, entity_id, operation_kind, payload,
                created_at, attempt_count, last_error, status, next_attempt_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(operation_id) DO NOTHING",
        )
        .bind(record.operation_id().to_string())
        .bind(&record.mutation.entity.entity_type)
        .bind(&record.mutation.entity.entity_id)
        .bind(record.mutation.kind.as_str())
        .bind(&payload)
        .bind(to_millis(record.created_at))
        .bind(i64::from(record.attempt_count))
        .bind(record.last_error.as_deref())
        .bind(record.status.as_str())
        .bind(record.next_attempt_at.map(to_millis))
        .bind(now_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Fetch one record by operation id
    pub async fn fetch_record(&self, operation_id: OperationId) -> Result<Option<QueueRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM offline_queue WHERE operation_id = ?"
        ))
        .bind(operation_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    /// Records a sync pass may pick up, oldest first
    pub async fn fetch_syncable(&self) -> Result<Vec<QueueRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM offline_queue
             WHERE status IN ('pending', 'failed_retryable')
             ORDER BY created_at ASC, seq ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Records with the given status, oldest first
    pub async fn fetch_by_status(&self, status: RecordStatus) -> Result<Vec<QueueRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM offline_queue
             WHERE status = ?
             ORDER BY created_at ASC, seq ASC"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Read-modify-write of a record's sync metadata inside one transaction
    pub async fn patch_record(
        &self,
        operation_id: OperationId,
        patch: RecordPatch,
    ) -> Result<QueueRecord> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM offline_queue WHERE operation_id = ?"
        ))
        .bind(operation_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;

        let mut record = match row {
            Some(row) => record_from_row(&row)?,
            None => return Err(SyncError::RecordNotFound(operation_id)),
        };
        record.apply(patch);

        sqlx::query(
            "UPDATE offline_queue SET
                status = ?,
                attempt_count = ?,
                last_error = ?,
                next_attempt_at = ?,
                updated_at = ?
             WHERE operation_id = ?",
        )
        .bind(record.status.as_str())
        .bind(i64::from(record.attempt_count))
        .bind(record.last_error.as_deref())
        .bind(record.next_attempt_at.map(to_millis))
        .bind(now_millis())
        .bind(operation_id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }

    /// Delete a record; returns whether it existed
    pub async fn delete_record(&self, operation_id: OperationId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM offline_queue WHERE operation_id = ?")
            .bind(operation_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Total number of stored records
    pub async fn count_records(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM offline_queue")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    pub async fn count_with_status(&self, status: RecordStatus) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM offline_queue WHERE status = ?")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Whether any record of `entity` is stored, whatever its status
    pub async fn has_records_for(&self, entity: &EntityKey) -> Result<bool> {
        let (exists,): (i64,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM offline_queue WHERE entity_type = ? AND entity_id = ?)",
        )
        .bind(&entity.entity_type)
        .bind(&entity.entity_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists != 0)
    }

    /// Entities blocked by a terminal record
    pub async fn terminal_entity_keys(&self) -> Result<HashSet<EntityKey>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT DISTINCT entity_type, entity_id FROM offline_queue WHERE status = 'failed_terminal'",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(entity_type, entity_id)| EntityKey::new(entity_type, entity_id))
            .collect())
    }

    /// Return every in-flight record to pending; returns how many moved
    pub async fn reset_in_flight(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE offline_queue SET status = 'pending', updated_at = ? WHERE status = 'in_flight'",
        )
        .bind(now_millis())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Earliest scheduled retry among retryable records
    pub async fn earliest_retry(&self) -> Result<Option<DateTime<Utc>>> {
        let (earliest,): (Option<i64>,) = sqlx::query_as(
            "SELECT MIN(next_attempt_at) FROM offline_queue WHERE status = 'failed_retryable'",
        )
        .fetch_one(&self.pool)
        .await?;

        earliest.map(from_millis).transpose()
    }
}

fn record_from_row(row: &SqliteRow) -> Result<QueueRecord> {
    let operation_id: String = row.try_get("operation_id")?;
    let operation_id = Uuid::parse_str(&operation_id)
        .map_err(|e| SyncError::storage(format!("corrupt operation id {}: {}", operation_id, e)))?;

    let kind: String = row.try_get("operation_kind")?;
    let kind = OperationKind::parse(&kind)
        .ok_or_else(|| SyncError::storage(format!("unknown operation kind '{}'", kind)))?;

    let status: String = row.try_get("status")?;
    let status = RecordStatus::parse(&status)
        .ok_or_else(|| SyncError::storage(format!("unknown record status '{}'", status)))?;

    let payload: String = row.try_get("payload")?;
    let attempt_count: i64 = row.try_get("attempt_count")?;
    let next_attempt_at: Option<i64> = row.try_get("next_attempt_at")?;

    Ok(QueueRecord {
        mutation: Mutation {
            operation_id,
            entity: EntityKey::new(
                row.try_get::<String, _>("entity_type")?,
                row.try_get::<String, _>("entity_id")?,
            ),
            kind,
            payload: serde_json::from_str(&payload)?,
        },
        created_at: from_millis(row.try_get("created_at")?)?,
        attempt_count: u32::try_from(attempt_count).unwrap_or(u32::MAX),
        last_error: row.try_get("last_error")?,
        status,
        next_attempt_at: next_attempt_at.map(from_millis).transpose()?,
    })
}
