//! Run log operations
//!
//! Append-only audit trail of pipeline invocations; consumed by operators
//! through `GET /runlog`. Entries are never mutated or deleted.

use super::parse_timestamp;
use chrono::Utc;
use opine_common::db::models::{RunLogEntry, RunStatus};
use opine_common::{Error, Result};
use sqlx::SqlitePool;

/// Append a run log entry
pub async fn append(
    db: &SqlitePool,
    job_name: &str,
    status: RunStatus,
    message: &str,
    metadata: serde_json::Value,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO run_log (job_name, status, message, metadata, created_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(job_name)
    .bind(status.as_str())
    .bind(message)
    .bind(metadata.to_string())
    .bind(Utc::now().to_rfc3339())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

/// Most recent entries, newest first
pub async fn recent(db: &SqlitePool, limit: i64) -> Result<Vec<RunLogEntry>> {
    let rows: Vec<(i64, String, String, String, String, String)> = sqlx::query_as(
        "SELECT id, job_name, status, message, metadata, created_at
         FROM run_log ORDER BY id DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(db)
    .await
    .map_err(Error::Database)?;

    let mut entries = Vec::with_capacity(rows.len());
    for (id, job_name, status, message, metadata, created_at) in rows {
        let status = match status.as_str() {
            "started" => RunStatus::Started,
            "success" => RunStatus::Success,
            "error" => RunStatus::Error,
            other => return Err(Error::Internal(format!("Unknown run status: {}", other))),
        };
        entries.push(RunLogEntry {
            id,
            job_name,
            status,
            message,
            metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
            created_at: parse_timestamp(&created_at)?,
        });
    }
    Ok(entries)
}
