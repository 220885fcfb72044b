//! Generation queue operations
//!
//! The queue is a durable FIFO of accepted-but-unpublished candidates.
//! Rows are never deleted; publishing sets `published_at` exactly once via
//! a conditional update so overlapping publishers cannot take the same row.

use super::{decode_embedding, encode_embedding, parse_timestamp};
use chrono::Utc;
use opine_common::db::models::{CandidateRecord, Category, QueueItem};
use opine_common::{Error, Result};
use sqlx::SqlitePool;
use std::str::FromStr;
use uuid::Uuid;

/// Insert an accepted candidate into the queue with its embedding attached
pub async fn insert_queue_item(db: &SqlitePool, item: &QueueItem) -> Result<()> {
    sqlx::query(
        "INSERT INTO generation_queue (id, text, category, embedding, created_at, published_at)
         VALUES (?, ?, ?, ?, ?, NULL)",
    )
    .bind(item.id.to_string())
    .bind(&item.text)
    .bind(item.category.as_str())
    .bind(encode_embedding(&item.embedding))
    .bind(item.created_at.to_rfc3339())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

/// Record a generated candidate in the audit table (accepted or rejected)
///
/// Rejected candidates are persisted with their similarity score and the
/// matched text, never silently dropped.
pub async fn record_candidate(db: &SqlitePool, candidate: &CandidateRecord) -> Result<()> {
    sqlx::query(
        "INSERT INTO generated_candidates
             (id, text, category, accepted, similarity, matched_text, reason, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(candidate.id.to_string())
    .bind(&candidate.text)
    .bind(candidate.category.as_str())
    .bind(candidate.accepted as i64)
    .bind(candidate.similarity)
    .bind(&candidate.matched_text)
    .bind(&candidate.reason)
    .bind(candidate.created_at.to_rfc3339())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

/// Oldest pending queue item (FIFO by creation time), if any
pub async fn oldest_pending(db: &SqlitePool) -> Result<Option<QueueItem>> {
    let row: Option<(String, String, String, String, String)> = sqlx::query_as(
        "SELECT id, text, category, embedding, created_at
         FROM generation_queue
         WHERE published_at IS NULL
         ORDER BY created_at ASC, id ASC
         LIMIT 1",
    )
    .fetch_optional(db)
    .await
    .map_err(Error::Database)?;

    match row {
        Some((id, text, category, embedding, created_at)) => Ok(Some(QueueItem {
            id: Uuid::parse_str(&id)
                .map_err(|e| Error::Internal(format!("Corrupt queue id: {}", e)))?,
            text,
            category: Category::from_str(&category).map_err(Error::Internal)?,
            embedding: decode_embedding(&embedding)?,
            created_at: parse_timestamp(&created_at)?,
            published_at: None,
        })),
        None => Ok(None),
    }
}

/// Number of pending (unpublished) queue items
pub async fn pending_count(db: &SqlitePool) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM generation_queue WHERE published_at IS NULL")
            .fetch_one(db)
            .await
            .map_err(Error::Database)?;

    Ok(count)
}

/// Atomically claim a queue item for publishing
///
/// Conditional on `published_at` still being NULL; returns false when a
/// concurrent publisher already took the row.
pub async fn claim_for_publish(db: &SqlitePool, id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE generation_queue SET published_at = ? WHERE id = ? AND published_at IS NULL",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(id.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(result.rows_affected() == 1)
}

/// Embeddings of all pending queue items, paired with their text
///
/// Consumed by the similarity index so new candidates are checked against
/// the queue as well as the live content store.
pub async fn pending_embeddings(db: &SqlitePool) -> Result<Vec<(String, Vec<f32>)>> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT text, embedding FROM generation_queue WHERE published_at IS NULL",
    )
    .fetch_all(db)
    .await
    .map_err(Error::Database)?;

    let mut out = Vec::with_capacity(rows.len());
    for (text, embedding) in rows {
        out.push((text, decode_embedding(&embedding)?));
    }
    Ok(out)
}
