//! Published question operations
//!
//! Enrichment columns are patched independently by the fanout branches;
//! every patch is a single-row idempotent-by-id update.

use super::{decode_embedding, encode_embedding, parse_timestamp};
use opine_common::db::models::{AutoVote, Category, Question};
use opine_common::{Error, Result};
use sqlx::SqlitePool;
use std::str::FromStr;
use uuid::Uuid;

/// Insert a newly published question (author NULL = system-authored)
pub async fn insert_question(db: &SqlitePool, question: &Question) -> Result<()> {
    sqlx::query(
        "INSERT INTO questions (id, text, category, embedding, author, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(question.id.to_string())
    .bind(&question.text)
    .bind(question.category.as_str())
    .bind(encode_embedding(&question.embedding))
    .bind(question.author.map(|a| a.to_string()))
    .bind(question.created_at.to_rfc3339())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

/// Fetch a question by id
pub async fn get_question(db: &SqlitePool, id: Uuid) -> Result<Option<Question>> {
    type Row = (
        String,
        String,
        String,
        String,
        Option<String>,
        String,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
        Option<String>,
    );

    let row: Option<Row> = sqlx::query_as(
        "SELECT id, text, category, embedding, author, created_at,
                classified_category, auto_vote, auto_vote_reason,
                illustration_url, illustration_model
         FROM questions WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(db)
    .await
    .map_err(Error::Database)?;

    let Some((
        id,
        text,
        category,
        embedding,
        author,
        created_at,
        classified_category,
        auto_vote,
        auto_vote_reason,
        illustration_url,
        illustration_model,
    )) = row
    else {
        return Ok(None);
    };

    Ok(Some(Question {
        id: Uuid::parse_str(&id)
            .map_err(|e| Error::Internal(format!("Corrupt question id: {}", e)))?,
        text,
        category: Category::from_str(&category).map_err(Error::Internal)?,
        embedding: decode_embedding(&embedding)?,
        author: author
            .map(|a| Uuid::parse_str(&a))
            .transpose()
            .map_err(|e| Error::Internal(format!("Corrupt author id: {}", e)))?,
        created_at: parse_timestamp(&created_at)?,
        classified_category: classified_category
            .map(|c| Category::from_str(&c))
            .transpose()
            .map_err(Error::Internal)?,
        auto_vote: auto_vote
            .map(|v| AutoVote::from_str(&v))
            .transpose()
            .map_err(Error::Internal)?,
        auto_vote_reason,
        illustration_url,
        illustration_model,
    }))
}

/// Patch the classified category onto a question
pub async fn set_classified_category(
    db: &SqlitePool,
    id: Uuid,
    category: Category,
) -> Result<()> {
    sqlx::query("UPDATE questions SET classified_category = ? WHERE id = ?")
        .bind(category.as_str())
        .bind(id.to_string())
        .execute(db)
        .await
        .map_err(Error::Database)?;

    Ok(())
}

/// Whether an automated vote already exists (idempotency guard)
pub async fn has_auto_vote(db: &SqlitePool, id: Uuid) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE id = ? AND auto_vote IS NOT NULL")
            .bind(id.to_string())
            .fetch_one(db)
            .await
            .map_err(Error::Database)?;

    Ok(count > 0)
}

/// Patch the automated vote and its justification onto a question
pub async fn set_auto_vote(
    db: &SqlitePool,
    id: Uuid,
    vote: AutoVote,
    reason: &str,
) -> Result<()> {
    sqlx::query("UPDATE questions SET auto_vote = ?, auto_vote_reason = ? WHERE id = ?")
        .bind(vote.as_str())
        .bind(reason)
        .bind(id.to_string())
        .execute(db)
        .await
        .map_err(Error::Database)?;

    Ok(())
}

/// Patch the illustration URL and the model that produced it
pub async fn set_illustration(
    db: &SqlitePool,
    id: Uuid,
    url: &str,
    model: &str,
) -> Result<()> {
    sqlx::query("UPDATE questions SET illustration_url = ?, illustration_model = ? WHERE id = ?")
        .bind(url)
        .bind(model)
        .bind(id.to_string())
        .execute(db)
        .await
        .map_err(Error::Database)?;

    Ok(())
}

/// Embeddings of all published questions, paired with their text
pub async fn question_embeddings(db: &SqlitePool) -> Result<Vec<(String, Vec<f32>)>> {
    let rows: Vec<(String, String)> =
        sqlx::query_as("SELECT text, embedding FROM questions WHERE embedding != '[]'")
            .fetch_all(db)
            .await
            .map_err(Error::Database)?;

    let mut out = Vec::with_capacity(rows.len());
    for (text, embedding) in rows {
        out.push((text, decode_embedding(&embedding)?));
    }
    Ok(out)
}
