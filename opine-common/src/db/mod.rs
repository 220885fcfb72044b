//! Database access shared by Opine services
//!
//! The generation pipeline owns five tables in the shared `opine.db`:
//! `settings`, `generation_queue`, `generated_candidates`, `questions`,
//! and `run_log`. All tables are created idempotently at startup.

pub mod models;

use crate::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
///
/// Connects to the shared `opine.db` in the root folder, creating the file
/// and the pipeline tables if they do not exist yet.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Proper SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create pipeline tables if they don't exist
///
/// Also usable against an in-memory pool in tests.
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    // Key-value settings (API keys, trigger secret, pipeline tunables)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Accepted-but-unpublished questions, FIFO by created_at.
    // Rows are never deleted; published_at doubles as the audit trail.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS generation_queue (
            id TEXT PRIMARY KEY,
            text TEXT NOT NULL,
            category TEXT NOT NULL,
            embedding TEXT NOT NULL,
            created_at TEXT NOT NULL,
            published_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Audit record of every generated candidate, accepted or rejected.
    // Immutable once written; rejection is a terminal state, not a deletion.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS generated_candidates (
            id TEXT PRIMARY KEY,
            text TEXT NOT NULL,
            category TEXT NOT NULL,
            accepted INTEGER NOT NULL,
            similarity REAL,
            matched_text TEXT,
            reason TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Live content store. author NULL means system-authored.
    // Enrichment columns are nullable and patched independently.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS questions (
            id TEXT PRIMARY KEY,
            text TEXT NOT NULL,
            category TEXT NOT NULL,
            embedding TEXT NOT NULL,
            author TEXT,
            created_at TEXT NOT NULL,
            classified_category TEXT,
            auto_vote TEXT,
            auto_vote_reason TEXT,
            illustration_url TEXT,
            illustration_model TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only pipeline audit trail
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS run_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_name TEXT NOT NULL,
            status TEXT NOT NULL,
            message TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!(
        "Database tables initialized (settings, generation_queue, generated_candidates, questions, run_log)"
    );

    Ok(())
}
