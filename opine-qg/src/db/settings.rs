//! Settings database operations
//!
//! Key-value accessors for provider credentials and pipeline tunables.
//! Tunables carry compiled defaults so a fresh database runs without any
//! operator setup; both similarity thresholds are deliberately independent
//! knobs (no single "correct" value is inferred).

use opine_common::{Error, Result};
use sqlx::{Pool, Sqlite};

/// Get OpenAI API key from database
pub async fn get_openai_api_key(db: &Pool<Sqlite>) -> Result<Option<String>> {
    get_setting::<String>(db, "openai_api_key").await
}

/// Set OpenAI API key in database
pub async fn set_openai_api_key(db: &Pool<Sqlite>, key: String) -> Result<()> {
    set_setting(db, "openai_api_key", key).await
}

/// Get Gemini API key from database
pub async fn get_gemini_api_key(db: &Pool<Sqlite>) -> Result<Option<String>> {
    get_setting::<String>(db, "gemini_api_key").await
}

/// Set Gemini API key in database
pub async fn set_gemini_api_key(db: &Pool<Sqlite>, key: String) -> Result<()> {
    set_setting(db, "gemini_api_key", key).await
}

/// Get trigger shared secret from database
pub async fn get_trigger_secret(db: &Pool<Sqlite>) -> Result<Option<String>> {
    get_setting::<String>(db, "trigger_secret").await
}

/// Set trigger shared secret in database
pub async fn set_trigger_secret(db: &Pool<Sqlite>, secret: String) -> Result<()> {
    set_setting(db, "trigger_secret", secret).await
}

/// Get text provider selection ("openai" or "gemini")
///
/// **Default:** "openai"
pub async fn get_text_provider(db: &Pool<Sqlite>) -> Result<String> {
    get_setting(db, "text_provider")
        .await
        .map(|opt| opt.unwrap_or_else(|| "openai".to_string()))
}

/// Get duplicate-similarity threshold for the high-volume batch path
///
/// **Default:** 0.85
pub async fn get_batch_similarity_threshold(db: &Pool<Sqlite>) -> Result<f32> {
    get_setting(db, "batch_similarity_threshold")
        .await
        .map(|opt| opt.unwrap_or(0.85))
}

/// Get duplicate-similarity threshold for single-question generation
///
/// **Default:** 0.75 (looser; novelty matters more on this path)
pub async fn get_single_similarity_threshold(db: &Pool<Sqlite>) -> Result<f32> {
    get_setting(db, "single_similarity_threshold")
        .await
        .map(|opt| opt.unwrap_or(0.75))
}

/// Get queue-depth floor below which replenishment generation is triggered
///
/// **Default:** 3
pub async fn get_low_water_mark(db: &Pool<Sqlite>) -> Result<i64> {
    get_setting(db, "queue_low_water_mark")
        .await
        .map(|opt| opt.unwrap_or(3))
}

/// Get per-branch enrichment timeout in seconds
///
/// **Default:** 90
pub async fn get_enrichment_timeout_secs(db: &Pool<Sqlite>) -> Result<u64> {
    get_setting(db, "enrichment_timeout_secs")
        .await
        .map(|opt| opt.unwrap_or(90))
}

/// Get ordered image model candidate list (comma-separated)
///
/// **Default:** the higher-quality, lower-quota model first
pub async fn get_image_models(db: &Pool<Sqlite>) -> Result<Vec<String>> {
    let raw: Option<String> = get_setting(db, "image_models").await?;
    let raw = raw.unwrap_or_else(|| {
        "gemini-2.0-flash-exp-image-generation,gemini-2.0-flash-preview-image-generation"
            .to_string()
    });

    Ok(raw
        .split(',')
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty())
        .collect())
}

/// Generic setting getter (internal)
async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    match row {
        Some((value,)) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting failed: {}", e)))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

/// Generic setting setter (upsert)
pub async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}
