//! Configuration resolution for opine-qg
//!
//! Provider credentials resolve through three tiers with
//! Database → ENV → TOML priority; the trigger shared secret resolves
//! ENV → Database and is auto-initialized with a random value on first run
//! so a fresh deployment is never left unauthenticated.

use opine_common::config::TomlConfig;
use opine_common::{Error, Result};
use rand::Rng;
use sqlx::{Pool, Sqlite};
use tracing::{info, warn};

/// Resolve OpenAI API key from 3-tier configuration
///
/// **Priority:** Database → ENV → TOML
pub async fn resolve_openai_api_key(
    db: &Pool<Sqlite>,
    toml_config: Option<&TomlConfig>,
) -> Result<String> {
    resolve_api_key(
        "OpenAI",
        crate::db::settings::get_openai_api_key(db).await?,
        std::env::var("OPINE_OPENAI_API_KEY").ok(),
        toml_config.and_then(|c| c.openai_api_key.clone()),
        "OPINE_OPENAI_API_KEY",
        "openai_api_key",
    )
}

/// Resolve Gemini API key from 3-tier configuration
///
/// **Priority:** Database → ENV → TOML
pub async fn resolve_gemini_api_key(
    db: &Pool<Sqlite>,
    toml_config: Option<&TomlConfig>,
) -> Result<String> {
    resolve_api_key(
        "Gemini",
        crate::db::settings::get_gemini_api_key(db).await?,
        std::env::var("OPINE_GEMINI_API_KEY").ok(),
        toml_config.and_then(|c| c.gemini_api_key.clone()),
        "OPINE_GEMINI_API_KEY",
        "gemini_api_key",
    )
}

fn resolve_api_key(
    provider: &str,
    db_key: Option<String>,
    env_key: Option<String>,
    toml_key: Option<String>,
    env_var: &str,
    toml_field: &str,
) -> Result<String> {
    let mut sources = Vec::new();
    if db_key.as_deref().is_some_and(is_valid_key) {
        sources.push("database");
    }
    if env_key.as_deref().is_some_and(is_valid_key) {
        sources.push("environment");
    }
    if toml_key.as_deref().is_some_and(is_valid_key) {
        sources.push("TOML");
    }

    // Warn if multiple sources (potential misconfiguration)
    if sources.len() > 1 {
        warn!(
            "{} API key found in multiple sources: {}. Using database (highest priority).",
            provider,
            sources.join(", ")
        );
    }

    for (key, source) in [
        (db_key, "database"),
        (env_key, "environment variable"),
        (toml_key, "TOML config"),
    ] {
        if let Some(key) = key {
            if is_valid_key(&key) {
                info!("{} API key loaded from {}", provider, source);
                return Ok(key);
            }
        }
    }

    Err(Error::Config(format!(
        "{} API key not configured. Please configure using one of:\n\
         1. Settings table: key '{}'\n\
         2. Environment: {}=your-key-here\n\
         3. TOML config: ~/.config/opine/opine-qg.toml ({} = \"your-key\")",
        provider, toml_field, env_var, toml_field
    )))
}

/// Resolve the scheduler trigger shared secret
///
/// **Priority:** ENV → Database. When neither is set, a random secret is
/// generated, persisted to the settings table, and logged once so the
/// operator can configure the scheduler.
pub async fn resolve_trigger_secret(db: &Pool<Sqlite>) -> Result<String> {
    if let Ok(secret) = std::env::var("OPINE_TRIGGER_SECRET") {
        if is_valid_key(&secret) {
            info!("Trigger secret loaded from environment variable");
            return Ok(secret);
        }
    }

    if let Some(secret) = crate::db::settings::get_trigger_secret(db).await? {
        if is_valid_key(&secret) {
            return Ok(secret);
        }
    }

    // First run: generate and persist
    let secret = generate_secret();
    crate::db::settings::set_trigger_secret(db, secret.clone()).await?;
    info!("Trigger secret auto-initialized (settings table key 'trigger_secret')");

    Ok(secret)
}

/// Validate key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Generate a random 32-hex-character secret
fn generate_secret() -> String {
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| format!("{:x}", rng.gen_range(0..16)))
        .collect()
}
