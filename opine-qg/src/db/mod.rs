//! Database access for opine-qg
//!
//! Pipeline tables live in the shared `opine.db`; the schema itself is
//! created by `opine_common::db`. This module owns the query layer:
//! queue operations, published-question operations, run-log appends, and
//! the settings accessors.

pub mod questions;
pub mod queue;
pub mod run_log;
pub mod settings;

use chrono::{DateTime, Utc};
use opine_common::{Error, Result};

/// Serialize an embedding for TEXT column storage
pub fn encode_embedding(vector: &[f32]) -> String {
    serde_json::to_string(vector).unwrap_or_else(|_| "[]".to_string())
}

/// Deserialize an embedding from TEXT column storage
pub fn decode_embedding(raw: &str) -> Result<Vec<f32>> {
    serde_json::from_str(raw)
        .map_err(|e| Error::Internal(format!("Corrupt embedding column: {}", e)))
}

/// Parse an RFC 3339 timestamp column
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Corrupt timestamp column: {}", e)))
}
