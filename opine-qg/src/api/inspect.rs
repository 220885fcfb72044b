//! Read-only inspection endpoints
//!
//! Operator-facing views of the generation queue and the run log. These
//! carry no credentials; they expose no content that is not already
//! public once published, and the run log is the primary debugging
//! surface when a scheduled job misbehaves.

use crate::db::{queue, run_log, settings};
use crate::error::ApiResult;
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use opine_common::db::models::RunLogEntry;
use serde::{Deserialize, Serialize};

const DEFAULT_RUNLOG_LIMIT: i64 = 50;
const MAX_RUNLOG_LIMIT: i64 = 200;

pub fn inspect_routes() -> Router<AppState> {
    Router::new()
        .route("/queue/status", get(queue_status))
        .route("/runlog", get(run_log_entries))
}

#[derive(Debug, Serialize)]
struct QueueStatusResponse {
    pending: i64,
    low_water_mark: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    oldest_pending_at: Option<DateTime<Utc>>,
}

/// GET /queue/status
async fn queue_status(State(state): State<AppState>) -> ApiResult<Json<QueueStatusResponse>> {
    let pending = queue::pending_count(&state.db).await?;
    let low_water_mark = settings::get_low_water_mark(&state.db).await?;
    let oldest_pending_at = queue::oldest_pending(&state.db)
        .await?
        .map(|item| item.created_at);

    Ok(Json(QueueStatusResponse {
        pending,
        low_water_mark,
        oldest_pending_at,
    }))
}

#[derive(Debug, Deserialize)]
struct RunLogQuery {
    limit: Option<i64>,
}

/// GET /runlog?limit=N
async fn run_log_entries(
    State(state): State<AppState>,
    Query(query): Query<RunLogQuery>,
) -> ApiResult<Json<Vec<RunLogEntry>>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_RUNLOG_LIMIT)
        .clamp(1, MAX_RUNLOG_LIMIT);

    let entries = run_log::recent(&state.db, limit).await?;
    Ok(Json(entries))
}
