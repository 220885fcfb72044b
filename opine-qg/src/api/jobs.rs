//! Scheduled-job trigger endpoints
//!
//! The external scheduler hits these on a fixed cadence; every route
//! requires the shared trigger secret, supplied either as a bearer token
//! or as a `secret` query parameter (the manual browser-friendly form).

use crate::error::{ApiError, ApiResult};
use crate::pipeline::PublishOutcome;
use crate::AppState;
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use opine_common::db::models::Category;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

pub fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/jobs/publish", post(trigger_publish))
        .route("/jobs/publish/manual", get(trigger_publish))
        .route("/jobs/generate", post(trigger_generate))
}

#[derive(Debug, Serialize)]
struct PublishResponse {
    published: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    question_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    queue_remaining: Option<i64>,
    generation_triggered: bool,
}

#[derive(Debug, Deserialize, Default)]
struct GenerateRequest {
    /// When present, generate a single question for this category;
    /// otherwise run a full batch across all categories
    category: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerateResponse {
    accepted: usize,
    rejected: usize,
}

/// Check the shared trigger secret from header or query string
fn authorize(
    state: &AppState,
    headers: &HeaderMap,
    params: &HashMap<String, String>,
) -> ApiResult<()> {
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let supplied = bearer.or_else(|| params.get("secret").map(String::as_str));

    match supplied {
        Some(secret) if secret == state.trigger_secret => Ok(()),
        Some(_) => Err(ApiError::Unauthorized("Invalid trigger secret".to_string())),
        None => Err(ApiError::Unauthorized("Missing trigger secret".to_string())),
    }
}

/// POST /jobs/publish (and GET /jobs/publish/manual)
///
/// 200 when a question was published; 202 when the queue was empty and
/// generation was triggered instead.
async fn trigger_publish(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    authorize(&state, &headers, &params)?;

    match state.publisher().publish().await {
        Ok(PublishOutcome::Published {
            question_id,
            queue_remaining,
        }) => Ok((
            StatusCode::OK,
            Json(PublishResponse {
                published: true,
                question_id: Some(question_id),
                queue_remaining: Some(queue_remaining),
                generation_triggered: false,
            }),
        )
            .into_response()),
        Ok(PublishOutcome::QueueEmptyTriggeredGeneration) => Ok((
            StatusCode::ACCEPTED,
            Json(PublishResponse {
                published: false,
                question_id: None,
                queue_remaining: Some(0),
                generation_triggered: true,
            }),
        )
            .into_response()),
        Err(e) => {
            state.record_error(&e.to_string()).await;
            Err(e.into())
        }
    }
}

/// POST /jobs/generate
///
/// Runs generation synchronously so the caller sees the outcome; the
/// scheduler's timeout budget covers the provider round trips.
async fn trigger_generate(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Option<Json<GenerateRequest>>,
) -> ApiResult<Response> {
    authorize(&state, &headers, &params)?;

    let request = body.map(|Json(r)| r).unwrap_or_default();
    let generator = state.publisher().batch_generator();

    let result = match request.category {
        Some(ref name) => {
            let category = Category::from_str(name)
                .map_err(|_| ApiError::BadRequest(format!("Unknown category: {}", name)))?;
            generator.generate_single(category).await.map(|item| {
                let accepted = usize::from(item.is_some());
                GenerateResponse {
                    accepted,
                    rejected: 1 - accepted,
                }
            })
        }
        None => generator
            .generate_batch(&Category::ALL)
            .await
            .map(|outcome| GenerateResponse {
                accepted: outcome.accepted.len(),
                rejected: outcome.rejected.len(),
            }),
    };

    match result {
        Ok(response) => Ok((StatusCode::OK, Json(response)).into_response()),
        Err(e) => {
            state.record_error(&e.to_string()).await;
            Err(e.into())
        }
    }
}
