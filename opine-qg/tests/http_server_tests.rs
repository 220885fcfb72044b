//! HTTP surface tests driven through the router with tower's oneshot.

mod support;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use opine_common::db::models::{Category, QueueItem, RunStatus};
use opine_qg::db::{queue, run_log};
use opine_qg::{build_router, AppState};
use sqlx::SqlitePool;
use std::sync::Arc;
use support::*;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

const TEST_SECRET: &str = "test-secret";

fn make_app(pool: SqlitePool, text: Arc<ScriptedTextGenerator>) -> (Router, TempDir) {
    let media_dir = tempfile::tempdir().unwrap();
    let state = AppState::new(
        pool,
        text,
        Arc::new(StubEmbedder::new()),
        Arc::new(StubImageGenerator),
        Arc::new(RecordingObjectStore::new()),
        TEST_SECRET.to_string(),
        media_dir.path().to_path_buf(),
    );
    (build_router(state), media_dir)
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_service_identity() {
    let pool = setup_test_db().await;
    let (app, _media) = make_app(pool, Arc::new(ScriptedTextGenerator::new(vec![])));

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["service"], "opine-qg");
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn publish_without_secret_is_rejected() {
    let pool = setup_test_db().await;
    let (app, _media) = make_app(pool, Arc::new(ScriptedTextGenerator::new(vec![])));

    let response = app
        .oneshot(Request::post("/jobs/publish").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn publish_with_wrong_secret_is_rejected() {
    let pool = setup_test_db().await;
    let (app, _media) = make_app(pool, Arc::new(ScriptedTextGenerator::new(vec![])));

    let response = app
        .oneshot(
            Request::post("/jobs/publish")
                .header("authorization", "Bearer not-the-secret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn publish_on_empty_queue_is_accepted_not_ok() {
    let pool = setup_test_db().await;
    let (app, _media) = make_app(pool, Arc::new(ScriptedTextGenerator::new(vec![])));

    let response = app
        .oneshot(
            Request::post("/jobs/publish")
                .header("authorization", format!("Bearer {}", TEST_SECRET))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = json_body(response).await;
    assert_eq!(body["published"], false);
    assert_eq!(body["generation_triggered"], true);
}

#[tokio::test]
async fn publish_with_pending_item_returns_the_question() {
    let pool = setup_test_db().await;
    queue::insert_queue_item(
        &pool,
        &QueueItem {
            id: Uuid::new_v4(),
            text: "Should libraries stay open on Sundays?".to_string(),
            category: Category::Culture,
            embedding: axis_vector(1),
            created_at: Utc::now(),
            published_at: None,
        },
    )
    .await
    .unwrap();

    let (app, _media) = make_app(pool, Arc::new(ScriptedTextGenerator::new(vec![])));

    let response = app
        .oneshot(
            Request::post("/jobs/publish")
                .header("authorization", format!("Bearer {}", TEST_SECRET))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["published"], true);
    assert!(body["question_id"].is_string());
}

#[tokio::test]
async fn manual_trigger_accepts_the_query_form() {
    let pool = setup_test_db().await;
    let (app, _media) = make_app(pool, Arc::new(ScriptedTextGenerator::new(vec![])));

    let response = app
        .oneshot(
            Request::get(format!("/jobs/publish/manual?secret={}", TEST_SECRET))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn generate_endpoint_runs_a_batch() {
    let pool = setup_test_db().await;
    let text = Arc::new(ScriptedTextGenerator::new(vec![
        "1. Should city centers ban private cars?\n2. Is open source the default now?",
    ]));
    let (app, _media) = make_app(pool.clone(), text);

    let response = app
        .oneshot(
            Request::post("/jobs/generate")
                .header("authorization", format!("Bearer {}", TEST_SECRET))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["accepted"], 2);
    assert_eq!(body["rejected"], 0);
    assert_eq!(queue::pending_count(&pool).await.unwrap(), 2);
}

#[tokio::test]
async fn generate_rejects_an_unknown_category() {
    let pool = setup_test_db().await;
    let (app, _media) = make_app(pool, Arc::new(ScriptedTextGenerator::new(vec![])));

    let response = app
        .oneshot(
            Request::post("/jobs/generate")
                .header("authorization", format!("Bearer {}", TEST_SECRET))
                .header("content-type", "application/json")
                .body(Body::from(r#"{"category":"sports"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn queue_status_counts_pending_items() {
    let pool = setup_test_db().await;
    for axis in [1, 2] {
        queue::insert_queue_item(
            &pool,
            &QueueItem {
                id: Uuid::new_v4(),
                text: format!("Pending question number {}?", axis),
                category: Category::Technology,
                embedding: axis_vector(axis),
                created_at: Utc::now(),
                published_at: None,
            },
        )
        .await
        .unwrap();
    }

    let (app, _media) = make_app(pool, Arc::new(ScriptedTextGenerator::new(vec![])));

    let response = app
        .oneshot(Request::get("/queue/status").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["pending"], 2);
    assert_eq!(body["low_water_mark"], 3);
    assert!(body["oldest_pending_at"].is_string());
}

#[tokio::test]
async fn runlog_returns_recent_entries_newest_first() {
    let pool = setup_test_db().await;
    run_log::append(
        &pool,
        "generate_batch",
        RunStatus::Success,
        "3 accepted, 0 rejected",
        serde_json::json!({ "accepted": 3 }),
    )
    .await
    .unwrap();

    let (app, _media) = make_app(pool, Arc::new(ScriptedTextGenerator::new(vec![])));

    let response = app
        .oneshot(Request::get("/runlog?limit=10").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["job_name"], "generate_batch");
}
