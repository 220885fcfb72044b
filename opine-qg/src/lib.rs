//! opine-qg library interface
//!
//! Exposes the pipeline components and HTTP surface for integration
//! testing.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod pipeline;
pub mod providers;
pub mod storage;

pub use crate::error::{ApiError, ApiResult};

use crate::pipeline::Publisher;
use crate::providers::{Embedder, ImageGenerator, TextGenerator};
use crate::storage::ObjectStore;
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Application state shared across handlers
///
/// Provider clients are constructed once at startup from configuration
/// and injected here; no component builds its own client per call.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Text generation provider (static selection at startup)
    pub text: Arc<dyn TextGenerator>,
    /// Embedding provider
    pub embedder: Arc<dyn Embedder>,
    /// Image generation provider
    pub image: Arc<dyn ImageGenerator>,
    /// Object store for generated illustrations
    pub store: Arc<dyn ObjectStore>,
    /// Shared secret for the scheduler trigger surface
    pub trigger_secret: String,
    /// Media directory served under /media
    pub media_dir: PathBuf,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: SqlitePool,
        text: Arc<dyn TextGenerator>,
        embedder: Arc<dyn Embedder>,
        image: Arc<dyn ImageGenerator>,
        store: Arc<dyn ObjectStore>,
        trigger_secret: String,
        media_dir: PathBuf,
    ) -> Self {
        Self {
            db,
            text,
            embedder,
            image,
            store,
            trigger_secret,
            media_dir,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Build a publisher over this state's providers
    pub fn publisher(&self) -> Publisher {
        Publisher::new(
            self.db.clone(),
            self.text.clone(),
            self.embedder.clone(),
            self.image.clone(),
            self.store.clone(),
        )
    }

    /// Record the most recent error for /health diagnostics
    pub async fn record_error(&self, message: &str) {
        *self.last_error.write().await = Some(message.to_string());
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use tower_http::services::ServeDir;

    let media_dir = state.media_dir.clone();

    Router::new()
        .merge(api::health_routes())
        .merge(api::job_routes())
        .merge(api::inspect_routes())
        .nest_service("/media", ServeDir::new(media_dir))
        .with_state(state)
}
