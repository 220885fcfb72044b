//! opine-qg - Question Generation Microservice
//!
//! Generates poll questions on a schedule, deduplicates them against the
//! live corpus, queues them, and publishes the oldest queued question on
//! each scheduler trigger, with post-publish enrichment (classification,
//! automated vote, illustration) fanning out in the background.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use opine_qg::providers::{GeminiClient, OpenAiClient};
use opine_qg::storage::LocalObjectStore;
use opine_qg::AppState;

#[derive(Parser, Debug)]
#[command(name = "opine-qg", about = "Opine question generation service")]
struct Args {
    /// Root folder holding the database and media files
    #[arg(long)]
    root_folder: Option<String>,

    /// Port to listen on
    #[arg(long, default_value_t = 5810)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("Starting opine-qg (Question Generation) microservice");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Root folder: CLI → ENV → TOML → OS default
    let toml_config = opine_common::config::load_toml_config("opine-qg")?;
    let root_folder = opine_common::config::resolve_root_folder(
        args.root_folder.as_deref(),
        "OPINE_ROOT_FOLDER",
        toml_config.as_ref(),
    );
    opine_common::config::ensure_root_folder(&root_folder)?;

    let db_path = opine_common::config::database_path(&root_folder);
    info!("Database: {}", db_path.display());

    let db = opine_common::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    // Provider clients are built once here; everything downstream
    // receives them through AppState.
    let openai_key = opine_qg::config::resolve_openai_api_key(&db, toml_config.as_ref()).await?;
    let openai = Arc::new(OpenAiClient::new(openai_key)?);

    let gemini_key = opine_qg::config::resolve_gemini_api_key(&db, toml_config.as_ref()).await?;
    let gemini = Arc::new(GeminiClient::new(gemini_key)?);

    let text_provider = opine_qg::db::settings::get_text_provider(&db).await?;
    let text: Arc<dyn opine_qg::providers::TextGenerator> = match text_provider.as_str() {
        "gemini" => gemini.clone(),
        other => {
            if other != "openai" {
                warn!(provider = other, "Unknown text provider setting, using openai");
            }
            openai.clone()
        }
    };
    info!(provider = text.name(), "Text generation provider selected");

    let trigger_secret = opine_qg::config::resolve_trigger_secret(&db).await?;

    let media_dir = root_folder.join("media");
    let public_base_url = toml_config
        .as_ref()
        .and_then(|c| c.public_base_url.clone())
        .unwrap_or_else(|| format!("http://127.0.0.1:{}/media", args.port));
    let store = Arc::new(LocalObjectStore::new(media_dir.clone(), public_base_url));

    let state = AppState::new(db, text, openai, gemini, store, trigger_secret, media_dir);

    let app = opine_qg::build_router(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", args.port)).await?;
    info!("Listening on http://127.0.0.1:{}", args.port);
    info!("Health check: http://127.0.0.1:{}/health", args.port);

    axum::serve(listener, app).await?;

    Ok(())
}
