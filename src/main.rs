use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notero_sync::config::Config;
use notero_sync::error::AppError;
use notero_sync::notion::client::{NotionClient, NotionHttpClient, NoopNotionClient};
use notero_sync::state::AppState;
use notero_sync::sync::collection_resolver::CollectionResolver;
use notero_sync::sync::engine::SyncEngine;
use notero_sync::sync::note_sync::NoteSyncEngine;
use notero_sync::webhook;
use notero_sync::zotero::client::{NoopZoteroClient, ZoteroClient, ZoteroHttpClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "notero_sync=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let notion: Arc<dyn NotionClient> = if config.notion_api_key.is_empty() {
        tracing::warn!("no Notion API key configured, falling back to Noop client");
        Arc::new(NoopNotionClient)
    } else {
        Arc::new(NotionHttpClient::new(config.notion_api_key.clone()))
    };

    let zotero: Arc<dyn ZoteroClient> = if config.zotero_api_key.is_empty() {
        tracing::warn!("no Zotero API key configured, falling back to Noop client");
        Arc::new(NoopZoteroClient)
    } else {
        Arc::new(ZoteroHttpClient::new(config.zotero_api_key.clone()))
    };

    let collections = Arc::new(CollectionResolver::new(pool.clone(), Arc::clone(&zotero)));
    let sync_engine = Arc::new(SyncEngine::new(
        pool.clone(),
        Arc::clone(&notion),
        Arc::clone(&zotero),
        Arc::clone(&collections),
    ));
    let note_sync_engine = Arc::new(NoteSyncEngine::new(
        pool.clone(),
        Arc::clone(&notion),
        Arc::clone(&zotero),
        config.delete_orphaned_notes,
    ));

    let state = AppState {
        db: pool,
        notion,
        zotero,
        sync_engine,
        note_sync_engine,
        collections,
        config: Arc::new(config.clone()),
    };

    let app = Router::new()
        .route("/health", get(health))
        .merge(webhook::handler::routes())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    sqlx::query("select 1").execute(&state.db).await?;
    Ok(Json(json!({ "status": "ok" })))
}