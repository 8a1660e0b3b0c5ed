use std::sync::Arc;

use clap::{Parser, Subcommand};
use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notero_sync::config::Config;
use notero_sync::db::repository;
use notero_sync::notion::client::{NotionClient, NotionHttpClient};
use notero_sync::notion::property_parser::extract_syncable_properties;
use notero_sync::sync::collection_resolver::CollectionResolver;
use notero_sync::sync::engine::SyncEngine;
use notero_sync::zotero::client::{ZoteroClient, ZoteroHttpClient};
use notero_sync::zotero::uri::parse_zotero_uri;

#[derive(Parser)]
#[command(name = "bootstrap", about = "One-off setup tasks for notero_sync")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Seeds sync_state from the current Notion/Zotero state, read-only (no Zotero writes).
    Seed,
    /// Pushes every relevant, linked Notion page's properties into a Zotero group.
    PopulateGroup {
        #[arg(long)]
        group_id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "bootstrap=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("missing configuration: {e}");
            std::process::exit(1);
        }
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let notion: Arc<dyn NotionClient> = Arc::new(NotionHttpClient::new(config.notion_api_key.clone()));
    let zotero: Arc<dyn ZoteroClient> = Arc::new(ZoteroHttpClient::new(config.zotero_api_key.clone()));
    let collections = Arc::new(CollectionResolver::new(pool.clone(), Arc::clone(&zotero)));

    let exit_code = match cli.command {
        Command::Seed => run_seed(&pool, &notion, &zotero, &collections, &config).await,
        Command::PopulateGroup { group_id } => {
            run_populate_group(&pool, &notion, &zotero, &collections, &config, group_id).await
        }
    };

    std::process::exit(exit_code);
}

/// Read-only snapshot: records current Zotero versions/properties for every
/// relevant, already-linked Notion page, without writing to Zotero.
async fn run_seed(
    pool: &sqlx::SqlitePool,
    notion: &Arc<dyn NotionClient>,
    zotero: &Arc<dyn ZoteroClient>,
    collections: &Arc<CollectionResolver>,
    config: &Config,
) -> i32 {
    let pages = match notion.query_all_pages(&config.notion_database_id).await {
        Ok(p) => p,
        Err(e) => {
            tracing::error!("failed to query Notion database: {e}");
            return 1;
        }
    };

    let mut seeded = 0;
    for page in &pages {
        let parsed = extract_syncable_properties(&page.properties);

        let relevant = parsed.get("Relevant?").and_then(|v| v.as_text());
        if !matches!(relevant, Some("Yes") | Some("Highly")) {
            continue;
        }

        let Some(zotero_uri) = parsed.get("zotero_uri").and_then(|v| v.as_text()) else {
            continue;
        };
        let Some(ref_) = parse_zotero_uri(zotero_uri) else {
            tracing::warn!("page {} has unparsable Zotero URI '{zotero_uri}'", page.id);
            continue;
        };

        match repository::get_sync_state(pool, &page.id).await {
            Ok(Some(_)) => {
                tracing::debug!("page {} already has sync state, skipping", page.id);
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!("failed to look up sync state for page {}: {e}", page.id);
                continue;
            }
        }

        let item = match zotero.get_item(&ref_.library_type, ref_.library_id, &ref_.item_key).await {
            Ok(item) => item,
            Err(e) => {
                tracing::warn!("could not fetch Zotero item {} for page {}: {e}", ref_.item_key, page.id);
                continue;
            }
        };

        if let Err(e) = repository::upsert_sync_state(
            pool,
            &page.id,
            &ref_.item_key,
            ref_.library_id,
            item.version,
            &parsed,
        )
        .await
        {
            tracing::error!("failed to record sync state for page {}: {e}", page.id);
            continue;
        }

        if let Err(e) = collections.ensure_cache(&ref_.library_type, ref_.library_id).await {
            tracing::warn!("failed to refresh collection cache for group {}: {e}", ref_.library_id);
        }

        seeded += 1;
    }

    tracing::info!("seeded sync state for {seeded} page(s) out of {} scanned", pages.len());
    0
}

/// Pushes Notion-side properties into Zotero for every relevant page linked
/// to the given group, useful after moving a Zotero library's items to a
/// fresh group and needing to re-establish property parity.
async fn run_populate_group(
    pool: &sqlx::SqlitePool,
    notion: &Arc<dyn NotionClient>,
    zotero: &Arc<dyn ZoteroClient>,
    collections: &Arc<CollectionResolver>,
    config: &Config,
    group_id: i64,
) -> i32 {
    let engine = SyncEngine::new(pool.clone(), Arc::clone(notion), Arc::clone(zotero), Arc::clone(collections));

    let pages = match notion.query_all_pages(&config.notion_database_id).await {
        Ok(p) => p,
        Err(e) => {
            tracing::error!("failed to query Notion database: {e}");
            return 1;
        }
    };

    let mut pushed = 0;
    for page in &pages {
        let parsed = extract_syncable_properties(&page.properties);
        let Some(zotero_uri) = parsed.get("zotero_uri").and_then(|v| v.as_text()) else {
            continue;
        };
        let Some(ref_) = parse_zotero_uri(zotero_uri) else {
            continue;
        };
        if ref_.library_id != group_id {
            continue;
        }

        if let Err(e) = engine.sync_page_properties(&page.id).await {
            tracing::error!("failed to push page {} into group {group_id}: {e}", page.id);
            continue;
        }
        pushed += 1;
    }

    tracing::info!("pushed properties for {pushed} page(s) into group {group_id}");
    0
}
