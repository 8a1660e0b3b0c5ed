use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::notion::client::NotionClient;
use crate::sync::collection_resolver::CollectionResolver;
use crate::sync::engine::SyncEngine;
use crate::sync::note_sync::NoteSyncEngine;
use crate::zotero::client::ZoteroClient;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub notion: Arc<dyn NotionClient>,
    pub zotero: Arc<dyn ZoteroClient>,
    pub sync_engine: Arc<SyncEngine>,
    pub note_sync_engine: Arc<NoteSyncEngine>,
    pub collections: Arc<CollectionResolver>,
    pub config: Arc<Config>,
}
