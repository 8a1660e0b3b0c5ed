use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::db::repository;
use crate::zotero::client::ZoteroClient;

const CACHE_TTL: Duration = Duration::from_secs(600);

/// Resolves Zotero collection names to keys and vice versa, backed by a
/// per-group TTL cache refreshed from the Zotero API.
pub struct CollectionResolver {
    db: SqlitePool,
    zotero: Arc<dyn ZoteroClient>,
    last_refresh: Mutex<HashMap<i64, Instant>>,
}

impl CollectionResolver {
    pub fn new(db: SqlitePool, zotero: Arc<dyn ZoteroClient>) -> Self {
        Self {
            db,
            zotero,
            last_refresh: Mutex::new(HashMap::new()),
        }
    }

    /// Refreshes the cache for `group_id` if it's stale, then stores the
    /// updated timestamp.
    pub async fn ensure_cache(&self, library_type: &str, group_id: i64) -> Result<(), crate::error::AppError> {
        {
            let last = self.last_refresh.lock().await;
            if let Some(t) = last.get(&group_id) {
                if t.elapsed() < CACHE_TTL {
                    return Ok(());
                }
            }
        }

        tracing::info!("refreshing collection cache for group {group_id}");
        let collections = self.zotero.get_collections(library_type, group_id).await?;
        repository::refresh_collections(&self.db, group_id, &collections).await?;

        let mut last = self.last_refresh.lock().await;
        last.insert(group_id, Instant::now());
        Ok(())
    }

    pub async fn names_to_keys(
        &self,
        library_type: &str,
        group_id: i64,
        names: &[String],
    ) -> Result<Vec<String>, crate::error::AppError> {
        self.ensure_cache(library_type, group_id).await?;
        let mut keys = Vec::new();
        for name in names {
            match repository::get_collection_key(&self.db, group_id, name).await? {
                Some(key) => keys.push(key),
                None => tracing::warn!("collection name '{name}' not found in group {group_id}, skipping"),
            }
        }
        Ok(keys)
    }

    pub async fn keys_to_names(
        &self,
        library_type: &str,
        group_id: i64,
        keys: &[String],
    ) -> Result<Vec<String>, crate::error::AppError> {
        self.ensure_cache(library_type, group_id).await?;
        let mut names = Vec::new();
        for key in keys {
            match repository::get_collection_name(&self.db, group_id, key).await? {
                Some(name) => names.push(name),
                None => tracing::warn!("collection key '{key}' not found in group {group_id}"),
            }
        }
        Ok(names)
    }
}
