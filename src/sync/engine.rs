use std::collections::HashMap;
use std::sync::Arc;

use sqlx::SqlitePool;

use crate::db::repository;
use crate::error::AppError;
use crate::notion::client::NotionClient;
use crate::notion::property_parser::{extract_syncable_properties, PropertyValue};
use crate::sync::collection_resolver::CollectionResolver;
use crate::sync::field_map::{notion_tags_to_zotero, zotero_tags_to_list, MergeStrategy, FIELD_MAP_BY_NOTION, NOTERO_TAG};
use crate::sync::retry::{retry_on_conflict, RetryOutcome};
use crate::zotero::client::{ZoteroClient, ZoteroItem};
use crate::zotero::uri::{parse_zotero_uri, ZoteroItemRef};

/// Core diff → merge → patch pipeline: syncs property changes from a Notion
/// page to the corresponding Zotero item.
pub struct SyncEngine {
    db: SqlitePool,
    notion: Arc<dyn NotionClient>,
    zotero: Arc<dyn ZoteroClient>,
    collections: Arc<CollectionResolver>,
}

impl SyncEngine {
    pub fn new(
        db: SqlitePool,
        notion: Arc<dyn NotionClient>,
        zotero: Arc<dyn ZoteroClient>,
        collections: Arc<CollectionResolver>,
    ) -> Self {
        Self {
            db,
            notion,
            zotero,
            collections,
        }
    }

    pub async fn sync_page_properties(&self, notion_page_id: &str) -> Result<(), AppError> {
        let properties = self.notion.get_page_properties(notion_page_id).await?;
        let parsed = extract_syncable_properties(&properties);

        let relevant = parsed.get("Relevant?").and_then(|v| v.as_text());
        if !matches!(relevant, Some("Yes") | Some("Highly")) {
            tracing::debug!("page {notion_page_id} has Relevant?={relevant:?}, skipping sync");
            return Ok(());
        }

        let Some(zotero_uri) = parsed.get("zotero_uri").and_then(|v| v.as_text()) else {
            tracing::warn!("page {notion_page_id} has no Zotero URI, skipping");
            return Ok(());
        };

        let Some(ref_) = parse_zotero_uri(zotero_uri) else {
            tracing::warn!("cannot parse Zotero URI '{zotero_uri}' on page {notion_page_id}");
            return Ok(());
        };

        let sync_state = repository::get_sync_state(&self.db, notion_page_id).await?;
        if sync_state.as_ref().map(|s| s.deleted).unwrap_or(false) {
            tracing::info!("page {notion_page_id} is marked deleted, skipping");
            return Ok(());
        }

        let base_snapshot = repository::decode_snapshot(&sync_state);

        // Each retry attempt re-fetches the item and recomputes the patch from
        // scratch, so a 412 from `patch_item` (the only call in this cycle
        // that can conflict) re-merges against the item's latest version
        // instead of blindly resubmitting a stale patch.
        let zotero = Arc::clone(&self.zotero);
        let collections = Arc::clone(&self.collections);
        let ref_for_attempt = ref_.clone();
        let notion_props = parsed.clone();
        let base_snapshot_for_attempt = base_snapshot.clone();

        let outcome = retry_on_conflict(
            || {
                let zotero = Arc::clone(&zotero);
                let collections = Arc::clone(&collections);
                let ref_ = ref_for_attempt.clone();
                let notion_props = notion_props.clone();
                let base_snapshot = base_snapshot_for_attempt.clone();
                async move { fetch_merge_and_patch(&zotero, &collections, &ref_, &notion_props, &base_snapshot).await }
            },
            |d| tokio::time::sleep(d),
        )
        .await?;

        match outcome {
            RetryOutcome::Success(version) => {
                let new_snapshot = build_snapshot(&parsed);
                repository::upsert_sync_state(
                    &self.db,
                    notion_page_id,
                    &ref_.item_key,
                    ref_.library_id,
                    version,
                    &new_snapshot,
                )
                .await?;
                Ok(())
            }
            RetryOutcome::NotFound => {
                tracing::warn!("Zotero item {} not found (404), marking deleted", ref_.item_key);
                repository::mark_deleted(&self.db, notion_page_id).await?;
                Ok(())
            }
            RetryOutcome::GaveUp => {
                tracing::error!("version conflict patching {} after retries, giving up", ref_.item_key);
                Ok(())
            }
        }
    }
}

/// One fetch→merge→patch attempt: fetches the current Zotero item, computes
/// the patch against it, and applies the patch if there's anything to write.
/// Returns the item's resulting version either way.
async fn fetch_merge_and_patch(
    zotero: &Arc<dyn ZoteroClient>,
    collections: &Arc<CollectionResolver>,
    ref_: &ZoteroItemRef,
    notion_props: &HashMap<String, PropertyValue>,
    base_snapshot: &HashMap<String, PropertyValue>,
) -> Result<i64, AppError> {
    let zotero_item = zotero
        .get_item(&ref_.library_type, ref_.library_id, &ref_.item_key)
        .await?;

    let patch_data = compute_patch(collections.as_ref(), ref_, notion_props, base_snapshot, &zotero_item).await?;

    if patch_data.is_empty() {
        tracing::debug!("no changes to sync for Zotero item {}", ref_.item_key);
        return Ok(zotero_item.version);
    }

    let keys: Vec<&String> = patch_data.keys().collect();
    tracing::info!("patching Zotero item {} with fields: {:?}", ref_.item_key, keys);

    let new_version = zotero
        .patch_item(
            &ref_.library_type,
            ref_.library_id,
            &ref_.item_key,
            &serde_json::Value::Object(patch_data),
            zotero_item.version,
        )
        .await?;

    Ok(new_version)
}

async fn compute_patch(
    collections: &CollectionResolver,
    ref_: &ZoteroItemRef,
    notion_props: &HashMap<String, PropertyValue>,
    base_snapshot: &HashMap<String, PropertyValue>,
    zotero_item: &ZoteroItem,
) -> Result<serde_json::Map<String, serde_json::Value>, AppError> {
    let mut patch_data = serde_json::Map::new();

    for mapping in FIELD_MAP_BY_NOTION.values() {
        let Some(notion_value) = notion_props.get(mapping.notion_name) else {
            continue;
        };

        match mapping.merge_strategy {
            MergeStrategy::ThreeWay => {
                if mapping.zotero_field == "tags" {
                    let notion_current = notion_value.as_list().unwrap_or_default().to_vec();
                    let base = base_snapshot
                        .get(mapping.notion_name)
                        .and_then(|v| v.as_list())
                        .unwrap_or_default()
                        .to_vec();
                    let zotero_tags = zotero_item.data.get("tags").and_then(|v| v.as_array()).cloned().unwrap_or_default();
                    let zotero_current = zotero_tags_to_list(&zotero_tags);
                    let preserve = vec![NOTERO_TAG.to_string()];
                    let merged = crate::sync::tag_merger::three_way_merge(&base, &notion_current, &zotero_current, &preserve);

                    if as_set(&merged) != as_set(&zotero_current) {
                        patch_data.insert("tags".to_string(), serde_json::Value::Array(notion_tags_to_zotero(&merged)));
                    }
                } else if mapping.zotero_field == "collections" {
                    let notion_current = notion_value.as_list().unwrap_or_default().to_vec();
                    let base = base_snapshot
                        .get(mapping.notion_name)
                        .and_then(|v| v.as_list())
                        .unwrap_or_default()
                        .to_vec();
                    let zotero_current_keys: Vec<String> = zotero_item
                        .data
                        .get("collections")
                        .and_then(|v| v.as_array())
                        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                        .unwrap_or_default();

                    let notion_keys = collections.names_to_keys(&ref_.library_type, ref_.library_id, &notion_current).await?;
                    let base_keys = collections.names_to_keys(&ref_.library_type, ref_.library_id, &base).await?;
                    let merged = crate::sync::tag_merger::three_way_merge(&base_keys, &notion_keys, &zotero_current_keys, &[]);

                    if as_set(&merged) != as_set(&zotero_current_keys) {
                        patch_data.insert(
                            "collections".to_string(),
                            serde_json::Value::Array(merged.into_iter().map(serde_json::Value::String).collect()),
                        );
                    }
                }
            }
            MergeStrategy::Scalar => {
                let notion_current = notion_value.as_text().unwrap_or("");
                let zotero_current = zotero_item
                    .data
                    .get(mapping.zotero_field)
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                let base = base_snapshot
                    .get(mapping.notion_name)
                    .and_then(|v| v.as_text())
                    .unwrap_or("");

                if let Some(new_value) = merge_scalar_field(notion_current, zotero_current, base) {
                    patch_data.insert(mapping.zotero_field.to_string(), serde_json::Value::String(new_value));
                }
            }
        }
    }

    Ok(patch_data)
}

fn as_set(items: &[String]) -> std::collections::HashSet<&String> {
    items.iter().collect()
}

/// Resolves a scalar field's new value: Notion wins unless both sides
/// changed since the last synced snapshot, in which case Zotero wins.
fn merge_scalar_field(notion_current: &str, zotero_current: &str, base: &str) -> Option<String> {
    let notion_changed = notion_current != base;
    let zotero_changed = zotero_current != base;

    if !notion_changed {
        return None;
    }
    if !zotero_changed {
        return Some(notion_current.to_string());
    }

    tracing::warn!("conflict: both Notion and Zotero changed a scalar field, Zotero wins");
    None
}

fn build_snapshot(notion_props: &HashMap<String, PropertyValue>) -> HashMap<String, PropertyValue> {
    let mut snapshot = HashMap::new();
    for mapping in FIELD_MAP_BY_NOTION.values() {
        if let Some(v) = notion_props.get(mapping.notion_name) {
            snapshot.insert(mapping.notion_name.to_string(), v.clone());
        }
    }
    snapshot
}
