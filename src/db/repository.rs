use std::collections::HashMap;

use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::{CollectionMapRow, NoteSyncState, SyncState, WebhookEventRow};
use crate::notion::property_parser::PropertyValue;
use crate::zotero::client::ZoteroCollectionSummary;

pub async fn get_sync_state(
    db: &SqlitePool,
    notion_page_id: &str,
) -> Result<Option<SyncState>, sqlx::Error> {
    sqlx::query_as::<_, SyncState>(
        "SELECT notion_page_id, zotero_item_key, zotero_group_id, last_zotero_version, \
         property_snapshot, last_synced_at, deleted \
         FROM sync_state WHERE notion_page_id = ?",
    )
    .bind(notion_page_id)
    .fetch_optional(db)
    .await
}

/// Decodes `property_snapshot` into a typed map. Returns an empty map for a
/// missing or empty snapshot (first sync).
pub fn decode_snapshot(state: &Option<SyncState>) -> HashMap<String, PropertyValue> {
    state
        .as_ref()
        .and_then(|s| serde_json::from_str(&s.property_snapshot).ok())
        .unwrap_or_default()
}

pub async fn upsert_sync_state(
    db: &SqlitePool,
    notion_page_id: &str,
    zotero_item_key: &str,
    zotero_group_id: i64,
    last_zotero_version: i64,
    property_snapshot: &HashMap<String, PropertyValue>,
) -> Result<(), sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    let snapshot_json = serde_json::to_string(property_snapshot).unwrap_or_default();

    sqlx::query(
        "INSERT INTO sync_state \
            (notion_page_id, zotero_item_key, zotero_group_id, last_zotero_version, \
             property_snapshot, last_synced_at, deleted) \
         VALUES (?, ?, ?, ?, ?, ?, 0) \
         ON CONFLICT(notion_page_id) DO UPDATE SET \
            zotero_item_key = excluded.zotero_item_key, \
            zotero_group_id = excluded.zotero_group_id, \
            last_zotero_version = excluded.last_zotero_version, \
            property_snapshot = excluded.property_snapshot, \
            last_synced_at = excluded.last_synced_at, \
            deleted = 0",
    )
    .bind(notion_page_id)
    .bind(zotero_item_key)
    .bind(zotero_group_id)
    .bind(last_zotero_version)
    .bind(snapshot_json)
    .bind(now)
    .execute(db)
    .await?;

    Ok(())
}

pub async fn mark_deleted(db: &SqlitePool, notion_page_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE sync_state SET deleted = 1 WHERE notion_page_id = ?")
        .bind(notion_page_id)
        .execute(db)
        .await?;
    Ok(())
}

/// Records a received webhook event. Returns `false` without writing if the
/// event was already recorded (delivery dedup).
pub async fn record_event(
    db: &SqlitePool,
    event_id: &str,
    notion_page_id: &str,
) -> Result<bool, sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        "INSERT OR IGNORE INTO webhook_events (event_id, notion_page_id, received_at, processed) \
         VALUES (?, ?, ?, 0)",
    )
    .bind(event_id)
    .bind(notion_page_id)
    .bind(now)
    .execute(db)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn is_event_processed(db: &SqlitePool, event_id: &str) -> Result<bool, sqlx::Error> {
    let row = sqlx::query_as::<_, WebhookEventRow>(
        "SELECT event_id, notion_page_id, received_at, processed FROM webhook_events WHERE event_id = ?",
    )
    .bind(event_id)
    .fetch_optional(db)
    .await?;

    Ok(row.map(|r| r.processed).unwrap_or(false))
}

pub async fn mark_event_processed(db: &SqlitePool, event_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE webhook_events SET processed = 1 WHERE event_id = ?")
        .bind(event_id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn get_collection_key(
    db: &SqlitePool,
    group_id: i64,
    name: &str,
) -> Result<Option<String>, sqlx::Error> {
    let row = sqlx::query_as::<_, CollectionMapRow>(
        "SELECT group_id, collection_key, collection_name FROM collection_map \
         WHERE group_id = ? AND collection_name = ?",
    )
    .bind(group_id)
    .bind(name)
    .fetch_optional(db)
    .await?;

    Ok(row.map(|r| r.collection_key))
}

pub async fn get_collection_name(
    db: &SqlitePool,
    group_id: i64,
    key: &str,
) -> Result<Option<String>, sqlx::Error> {
    let row = sqlx::query_as::<_, CollectionMapRow>(
        "SELECT group_id, collection_key, collection_name FROM collection_map \
         WHERE group_id = ? AND collection_key = ?",
    )
    .bind(group_id)
    .bind(key)
    .fetch_optional(db)
    .await?;

    Ok(row.map(|r| r.collection_name))
}

/// Replaces the entire collection_map row set for a group in one transaction.
pub async fn refresh_collections(
    db: &SqlitePool,
    group_id: i64,
    collections: &[ZoteroCollectionSummary],
) -> Result<(), sqlx::Error> {
    let mut tx = db.begin().await?;

    sqlx::query("DELETE FROM collection_map WHERE group_id = ?")
        .bind(group_id)
        .execute(&mut *tx)
        .await?;

    for c in collections {
        sqlx::query(
            "INSERT INTO collection_map (group_id, collection_key, collection_name) VALUES (?, ?, ?)",
        )
        .bind(group_id)
        .bind(&c.key)
        .bind(&c.name)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn get_note_sync_state(
    db: &SqlitePool,
    notion_block_id: &str,
) -> Result<Option<NoteSyncState>, sqlx::Error> {
    sqlx::query_as::<_, NoteSyncState>(
        "SELECT notion_block_id, zotero_note_key, zotero_parent_key, zotero_group_id, \
         content_hash, last_synced_at FROM note_sync_state WHERE notion_block_id = ?",
    )
    .bind(notion_block_id)
    .fetch_optional(db)
    .await
}

pub async fn get_note_sync_states_for_parent(
    db: &SqlitePool,
    zotero_parent_key: &str,
    zotero_group_id: i64,
) -> Result<Vec<NoteSyncState>, sqlx::Error> {
    sqlx::query_as::<_, NoteSyncState>(
        "SELECT notion_block_id, zotero_note_key, zotero_parent_key, zotero_group_id, \
         content_hash, last_synced_at FROM note_sync_state \
         WHERE zotero_parent_key = ? AND zotero_group_id = ?",
    )
    .bind(zotero_parent_key)
    .bind(zotero_group_id)
    .fetch_all(db)
    .await
}

#[allow(clippy::too_many_arguments)]
pub async fn upsert_note_sync_state(
    db: &SqlitePool,
    notion_block_id: &str,
    zotero_note_key: &str,
    zotero_parent_key: &str,
    zotero_group_id: i64,
    content_hash: &str,
) -> Result<(), sqlx::Error> {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        "INSERT INTO note_sync_state \
            (notion_block_id, zotero_note_key, zotero_parent_key, zotero_group_id, \
             content_hash, last_synced_at) \
         VALUES (?, ?, ?, ?, ?, ?) \
         ON CONFLICT(notion_block_id) DO UPDATE SET \
            zotero_note_key = excluded.zotero_note_key, \
            zotero_parent_key = excluded.zotero_parent_key, \
            zotero_group_id = excluded.zotero_group_id, \
            content_hash = excluded.content_hash, \
            last_synced_at = excluded.last_synced_at",
    )
    .bind(notion_block_id)
    .bind(zotero_note_key)
    .bind(zotero_parent_key)
    .bind(zotero_group_id)
    .bind(content_hash)
    .bind(now)
    .execute(db)
    .await?;

    Ok(())
}

pub async fn delete_note_sync_state(db: &SqlitePool, notion_block_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM note_sync_state WHERE notion_block_id = ?")
        .bind(notion_block_id)
        .execute(db)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .expect("failed to open in-memory sqlite db");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("failed to run migrations");
        pool
    }

    #[tokio::test]
    async fn record_event_dedups_the_same_event_id() {
        let db = setup_test_db().await;

        let first = record_event(&db, "evt-1", "page-1").await.unwrap();
        let second = record_event(&db, "evt-1", "page-1").await.unwrap();

        assert!(first);
        assert!(!second);
    }

    #[tokio::test]
    async fn record_event_allows_distinct_event_ids() {
        let db = setup_test_db().await;

        assert!(record_event(&db, "evt-1", "page-1").await.unwrap());
        assert!(record_event(&db, "evt-2", "page-1").await.unwrap());
    }

    #[tokio::test]
    async fn mark_event_processed_flips_is_event_processed() {
        let db = setup_test_db().await;
        record_event(&db, "evt-1", "page-1").await.unwrap();

        assert!(!is_event_processed(&db, "evt-1").await.unwrap());
        mark_event_processed(&db, "evt-1").await.unwrap();
        assert!(is_event_processed(&db, "evt-1").await.unwrap());
    }

    #[tokio::test]
    async fn is_event_processed_false_for_unknown_event() {
        let db = setup_test_db().await;
        assert!(!is_event_processed(&db, "nope").await.unwrap());
    }

    #[tokio::test]
    async fn sync_state_round_trips_through_upsert() {
        let db = setup_test_db().await;
        let mut snapshot = HashMap::new();
        snapshot.insert("Tags".to_string(), PropertyValue::List(vec!["a".to_string()]));

        upsert_sync_state(&db, "page-1", "ITEM1", 123, 5, &snapshot).await.unwrap();
        let state = get_sync_state(&db, "page-1").await.unwrap().unwrap();

        assert_eq!(state.zotero_item_key, "ITEM1");
        assert_eq!(state.zotero_group_id, 123);
        assert_eq!(state.last_zotero_version, 5);
        assert!(!state.deleted);

        let decoded = decode_snapshot(&Some(state));
        assert_eq!(decoded.get("Tags").and_then(|v| v.as_list()), Some(&["a".to_string()][..]));
    }

    #[tokio::test]
    async fn upsert_sync_state_clears_deleted_flag_on_resync() {
        let db = setup_test_db().await;
        let empty = HashMap::new();

        upsert_sync_state(&db, "page-1", "ITEM1", 123, 1, &empty).await.unwrap();
        mark_deleted(&db, "page-1").await.unwrap();
        assert!(get_sync_state(&db, "page-1").await.unwrap().unwrap().deleted);

        upsert_sync_state(&db, "page-1", "ITEM1", 123, 2, &empty).await.unwrap();
        assert!(!get_sync_state(&db, "page-1").await.unwrap().unwrap().deleted);
    }

    #[tokio::test]
    async fn get_sync_state_returns_none_when_absent() {
        let db = setup_test_db().await;
        assert!(get_sync_state(&db, "missing-page").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn collection_map_refresh_replaces_prior_rows() {
        let db = setup_test_db().await;
        refresh_collections(
            &db,
            1,
            &[ZoteroCollectionSummary { key: "AAA".to_string(), name: "Old".to_string() }],
        )
        .await
        .unwrap();
        refresh_collections(
            &db,
            1,
            &[ZoteroCollectionSummary { key: "BBB".to_string(), name: "New".to_string() }],
        )
        .await
        .unwrap();

        assert_eq!(get_collection_key(&db, 1, "Old").await.unwrap(), None);
        assert_eq!(get_collection_key(&db, 1, "New").await.unwrap(), Some("BBB".to_string()));
        assert_eq!(get_collection_name(&db, 1, "BBB").await.unwrap(), Some("New".to_string()));
    }
}
