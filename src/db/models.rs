use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The three-way-merge baseline for one synced Notion page.
///
/// `property_snapshot` is stored as a JSON-encoded object; callers go
/// through `db::repository` to get/set it as a typed map rather than
/// touching the raw column.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SyncState {
    pub notion_page_id: String,
    pub zotero_item_key: String,
    pub zotero_group_id: i64,
    pub last_zotero_version: i64,
    pub property_snapshot: String,
    pub last_synced_at: String,
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NoteSyncState {
    pub notion_block_id: String,
    pub zotero_note_key: String,
    pub zotero_parent_key: String,
    pub zotero_group_id: i64,
    pub content_hash: String,
    pub last_synced_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WebhookEventRow {
    pub event_id: String,
    pub notion_page_id: String,
    pub received_at: String,
    pub processed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CollectionMapRow {
    pub group_id: i64,
    pub collection_key: String,
    pub collection_name: String,
}
