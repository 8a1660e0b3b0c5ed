use std::collections::HashMap;
use std::sync::Arc;

use sqlx::SqlitePool;

use crate::db::models::NoteSyncState;
use crate::db::repository;
use crate::error::AppError;
use crate::notion::block_parser::{blocks_to_html, compute_blocks_hash};
use crate::notion::client::NotionClient;
use crate::zotero::client::{ZoteroClient, ZoteroError};
use crate::zotero::uri::ZoteroItemRef;

const ZOTERO_NOTES_HEADING: &str = "Zotero Notes";

struct NoteSection {
    block_id: String,
    has_children: bool,
    block: serde_json::Value,
}

/// Reverse-syncs note content: Notion blocks under a "Zotero Notes" heading
/// become child note items on the corresponding Zotero item.
pub struct NoteSyncEngine {
    db: SqlitePool,
    notion: Arc<dyn NotionClient>,
    zotero: Arc<dyn ZoteroClient>,
    delete_orphaned: bool,
}

impl NoteSyncEngine {
    pub fn new(
        db: SqlitePool,
        notion: Arc<dyn NotionClient>,
        zotero: Arc<dyn ZoteroClient>,
        delete_orphaned: bool,
    ) -> Self {
        Self {
            db,
            notion,
            zotero,
            delete_orphaned,
        }
    }

    pub async fn sync_page_notes(&self, notion_page_id: &str, ref_: &ZoteroItemRef) -> Result<(), AppError> {
        let blocks = self.notion.get_block_children(notion_page_id, false).await?;

        let note_sections = extract_note_sections(&blocks);
        if note_sections.is_empty() {
            tracing::debug!("no '{ZOTERO_NOTES_HEADING}' heading found on page {notion_page_id}");
            return Ok(());
        }

        let existing_states =
            repository::get_note_sync_states_for_parent(&self.db, &ref_.item_key, ref_.library_id).await?;
        let mut tracked: HashMap<String, NoteSyncState> =
            existing_states.into_iter().map(|s| (s.notion_block_id.clone(), s)).collect();

        for section in &note_sections {
            let section_blocks = if section.has_children {
                self.notion.get_block_children(&section.block_id, true).await?
            } else {
                vec![section.block.clone()]
            };
            if section_blocks.is_empty() {
                continue;
            }

            let content_hash = compute_blocks_hash(&section_blocks);

            if let Some(state) = tracked.remove(&section.block_id) {
                if content_hash != state.content_hash {
                    self.update_existing_note(&state.zotero_note_key, ref_, &section_blocks, &section.block_id, &content_hash)
                        .await?;
                } else {
                    tracing::debug!("note block {} unchanged, skipping", section.block_id);
                }
            } else {
                self.create_new_note(ref_, &section_blocks, &section.block_id, &content_hash).await?;
            }
        }

        for (block_id, state) in tracked {
            if self.delete_orphaned {
                tracing::info!("deleting orphaned Zotero note {}", state.zotero_note_key);
                match self.zotero.get_item(&ref_.library_type, ref_.library_id, &state.zotero_note_key).await {
                    Ok(note_item) => {
                        self.zotero
                            .delete_item(&ref_.library_type, ref_.library_id, &state.zotero_note_key, note_item.version)
                            .await?;
                    }
                    Err(ZoteroError::NotFound(_)) => {}
                    Err(e) => return Err(e.into()),
                }
                repository::delete_note_sync_state(&self.db, &block_id).await?;
            } else {
                tracing::info!(
                    "orphaned note block {block_id} (Zotero key {}) — skipping deletion",
                    state.zotero_note_key
                );
            }
        }

        Ok(())
    }

    async fn update_existing_note(
        &self,
        zotero_note_key: &str,
        ref_: &ZoteroItemRef,
        blocks: &[serde_json::Value],
        block_id: &str,
        content_hash: &str,
    ) -> Result<(), AppError> {
        let html = blocks_to_html(blocks);
        tracing::info!("updating Zotero note {zotero_note_key} from Notion block {block_id}");

        match self.zotero.get_item(&ref_.library_type, ref_.library_id, zotero_note_key).await {
            Ok(note_item) => {
                match self
                    .zotero
                    .patch_item(
                        &ref_.library_type,
                        ref_.library_id,
                        zotero_note_key,
                        &serde_json::json!({ "note": html }),
                        note_item.version,
                    )
                    .await
                {
                    Ok(_) => {
                        repository::upsert_note_sync_state(
                            &self.db,
                            block_id,
                            zotero_note_key,
                            &ref_.item_key,
                            ref_.library_id,
                            content_hash,
                        )
                        .await?;
                    }
                    Err(ZoteroError::Conflict { .. }) => {
                        tracing::warn!("version conflict updating note {zotero_note_key}, will retry next cycle");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Err(ZoteroError::NotFound(_)) => {
                tracing::warn!("Zotero note {zotero_note_key} not found, removing tracking");
                repository::delete_note_sync_state(&self.db, block_id).await?;
            }
            Err(e) => return Err(e.into()),
        }

        Ok(())
    }

    async fn create_new_note(
        &self,
        ref_: &ZoteroItemRef,
        blocks: &[serde_json::Value],
        block_id: &str,
        content_hash: &str,
    ) -> Result<(), AppError> {
        let html = blocks_to_html(blocks);
        tracing::info!("creating new Zotero note from Notion block {block_id}");

        let note_item = self
            .zotero
            .create_note(&ref_.library_type, ref_.library_id, &ref_.item_key, &html, &[])
            .await?;

        repository::upsert_note_sync_state(
            &self.db,
            block_id,
            &note_item.key,
            &ref_.item_key,
            ref_.library_id,
            content_hash,
        )
        .await?;

        Ok(())
    }
}

/// Finds the "Zotero Notes" heading and extracts the note sections under it.
/// Each direct child block is one section. A block with `has_children` is
/// only a marker here — `sync_page_notes` performs the actual follow-up
/// fetch for its children, since block listings don't nest content inline.
fn extract_note_sections(blocks: &[serde_json::Value]) -> Vec<NoteSection> {
    let mut sections = Vec::new();
    let mut in_notes_section = false;

    for block in blocks {
        let bt = block.get("type").and_then(|v| v.as_str()).unwrap_or("");

        if matches!(bt, "heading_1" | "heading_2" | "heading_3") {
            let text = block_text(block, bt);
            if text.trim() == ZOTERO_NOTES_HEADING {
                in_notes_section = true;
                continue;
            } else if in_notes_section {
                break;
            }
        }

        if in_notes_section {
            let block_id = block.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string();
            let has_children = block.get("has_children").and_then(|v| v.as_bool()).unwrap_or(false);
            sections.push(NoteSection { block_id, has_children, block: block.clone() });
        }
    }

    sections
}

fn block_text(block: &serde_json::Value, bt: &str) -> String {
    block
        .get(bt)
        .and_then(|d| d.get("rich_text"))
        .and_then(|v| v.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|rt| rt.get("plain_text").and_then(|v| v.as_str()))
                .collect::<String>()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn heading(text: &str) -> serde_json::Value {
        json!({
            "type": "heading_2",
            "id": "heading-1",
            "heading_2": {"rich_text": [{"plain_text": text}]},
        })
    }

    fn para(id: &str, text: &str) -> serde_json::Value {
        json!({
            "type": "paragraph",
            "id": id,
            "paragraph": {"rich_text": [{"plain_text": text}]},
        })
    }

    #[test]
    fn no_heading_means_no_sections() {
        let blocks = vec![para("a", "just a note")];
        assert!(extract_note_sections(&blocks).is_empty());
    }

    #[test]
    fn collects_blocks_under_the_heading() {
        let blocks = vec![heading(ZOTERO_NOTES_HEADING), para("a", "first"), para("b", "second")];
        let sections = extract_note_sections(&blocks);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].block_id, "a");
        assert_eq!(sections[1].block_id, "b");
    }

    #[test]
    fn another_heading_ends_the_section() {
        let blocks = vec![
            heading(ZOTERO_NOTES_HEADING),
            para("a", "first"),
            heading("Other Stuff"),
            para("b", "excluded"),
        ];
        let sections = extract_note_sections(&blocks);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].block_id, "a");
    }

    #[test]
    fn marks_has_children_for_follow_up_fetch() {
        let parent = json!({
            "type": "toggle",
            "id": "parent-1",
            "has_children": true,
            "toggle": {"rich_text": []},
        });
        let blocks = vec![heading(ZOTERO_NOTES_HEADING), parent];
        let sections = extract_note_sections(&blocks);
        assert_eq!(sections.len(), 1);
        assert!(sections[0].has_children);
        assert_eq!(sections[0].block_id, "parent-1");
    }
}
