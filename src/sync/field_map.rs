use once_cell::sync::Lazy;

/// Tag Notero itself adds to every synced item; always preserved by the
/// three-way merge even if both sides try to remove it.
pub const NOTERO_TAG: &str = "notion";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// For array fields (tags, collections).
    ThreeWay,
    /// For text fields: Notion wins unless both sides changed.
    Scalar,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldMapping {
    pub notion_name: &'static str,
    pub zotero_field: &'static str,
    pub merge_strategy: MergeStrategy,
}

/// Notion properties that sync back to Zotero, in the order they're applied.
pub static SYNCABLE_FIELDS: &[FieldMapping] = &[
    FieldMapping {
        notion_name: "Tags",
        zotero_field: "tags",
        merge_strategy: MergeStrategy::ThreeWay,
    },
    FieldMapping {
        notion_name: "Collections",
        zotero_field: "collections",
        merge_strategy: MergeStrategy::ThreeWay,
    },
    FieldMapping {
        notion_name: "Abstract",
        zotero_field: "abstractNote",
        merge_strategy: MergeStrategy::Scalar,
    },
    FieldMapping {
        notion_name: "Short Title",
        zotero_field: "shortTitle",
        merge_strategy: MergeStrategy::Scalar,
    },
    FieldMapping {
        notion_name: "Extra",
        zotero_field: "extra",
        merge_strategy: MergeStrategy::Scalar,
    },
];

pub static FIELD_MAP_BY_NOTION: Lazy<std::collections::HashMap<&'static str, FieldMapping>> =
    Lazy::new(|| {
        SYNCABLE_FIELDS
            .iter()
            .map(|f| (f.notion_name, *f))
            .collect()
    });

pub fn notion_tags_to_zotero(tags: &[String]) -> Vec<serde_json::Value> {
    tags.iter().map(|t| serde_json::json!({ "tag": t })).collect()
}

pub fn zotero_tags_to_list(tags: &[serde_json::Value]) -> Vec<String> {
    tags.iter()
        .filter_map(|t| t.get("tag").and_then(|v| v.as_str()).map(str::to_string))
        .collect()
}
