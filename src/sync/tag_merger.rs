use std::collections::HashSet;

/// Computes a three-way merge for an array field (tags or collections).
///
/// `base` is the snapshot from the last sync (common ancestor), `notion` and
/// `zotero` are the current values on each side. Notion's changes since
/// `base` (additions and removals) are applied on top of Zotero's current
/// state, so concurrent Zotero-side additions survive.
///
/// Example: base=[A,B,C], notion=[A,C,D] (added D, removed B),
/// zotero=[A,B,C,E] (added E) → result=[A,C,D,E].
pub fn three_way_merge(
    base: &[String],
    notion: &[String],
    zotero: &[String],
    preserve: &[String],
) -> Vec<String> {
    let base_set: HashSet<&String> = base.iter().collect();
    let notion_set: HashSet<&String> = notion.iter().collect();

    let notion_added: HashSet<&String> = notion_set.difference(&base_set).copied().collect();
    let notion_removed: HashSet<&String> = base_set.difference(&notion_set).copied().collect();

    let mut result: HashSet<String> = zotero.iter().cloned().collect();
    result.extend(notion_added.into_iter().cloned());
    for removed in &notion_removed {
        result.remove(removed.as_str());
    }
    result.extend(preserve.iter().cloned());

    // Stable order: Zotero's existing order first, then new additions sorted.
    let mut ordered: Vec<String> = zotero.iter().filter(|v| result.contains(*v)).cloned().collect();
    let ordered_set: HashSet<&String> = ordered.iter().collect();
    let mut new_items: Vec<String> = result
        .iter()
        .filter(|v| !ordered_set.contains(v))
        .cloned()
        .collect();
    new_items.sort();
    ordered.extend(new_items);

    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn as_set(items: &[String]) -> HashSet<String> {
        items.iter().cloned().collect()
    }

    #[test]
    fn test_no_changes() {
        let base = v(&["A", "B", "C"]);
        let result = three_way_merge(&base, &base, &base, &[]);
        assert_eq!(as_set(&result), as_set(&v(&["A", "B", "C"])));
    }

    #[test]
    fn test_notion_adds() {
        let base = v(&["A", "B", "C"]);
        let notion = v(&["A", "B", "C", "D"]);
        let zotero = v(&["A", "B", "C"]);
        let result = three_way_merge(&base, &notion, &zotero, &[]);
        assert_eq!(as_set(&result), as_set(&v(&["A", "B", "C", "D"])));
    }

    #[test]
    fn test_notion_removes() {
        let base = v(&["A", "B", "C"]);
        let notion = v(&["A", "C"]);
        let zotero = v(&["A", "B", "C"]);
        let result = three_way_merge(&base, &notion, &zotero, &[]);
        assert_eq!(as_set(&result), as_set(&v(&["A", "C"])));
    }

    #[test]
    fn test_zotero_adds() {
        let base = v(&["A", "B", "C"]);
        let notion = v(&["A", "B", "C"]);
        let zotero = v(&["A", "B", "C", "E"]);
        let result = three_way_merge(&base, &notion, &zotero, &[]);
        assert_eq!(as_set(&result), as_set(&v(&["A", "B", "C", "E"])));
    }

    #[test]
    fn test_both_add_different() {
        let base = v(&["A", "B", "C"]);
        let notion = v(&["A", "B", "C", "D"]);
        let zotero = v(&["A", "B", "C", "E"]);
        let result = three_way_merge(&base, &notion, &zotero, &[]);
        assert_eq!(as_set(&result), as_set(&v(&["A", "B", "C", "D", "E"])));
    }

    #[test]
    fn test_notion_removes_zotero_adds() {
        let base = v(&["A", "B", "C"]);
        let notion = v(&["A", "C", "D"]);
        let zotero = v(&["A", "B", "C", "E"]);
        let result = three_way_merge(&base, &notion, &zotero, &[]);
        assert_eq!(as_set(&result), as_set(&v(&["A", "C", "D", "E"])));
    }

    #[test]
    fn test_preserve_values() {
        let base = v(&["A", "B", "notion"]);
        let notion = v(&["A", "B"]);
        let zotero = v(&["A", "B"]);
        let result = three_way_merge(&base, &notion, &zotero, &v(&["notion"]));
        assert!(result.contains(&"notion".to_string()));
    }

    #[test]
    fn test_empty_base() {
        let result = three_way_merge(&[], &v(&["A", "B"]), &v(&["C"]), &[]);
        assert_eq!(as_set(&result), as_set(&v(&["A", "B", "C"])));
    }

    #[test]
    fn test_all_empty() {
        assert_eq!(three_way_merge(&[], &[], &[], &[]), Vec::<String>::new());
    }

    #[test]
    fn test_both_remove_same() {
        let base = v(&["A", "B", "C"]);
        let notion = v(&["A", "C"]);
        let zotero = v(&["A", "C"]);
        let result = three_way_merge(&base, &notion, &zotero, &[]);
        assert_eq!(as_set(&result), as_set(&v(&["A", "C"])));
    }

    #[test]
    fn test_stable_order() {
        let base = v(&["A", "B"]);
        let notion = v(&["A", "B", "D"]);
        let zotero = v(&["C", "A", "B"]);
        let result = three_way_merge(&base, &notion, &zotero, &[]);
        assert_eq!(result, v(&["C", "A", "B", "D"]));
    }
}
