use once_cell::sync::Lazy;
use regex::Regex;

/// A parsed reference to a Zotero item, extracted from a "Zotero URI" property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoteroItemRef {
    pub library_type: String,
    pub library_id: i64,
    pub item_key: String,
}

impl ZoteroItemRef {
    pub fn api_base(&self) -> String {
        format!(
            "https://api.zotero.org/{}/{}",
            self.library_type, self.library_id
        )
    }

    pub fn item_url(&self) -> String {
        format!("{}/items/{}", self.api_base(), self.item_key)
    }
}

static ZOTERO_URI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https?://(?:www\.)?zotero\.org/(users|groups)/(\d+)/items/([A-Z0-9]+)").unwrap()
});

// Matches personal library URIs like https://zotero.org/mfromano/items/WFHVZPHT
static ZOTERO_USER_SLUG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https?://(?:www\.)?zotero\.org/([a-zA-Z][a-zA-Z0-9_-]*)/items/([A-Z0-9]+)")
        .unwrap()
});

/// Parses a Zotero URI into its components.
///
/// Accepts URIs like:
///   https://www.zotero.org/groups/483726/items/A5X7AKTH
///   https://zotero.org/users/12345/items/ABCD1234
///   https://zotero.org/mfromano/items/WFHVZPHT (personal library by username)
pub fn parse_zotero_uri(uri: &str) -> Option<ZoteroItemRef> {
    if let Some(caps) = ZOTERO_URI_RE.captures(uri) {
        return Some(ZoteroItemRef {
            library_type: caps[1].to_string(),
            library_id: caps[2].parse().ok()?,
            item_key: caps[3].to_string(),
        });
    }

    // Fall back to username-slug URIs — use library ID 0, the Zotero API
    // alias for "the owner of the current API key".
    if let Some(caps) = ZOTERO_USER_SLUG_RE.captures(uri) {
        return Some(ZoteroItemRef {
            library_type: "users".to_string(),
            library_id: 0,
            item_key: caps[2].to_string(),
        });
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_group_uri() {
        let ref_ = parse_zotero_uri("https://www.zotero.org/groups/483726/items/A5X7AKTH")
            .expect("should parse");
        assert_eq!(
            ref_,
            ZoteroItemRef {
                library_type: "groups".to_string(),
                library_id: 483726,
                item_key: "A5X7AKTH".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_user_uri() {
        let ref_ = parse_zotero_uri("https://zotero.org/users/12345/items/ABCD1234")
            .expect("should parse");
        assert_eq!(
            ref_,
            ZoteroItemRef {
                library_type: "users".to_string(),
                library_id: 12345,
                item_key: "ABCD1234".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_uri_without_www() {
        let ref_ = parse_zotero_uri("https://zotero.org/groups/999/items/ZZZZ0000")
            .expect("should parse");
        assert_eq!(ref_.library_id, 999);
        assert_eq!(ref_.item_key, "ZZZZ0000");
    }

    #[test]
    fn test_parse_invalid_uri() {
        assert!(parse_zotero_uri("https://google.com").is_none());
        assert!(parse_zotero_uri("not a url").is_none());
        assert!(parse_zotero_uri("").is_none());
    }

    #[test]
    fn test_parse_uri_embedded_in_text() {
        let text = "See https://www.zotero.org/groups/100/items/KEY12345 for details";
        let ref_ = parse_zotero_uri(text).expect("should parse");
        assert_eq!(ref_.item_key, "KEY12345");
    }

    #[test]
    fn test_api_base() {
        let ref_ = ZoteroItemRef {
            library_type: "groups".to_string(),
            library_id: 483726,
            item_key: "A5X7AKTH".to_string(),
        };
        assert_eq!(ref_.api_base(), "https://api.zotero.org/groups/483726");
    }

    #[test]
    fn test_item_url() {
        let ref_ = ZoteroItemRef {
            library_type: "groups".to_string(),
            library_id: 483726,
            item_key: "A5X7AKTH".to_string(),
        };
        assert_eq!(
            ref_.item_url(),
            "https://api.zotero.org/groups/483726/items/A5X7AKTH"
        );
    }
}
