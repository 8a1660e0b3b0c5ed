use sha2::{Digest, Sha256};

/// Converts a Notion rich text array to an HTML string, escaping plain text
/// and nesting annotation tags code → bold → italic → underline →
/// strikethrough → link, matching Notion's own annotation ordering.
pub fn rich_text_to_html(rich_text: &[serde_json::Value]) -> String {
    let mut out = String::new();

    for rt in rich_text {
        let plain_text = rt.get("plain_text").and_then(|v| v.as_str()).unwrap_or("");
        let mut text = html_escape(plain_text);
        let annotations = rt.get("annotations");
        let href = rt.get("href").and_then(|v| v.as_str());

        if annotation_flag(annotations, "code") {
            text = format!("<code>{text}</code>");
        }
        if annotation_flag(annotations, "bold") {
            text = format!("<strong>{text}</strong>");
        }
        if annotation_flag(annotations, "italic") {
            text = format!("<em>{text}</em>");
        }
        if annotation_flag(annotations, "underline") {
            text = format!("<u>{text}</u>");
        }
        if annotation_flag(annotations, "strikethrough") {
            text = format!("<s>{text}</s>");
        }
        if let Some(href) = href {
            text = format!("<a href=\"{}\">{text}</a>", html_escape(href));
        }

        out.push_str(&text);
    }

    out
}

fn annotation_flag(annotations: Option<&serde_json::Value>, key: &str) -> bool {
    annotations
        .and_then(|a| a.get(key))
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn block_type(block: &serde_json::Value) -> &str {
    block.get("type").and_then(|v| v.as_str()).unwrap_or("")
}

fn block_rich_text(block: &serde_json::Value, bt: &str) -> Vec<serde_json::Value> {
    block
        .get(bt)
        .and_then(|d| d.get("rich_text"))
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
}

fn block_to_html(block: &serde_json::Value) -> String {
    let bt = block_type(block);
    let rich_text = block_rich_text(block, bt);
    let content = rich_text_to_html(&rich_text);

    match bt {
        "paragraph" => {
            if content.is_empty() {
                "<p></p>".to_string()
            } else {
                format!("<p>{content}</p>")
            }
        }
        "heading_1" => format!("<h1>{content}</h1>"),
        "heading_2" => format!("<h2>{content}</h2>"),
        "heading_3" => format!("<h3>{content}</h3>"),
        "bulleted_list_item" | "numbered_list_item" => format!("<li>{content}</li>"),
        "to_do" => {
            let checked = block
                .get("to_do")
                .and_then(|d| d.get("checked"))
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            let checkbox = if checked { "checked " } else { "" };
            format!("<li><input type=\"checkbox\" {checkbox}disabled />{content}</li>")
        }
        "quote" => format!("<blockquote>{content}</blockquote>"),
        "code" => format!("<pre><code>{content}</code></pre>"),
        "divider" => "<hr />".to_string(),
        "callout" => format!("<p>{content}</p>"),
        _ => {
            if content.is_empty() {
                String::new()
            } else {
                format!("<p>{content}</p>")
            }
        }
    }
}

#[derive(PartialEq)]
enum ListKind {
    None,
    Ul,
    Ol,
}

/// Converts a list of Notion blocks into a single Zotero-compatible HTML
/// document string. Consecutive `bulleted_list_item`/`to_do` blocks are
/// grouped into a `<ul>`, consecutive `numbered_list_item` blocks into an
/// `<ol>`.
pub fn blocks_to_html(blocks: &[serde_json::Value]) -> String {
    let mut html_parts: Vec<String> = Vec::new();
    let mut list_buffer: Vec<String> = Vec::new();
    let mut list_kind = ListKind::None;

    fn flush(html_parts: &mut Vec<String>, list_buffer: &mut Vec<String>, list_kind: &mut ListKind) {
        if !list_buffer.is_empty() {
            let tag = match list_kind {
                ListKind::Ul => "ul",
                ListKind::Ol => "ol",
                ListKind::None => return,
            };
            html_parts.push(format!("<{tag}>{}</{tag}>", list_buffer.join("")));
            list_buffer.clear();
            *list_kind = ListKind::None;
        }
    }

    for block in blocks {
        let bt = block_type(block);

        match bt {
            "bulleted_list_item" | "to_do" => {
                if list_kind != ListKind::Ul {
                    flush(&mut html_parts, &mut list_buffer, &mut list_kind);
                    list_kind = ListKind::Ul;
                }
                list_buffer.push(block_to_html(block));
            }
            "numbered_list_item" => {
                if list_kind != ListKind::Ol {
                    flush(&mut html_parts, &mut list_buffer, &mut list_kind);
                    list_kind = ListKind::Ol;
                }
                list_buffer.push(block_to_html(block));
            }
            _ => {
                flush(&mut html_parts, &mut list_buffer, &mut list_kind);
                let html = block_to_html(block);
                if !html.is_empty() {
                    html_parts.push(html);
                }
            }
        }
    }

    flush(&mut html_parts, &mut list_buffer, &mut list_kind);
    html_parts.join("\n")
}

/// Computes a SHA-256 hash over the content-relevant parts of a block list
/// (type, rich text, checked state), for change detection. Non-content
/// fields like block `id` are intentionally excluded.
pub fn compute_blocks_hash(blocks: &[serde_json::Value]) -> String {
    let content_parts: Vec<serde_json::Value> = blocks
        .iter()
        .map(|block| {
            let bt = block_type(block);
            let rich_text = block_rich_text(block, bt);
            let checked = block.get(bt).and_then(|d| d.get("checked")).cloned();
            serde_json::json!({
                "type": bt,
                "rich_text": rich_text,
                "checked": checked,
            })
        })
        .collect();

    // Sort object keys explicitly so the hash matches regardless of field
    // order, mirroring `json.dumps(..., sort_keys=True)`.
    let serialized = format!(
        "[{}]",
        content_parts.iter().map(canonical_json).collect::<Vec<_>>().join(",")
    );

    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    hex::encode(hasher.finalize())
}

fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let entries: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", serde_json::to_string(k).unwrap(), canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", entries.join(","))
        }
        serde_json::Value::Array(items) => {
            format!("[{}]", items.iter().map(canonical_json).collect::<Vec<_>>().join(","))
        }
        other => serde_json::to_string(other).unwrap(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rt(text: &str) -> serde_json::Value {
        json!({"plain_text": text, "annotations": {}, "href": null})
    }

    fn rt_with(text: &str, annotations: serde_json::Value, href: Option<&str>) -> serde_json::Value {
        json!({"plain_text": text, "annotations": annotations, "href": href})
    }

    fn block(block_type: &str, rich_text: Option<Vec<serde_json::Value>>, extra: serde_json::Value) -> serde_json::Value {
        let mut data = serde_json::Map::new();
        if let Some(rich_text) = rich_text {
            data.insert("rich_text".to_string(), json!(rich_text));
        }
        if let serde_json::Value::Object(extra_map) = extra {
            for (k, v) in extra_map {
                data.insert(k, v);
            }
        }
        json!({"type": block_type, block_type: data})
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(rich_text_to_html(&[rt("hello")]), "hello");
    }

    #[test]
    fn test_bold() {
        assert_eq!(
            rich_text_to_html(&[rt_with("bold", json!({"bold": true}), None)]),
            "<strong>bold</strong>"
        );
    }

    #[test]
    fn test_link() {
        let value = rt_with("click", json!({}), Some("https://example.com"));
        assert_eq!(
            rich_text_to_html(&[value]),
            "<a href=\"https://example.com\">click</a>"
        );
    }

    #[test]
    fn test_multiple_segments() {
        let result = rich_text_to_html(&[rt("hello "), rt_with("world", json!({"bold": true}), None)]);
        assert_eq!(result, "hello <strong>world</strong>");
    }

    #[test]
    fn test_html_escaping() {
        assert_eq!(rich_text_to_html(&[rt("<script>")]), "&lt;script&gt;");
    }

    #[test]
    fn test_paragraph() {
        let blocks = vec![block("paragraph", Some(vec![rt("Hello world")]), json!({}))];
        assert_eq!(blocks_to_html(&blocks), "<p>Hello world</p>");
    }

    #[test]
    fn test_bulleted_list() {
        let blocks = vec![
            block("bulleted_list_item", Some(vec![rt("item 1")]), json!({})),
            block("bulleted_list_item", Some(vec![rt("item 2")]), json!({})),
        ];
        assert_eq!(
            blocks_to_html(&blocks),
            "<ul><li>item 1</li><li>item 2</li></ul>"
        );
    }

    #[test]
    fn test_code_block() {
        let blocks = vec![block("code", Some(vec![rt("print('hi')")]), json!({}))];
        assert_eq!(
            blocks_to_html(&blocks),
            "<pre><code>print(&#x27;hi&#x27;)</code></pre>"
        );
    }

    #[test]
    fn test_divider() {
        let blocks = vec![block("divider", None, json!({}))];
        assert_eq!(blocks_to_html(&blocks), "<hr />");
    }

    #[test]
    fn test_list_type_transition() {
        let blocks = vec![
            block("bulleted_list_item", Some(vec![rt("bullet")]), json!({})),
            block("numbered_list_item", Some(vec![rt("number")]), json!({})),
        ];
        let result = blocks_to_html(&blocks);
        assert!(result.contains("<ul><li>bullet</li></ul>"));
        assert!(result.contains("<ol><li>number</li></ol>"));
    }

    #[test]
    fn test_same_content_same_hash() {
        let blocks = vec![block("paragraph", Some(vec![rt("hello")]), json!({}))];
        assert_eq!(compute_blocks_hash(&blocks), compute_blocks_hash(&blocks));
    }

    #[test]
    fn test_different_content_different_hash() {
        let b1 = vec![block("paragraph", Some(vec![rt("hello")]), json!({}))];
        let b2 = vec![block("paragraph", Some(vec![rt("world")]), json!({}))];
        assert_ne!(compute_blocks_hash(&b1), compute_blocks_hash(&b2));
    }

    #[test]
    fn test_ignores_non_content_fields() {
        let mut b1 = block("paragraph", Some(vec![rt("hello")]), json!({}));
        b1["id"] = json!("aaa");
        let mut b2 = block("paragraph", Some(vec![rt("hello")]), json!({}));
        b2["id"] = json!("bbb");
        assert_eq!(compute_blocks_hash(&[b1]), compute_blocks_hash(&[b2]));
    }
}
