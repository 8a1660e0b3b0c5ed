use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::dto::Property;

/// A parsed Notion property value, normalized to the handful of shapes the
/// sync engine cares about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Text(String),
    List(Vec<String>),
    Number(f64),
    Bool(bool),
}

impl PropertyValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            PropertyValue::List(v) => Some(v.as_slice()),
            _ => None,
        }
    }
}

/// Parses a single Notion property into a normalized value.
///
/// Returns `None` for empty values and for unsupported property types.
pub fn parse_property_value(prop: &Property) -> Option<PropertyValue> {
    match prop {
        Property::Title { title } => {
            let text = join_plain_text(title);
            (!text.is_empty()).then_some(PropertyValue::Text(text))
        }
        Property::RichText { rich_text } => {
            let text = join_plain_text(rich_text);
            (!text.is_empty()).then_some(PropertyValue::Text(text))
        }
        Property::Url { url } => url.clone().map(PropertyValue::Text),
        Property::Select { select } => select.as_ref().map(|s| PropertyValue::Text(s.name.clone())),
        Property::Status { status } => status.as_ref().map(|s| PropertyValue::Text(s.name.clone())),
        Property::MultiSelect { multi_select } => Some(PropertyValue::List(
            multi_select.iter().map(|s| s.name.clone()).collect(),
        )),
        Property::Number { number } => number.map(PropertyValue::Number),
        Property::Checkbox { checkbox } => Some(PropertyValue::Bool(*checkbox)),
        Property::Date { date } => date.as_ref().map(|d| PropertyValue::Text(d.start.clone())),
        Property::Relation { .. } | Property::LastEditedTime { .. } | Property::Unknown => {
            tracing::debug!("unsupported or unparsed Notion property type");
            None
        }
    }
}

fn join_plain_text(parts: &[super::dto::RichText]) -> String {
    parts.iter().map(|t| t.plain_text.as_str()).collect()
}

/// Extracts the properties the sync engine cares about from a page's raw
/// property map, keyed by property name (with "Zotero URI" normalized to
/// the reserved key `zotero_uri`).
pub fn extract_syncable_properties(
    properties: &HashMap<String, Property>,
) -> HashMap<String, PropertyValue> {
    let mut result = HashMap::new();

    for (name, prop) in properties {
        let value = parse_property_value(prop);

        if name == "Zotero URI" {
            if let Some(v) = value {
                result.insert("zotero_uri".to_string(), v);
            }
            continue;
        }

        if let Some(v) = value {
            result.insert(name.trim().to_string(), v);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notion::dto::{DateValue, RichText, SelectOption};

    fn rt(text: &str) -> RichText {
        RichText {
            plain_text: text.to_string(),
        }
    }

    #[test]
    fn parses_title() {
        let prop = Property::Title {
            title: vec![rt("Hello "), rt("World")],
        };
        assert_eq!(
            parse_property_value(&prop),
            Some(PropertyValue::Text("Hello World".to_string()))
        );
    }

    #[test]
    fn empty_title_is_none() {
        let prop = Property::Title { title: vec![] };
        assert_eq!(parse_property_value(&prop), None);
    }

    #[test]
    fn parses_multi_select() {
        let prop = Property::MultiSelect {
            multi_select: vec![
                SelectOption {
                    name: "a".to_string(),
                },
                SelectOption {
                    name: "b".to_string(),
                },
            ],
        };
        assert_eq!(
            parse_property_value(&prop),
            Some(PropertyValue::List(vec!["a".to_string(), "b".to_string()]))
        );
    }

    #[test]
    fn parses_date_start_only() {
        let prop = Property::Date {
            date: Some(DateValue {
                start: "2024-01-01".to_string(),
                end: None,
            }),
        };
        assert_eq!(
            parse_property_value(&prop),
            Some(PropertyValue::Text("2024-01-01".to_string()))
        );
    }

    #[test]
    fn relation_is_unsupported() {
        let prop = Property::Relation { relation: vec![] };
        assert_eq!(parse_property_value(&prop), None);
    }

    #[test]
    fn zotero_uri_field_is_normalized() {
        let mut properties = HashMap::new();
        properties.insert(
            "Zotero URI".to_string(),
            Property::Url {
                url: Some("https://zotero.org/groups/1/items/ABC".to_string()),
            },
        );
        properties.insert(
            "Tags".to_string(),
            Property::MultiSelect {
                multi_select: vec![SelectOption {
                    name: "x".to_string(),
                }],
            },
        );

        let extracted = extract_syncable_properties(&properties);
        assert!(extracted.contains_key("zotero_uri"));
        assert!(extracted.contains_key("Tags"));
        assert!(!extracted.contains_key("Zotero URI"));
    }
}
