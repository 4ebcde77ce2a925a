use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Marker carried by a footnote node whose `sources` array holds citations.
const FOOTNOTE_TYPE: &str = "sources_footnote";

/// A single source reference extracted from a conversation stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub attribution: String,
}

impl Citation {
    /// Build a citation from one array entry. `None` unless `url` is a non-empty string.
    fn from_entry(entry: &Value) -> Option<Self> {
        let url = entry.get("url")?.as_str()?;
        if url.is_empty() {
            return None;
        }
        let text = |key: &str| {
            entry
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string()
        };
        Some(Self {
            url: url.to_string(),
            title: text("title"),
            attribution: text("attribution"),
        })
    }
}

/// Walk an arbitrary JSON value and append every citation-like record to `out`.
///
/// Two shapes are recognised, at any depth:
/// - `{"type": "sources_footnote", "sources": [{url, title?, attribution?}, ...]}`
/// - `{"items": [{url, title?, attribution?}, ...]}`
///
/// Both checks run on every object, and every value of every object is
/// visited afterwards, so a record can be reported more than once. Callers
/// dedup with [`dedup_by_url`].
pub fn mine(value: &Value, out: &mut Vec<Citation>) {
    match value {
        Value::Array(items) => {
            for item in items {
                mine(item, out);
            }
        }
        Value::Object(map) => mine_object(map, out),
        _ => {}
    }
}

fn mine_object(map: &Map<String, Value>, out: &mut Vec<Citation>) {
    if map.get("type").and_then(|t| t.as_str()) == Some(FOOTNOTE_TYPE) {
        if let Some(Value::Array(sources)) = map.get("sources") {
            out.extend(sources.iter().filter_map(Citation::from_entry));
        }
    }

    if let Some(Value::Array(items)) = map.get("items") {
        out.extend(items.iter().filter_map(Citation::from_entry));
    }

    for child in map.values() {
        mine(child, out);
    }
}

/// Keep the first citation for each URL, preserving encounter order.
pub fn dedup_by_url(citations: Vec<Citation>) -> Vec<Citation> {
    let mut seen = HashSet::new();
    citations
        .into_iter()
        .filter(|c| seen.insert(c.url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn urls(citations: &[Citation]) -> Vec<&str> {
        citations.iter().map(|c| c.url.as_str()).collect()
    }

    #[test]
    fn test_footnote_sources() {
        let doc = json!({
            "message": {
                "content": {
                    "type": "sources_footnote",
                    "sources": [
                        {"url": "https://a.example", "title": "A", "attribution": "a.example"},
                        {"url": "https://b.example"}
                    ]
                }
            }
        });
        let mut out = Vec::new();
        mine(&doc, &mut out);
        assert_eq!(urls(&out), vec!["https://a.example", "https://b.example"]);
        assert_eq!(out[0].title, "A");
        assert_eq!(out[0].attribution, "a.example");
        assert_eq!(out[1].title, "");
        assert_eq!(out[1].attribution, "");
    }

    #[test]
    fn test_duplicates_across_document_first_wins() {
        let doc = json!({
            "refs": [{"items": [{"url": "https://a.example", "title": "first"}]}],
            "footnote": {
                "type": "sources_footnote",
                "sources": [
                    {"url": "https://b.example"},
                    {"url": "https://c.example"},
                    {"url": "https://a.example", "title": "second"}
                ]
            }
        });
        let mut out = Vec::new();
        mine(&doc, &mut out);
        let deduped = dedup_by_url(out);
        assert_eq!(urls(&deduped).len(), 3);
        assert_eq!(deduped[0].title, "first");

        let doc = json!({
            "type": "sources_footnote",
            "sources": [
                {"url": "https://x.example"},
                {"url": "https://y.example"},
                {"url": "https://x.example"}
            ]
        });
        let mut out = Vec::new();
        mine(&doc, &mut out);
        let deduped = dedup_by_url(out);
        assert_eq!(urls(&deduped), vec!["https://x.example", "https://y.example"]);
    }

    #[test]
    fn test_items_at_depth() {
        let doc = json!([
            1,
            "text",
            {"a": {"b": [{"c": {"items": [{"url": "https://deep.example", "title": "Deep"}]}}]}}
        ]);
        let mut out = Vec::new();
        mine(&doc, &mut out);
        assert_eq!(urls(&out), vec!["https://deep.example"]);
    }

    #[test]
    fn test_malformed_entries_skipped() {
        let doc = json!({
            "type": "sources_footnote",
            "sources": [
                {"url": 42},
                {"title": "no url"},
                {"url": ""},
                "just a string",
                {"url": "https://ok.example", "title": 7}
            ]
        });
        let mut out = Vec::new();
        mine(&doc, &mut out);
        assert_eq!(urls(&out), vec!["https://ok.example"]);
        assert_eq!(out[0].title, "");
    }

    #[test]
    fn test_marker_without_sources_array() {
        let doc = json!({"type": "sources_footnote", "sources": "nope"});
        let mut out = Vec::new();
        mine(&doc, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_footnote_and_items_on_same_node() {
        let doc = json!({
            "type": "sources_footnote",
            "sources": [{"url": "https://s.example"}],
            "items": [{"url": "https://i.example"}]
        });
        let mut out = Vec::new();
        mine(&doc, &mut out);
        let deduped = dedup_by_url(out);
        assert_eq!(urls(&deduped), vec!["https://s.example", "https://i.example"]);
    }

    #[test]
    fn test_scalars_yield_nothing() {
        let mut out = Vec::new();
        for v in [json!(null), json!(true), json!(3.5), json!("https://x")] {
            mine(&v, &mut out);
        }
        assert!(out.is_empty());
    }

    #[test]
    fn test_dedup_first_wins() {
        let c = |url: &str, title: &str| Citation {
            url: url.to_string(),
            title: title.to_string(),
            attribution: String::new(),
        };
        let deduped = dedup_by_url(vec![c("a", "1"), c("b", "2"), c("a", "3")]);
        assert_eq!(deduped, vec![c("a", "1"), c("b", "2")]);
    }

    #[test]
    fn test_citation_defaults_on_deserialize() {
        let c: Citation = serde_json::from_str(r#"{"url":"https://a"}"#).unwrap();
        assert_eq!(c.title, "");
        assert_eq!(c.attribution, "");
    }
}
