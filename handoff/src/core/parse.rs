//! Tolerant extraction of JSON payloads from engine output.
//!
//! The engine answers in natural language and wraps its payload
//! inconsistently, so several independent strategies are tried in order and
//! the first one that yields a `T` wins.

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;

/// A single extraction strategy. Pure; returns `None` when it does not apply.
pub type Strategy<T> = fn(&str) -> Option<T>;

static FENCED_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```([A-Za-z0-9_+-]*)[ \t]*\r?\n?(.*?)```").expect("fenced block regex")
});

/// Extract a `T` from `text`, or `None` if no strategy succeeds. Never fails.
///
/// Strategies: whole document, fenced `json` block, first `{`..last `}` span,
/// first `[`..last `]` span.
pub fn parse_structured<T: DeserializeOwned>(text: &str) -> Option<T> {
    first_success(
        text,
        &[
            whole_document::<T>,
            fenced_block::<T>,
            object_span::<T>,
            array_span::<T>,
        ],
    )
}

/// Run `strategies` in order, stopping at the first success.
pub fn first_success<T>(text: &str, strategies: &[Strategy<T>]) -> Option<T> {
    strategies.iter().find_map(|strategy| strategy(text))
}

pub fn whole_document<T: DeserializeOwned>(text: &str) -> Option<T> {
    serde_json::from_str(text.trim()).ok()
}

/// Interior of the first fenced block tagged `json` (or untagged) that parses.
pub fn fenced_block<T: DeserializeOwned>(text: &str) -> Option<T> {
    FENCED_BLOCK_RE.captures_iter(text).find_map(|caps| {
        let tag = caps.get(1).map_or("", |m| m.as_str());
        if !tag.is_empty() && !tag.eq_ignore_ascii_case("json") {
            return None;
        }
        let body = caps.get(2)?.as_str().trim();
        serde_json::from_str(body).ok()
    })
}

pub fn object_span<T: DeserializeOwned>(text: &str) -> Option<T> {
    delimited_span(text, '{', '}')
}

pub fn array_span<T: DeserializeOwned>(text: &str) -> Option<T> {
    delimited_span(text, '[', ']')
}

fn delimited_span<T: DeserializeOwned>(text: &str, open: char, close: char) -> Option<T> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value, json};

    #[test]
    fn parses_plain_document() {
        let value: Value = parse_structured("{\"a\":1}").expect("parse");
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn parses_fenced_json_block() {
        let text = r#"Here are my findings:

```json
{
  "findings": [{"title": "Finding 1"}],
  "summary": "Summary text"
}
```

Hope this helps!"#;
        let value: Value = parse_structured(text).expect("parse");
        assert_eq!(value["summary"], json!("Summary text"));
        assert_eq!(value["findings"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn skips_fenced_blocks_in_other_languages() {
        let text = "```rust\nfn main() {}\n```\nthen\n```json\n{\"ok\": true}\n```";
        let value: Option<Value> = fenced_block(text);
        assert_eq!(value, Some(json!({"ok": true})));
    }

    #[test]
    fn falls_back_to_brace_span() {
        let text = "Result follows: {\"query\": \"test\", \"results\": [1, 2, 3]} -- end";
        let value: Value = parse_structured(text).expect("parse");
        assert_eq!(value["results"], json!([1, 2, 3]));
    }

    #[test]
    fn falls_back_to_bracket_span() {
        let text = "Items: [1, 2, 3] done";
        let value: Value = parse_structured(text).expect("parse");
        assert_eq!(value, json!([1, 2, 3]));
    }

    #[test]
    fn returns_none_for_prose() {
        let value: Option<Value> = parse_structured("I could not complete the request.");
        assert!(value.is_none());
        let unbalanced: Option<Value> = parse_structured("} backwards {");
        assert!(unbalanced.is_none());
    }

    #[test]
    fn typed_target_skips_mismatched_strategies() {
        let text = "[1] and later {\"k\": \"v\"}";
        let map: Map<String, Value> = parse_structured(text).expect("object");
        assert_eq!(map.get("k"), Some(&json!("v")));
    }

    #[test]
    fn reparsing_serialized_value_is_stable() {
        let inputs = [
            "```json\n{\"a\": {\"b\": [1, 2]}}\n```",
            "noise {\"x\": null, \"y\": 1.5} noise",
            "[\"p\", \"q\"]",
        ];
        for input in inputs {
            let first: Value = parse_structured(input).expect("first parse");
            let serialized = serde_json::to_string(&first).expect("serialize");
            let second: Value = parse_structured(&serialized).expect("second parse");
            assert_eq!(first, second);
        }
    }

    #[test]
    fn combinator_stops_at_first_success() {
        fn always(_: &str) -> Option<u8> {
            Some(1)
        }
        fn never(_: &str) -> Option<u8> {
            None
        }
        fn later(_: &str) -> Option<u8> {
            Some(2)
        }
        assert_eq!(first_success("", &[never, always, later]), Some(1));
        assert_eq!(first_success::<u8>("", &[never]), None);
    }
}
