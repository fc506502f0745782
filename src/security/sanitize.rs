//! Payload sanitization.
//!
//! # Responsibilities
//! - Strip `<tag>`-shaped substrings from every string leaf
//! - Escape `< > " ' &` to entities
//! - Trim surrounding whitespace
//! - Reject obviously hostile scalar inputs (`validate_input`)
//!
//! # Design Decisions
//! - Pure function over `serde_json::Value`; shape is preserved
//! - Idempotent: an `&` that already starts one of the five produced
//!   entities is left alone, so a second pass changes nothing
//! - Only the documented vectors are handled; this is not a WAF

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"));

static INJECTION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<script|javascript:|data:|vbscript:").expect("injection pattern is valid")
});

/// Entities produced by [`escape`]. An `&` followed by one of these tails is
/// already escaped.
const ENTITY_TAILS: [&str; 5] = ["amp;", "lt;", "gt;", "quot;", "#x27;"];

/// Sanitize every string leaf of a parsed body.
pub fn sanitize_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_str(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_value).collect()),
        Value::Object(map) => Value::Object(sanitize_map(map)),
        other => other,
    }
}

fn sanitize_map(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .map(|(key, value)| (key, sanitize_value(value)))
        .collect()
}

/// Strip tags, escape, trim.
pub fn sanitize_str(input: &str) -> String {
    let stripped = TAG_PATTERN.replace_all(input, "");
    escape(&stripped).trim().to_string()
}

fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for (i, c) in input.char_indices() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '&' => {
                let rest = &input[i + 1..];
                if ENTITY_TAILS.iter().any(|tail| rest.starts_with(tail)) {
                    out.push('&');
                } else {
                    out.push_str("&amp;");
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Basic scalar check: non-empty, at most `max_len` characters, and free of
/// script-injection markers.
pub fn validate_input(input: &str, max_len: usize) -> bool {
    !input.is_empty() && input.chars().count() <= max_len && !INJECTION_PATTERN.is_match(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strips_tags_and_escapes() {
        assert_eq!(sanitize_str("<b>Bob</b>"), "Bob");
        assert_eq!(sanitize_str("  Tom & \"Jerry\"  "), "Tom &amp; &quot;Jerry&quot;");
        assert_eq!(sanitize_str("it's"), "it&#x27;s");
        assert_eq!(sanitize_str("1 < 2"), "1 &lt; 2");
        assert_eq!(sanitize_str("2 > 1"), "2 &gt; 1");
    }

    #[test]
    fn test_event_handler_markup_removed() {
        let out = sanitize_str("<img src=x onerror=alert(1)>");
        assert!(!out.contains('<'));
        assert!(!out.contains('>'));

        let out = sanitize_str("hi <script>alert('x')</script> there");
        assert!(!out.contains('<') && !out.contains('>'));
        assert!(!out.contains('\''));
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let inputs = [
            json!({"name": "<b>Bob</b>", "note": "fish & chips"}),
            json!({"raw": "&amp; already", "mixed": "a &lt; b & c"}),
            json!({"nested": {"list": ["<i>x</i>", " y ", 3, null, {"deep": "'q'"}]}}),
            json!({"tricky": "<<b>>", "unterminated": "a < b", "amp": "&&&"}),
            json!({"entity_like": "&#x27; &quot; &gt;", "spaces": "   "}),
        ];

        for input in inputs {
            let once = sanitize_value(input.clone());
            let twice = sanitize_value(once.clone());
            assert_eq!(once, twice, "not idempotent for {}", input);
        }
    }

    #[test]
    fn test_already_escaped_entity_not_double_escaped() {
        assert_eq!(sanitize_str("&amp;"), "&amp;");
        assert_eq!(sanitize_str("&lt;tag&gt;"), "&lt;tag&gt;");
        assert_eq!(sanitize_str("AT&T"), "AT&amp;T");
    }

    #[test]
    fn test_structure_preserved() {
        let input = json!({
            "name": " <b>Ann</b> ",
            "age": 3,
            "active": true,
            "weight": 4.5,
            "missing": null,
            "tags": ["<x>a</x>", 7, ["'inner'"]],
            "child": {"note": "\"quoted\""}
        });

        let output = sanitize_value(input);
        assert_eq!(
            output,
            json!({
                "name": "Ann",
                "age": 3,
                "active": true,
                "weight": 4.5,
                "missing": null,
                "tags": ["a", 7, ["&#x27;inner&#x27;"]],
                "child": {"note": "&quot;quoted&quot;"}
            })
        );
    }

    #[test]
    fn test_validate_input() {
        assert!(validate_input("plain-token.value", 500));
        assert!(!validate_input("", 500));
        assert!(!validate_input(&"a".repeat(501), 500));
        assert!(validate_input(&"a".repeat(500), 500));
        assert!(!validate_input("abc<SCRIPT>", 500));
        assert!(!validate_input("JavaScript:alert(1)", 500));
        assert!(!validate_input("data:text/html;base64,xx", 500));
        assert!(!validate_input("vbscript:msgbox", 500));
    }
}
