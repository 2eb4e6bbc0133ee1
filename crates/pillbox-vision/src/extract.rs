//! Reply extraction: coerce the vision model's free-form reply into a
//! fixed three-field record.
//!
//! The upstream's output format is not contractually guaranteed. Observed
//! shapes include a bare JSON object, the same object fenced in a markdown
//! code block, the object buried in surrounding prose, replies keyed in
//! Chinese instead of English, and strings containing raw control
//! characters. Extraction is therefore maximally permissive and **never
//! fails**: any parse problem degrades to an all-null result.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use pillbox_core::DrugAnalysis;

/// English/localized key pairs, checked in preference order.
const NAME_KEYS: (&str, &str) = ("name", "药品名称");
const PRODUCTION_DATE_KEYS: (&str, &str) = ("production_date", "生产日期");
const EXPIRY_DATE_KEYS: (&str, &str) = ("expiry_date", "有效期");

/// Matches the first balanced-brace JSON object, allowing exactly one
/// level of nested braces. Deeper nesting is out of scope: the reply we
/// care about is a flat field map.
fn object_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}").expect("object pattern is valid")
    })
}

/// Extract structured fields from a raw model reply.
///
/// Steps, in order: trim, unwrap a markdown fence, parse directly when the
/// text starts with `{`, otherwise scan for the first embedded object.
/// Each field prefers the English key and falls back to the localized one
/// when the English key is absent, null, non-string, or empty.
pub fn extract(raw_reply: &str) -> DrugAnalysis {
    let cleaned = strip_markdown_fence(raw_reply.trim());

    let object = if cleaned.starts_with('{') {
        parse_lenient(&cleaned)
    } else {
        object_pattern()
            .find(&cleaned)
            .and_then(|m| parse_lenient(m.as_str()))
    };

    match object {
        Some(fields) => DrugAnalysis {
            name: field_with_fallback(&fields, NAME_KEYS),
            production_date: field_with_fallback(&fields, PRODUCTION_DATE_KEYS),
            expiry_date: field_with_fallback(&fields, EXPIRY_DATE_KEYS),
        },
        None => DrugAnalysis::default(),
    }
}

/// Unwrap a triple-backtick code fence: drop the first and last line, then
/// strip any residual ```` ```json ````/backtick markers.
fn strip_markdown_fence(text: &str) -> String {
    if !text.starts_with("```") {
        return text.to_string();
    }

    let lines: Vec<&str> = text.split('\n').collect();
    let inner = if lines.len() > 2 {
        lines[1..lines.len() - 1].join("\n")
    } else {
        text.to_string()
    };

    inner.replace("```json", "").replace("```", "").trim().to_string()
}

/// Parse a candidate object, tolerating raw control characters embedded in
/// string literals (strict JSON forbids them; vision models emit them).
fn parse_lenient(candidate: &str) -> Option<Value> {
    let sanitized = escape_control_chars(candidate);
    match serde_json::from_str::<Value>(&sanitized) {
        Ok(Value::Object(map)) => Some(Value::Object(map)),
        _ => None,
    }
}

/// Escape unescaped control characters inside JSON string literals.
///
/// Walks the text tracking string/escape state; control characters outside
/// strings are structural whitespace and pass through untouched.
fn escape_control_chars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;

    for c in input.chars() {
        if !in_string {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
            continue;
        }

        if escaped {
            out.push(c);
            escaped = false;
            continue;
        }

        match c {
            '\\' => {
                out.push(c);
                escaped = true;
            }
            '"' => {
                out.push(c);
                in_string = false;
            }
            c if (c as u32) < 0x20 => match c {
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                _ => out.push_str(&format!("\\u{:04x}", c as u32)),
            },
            _ => out.push(c),
        }
    }

    out
}

/// Read a field preferring the English key, falling back to the localized
/// key. Null, non-string, and empty values count as absent.
fn field_with_fallback(fields: &Value, (english, localized): (&str, &str)) -> Option<String> {
    non_empty_string(fields.get(english)).or_else(|| non_empty_string(fields.get(localized)))
}

fn non_empty_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
}
