//! Output sanitization.
//!
//! Every value that leaves the pipeline goes through here. Strings are
//! HTML-escaped; keys following the URL naming convention are checked against
//! a scheme allow-list and a dangerous-scheme deny-list.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// Default recursion limit for [`sanitize_record`].
pub const DEFAULT_MAX_DEPTH: usize = 10;

const SAFE_PREFIXES: [&str; 6] = ["http://", "https://", "mailto:", "tel:", "/", "./"];

static DANGEROUS_SCHEME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(javascript|data|vbscript|file):").expect("valid scheme regex")
});

static BARE_DOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[a-z0-9](?:[a-z0-9-]*[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9-]*[a-z0-9])?)*\.[a-z]{2,}(?::\d{1,5})?(?:[/?#].*)?$")
        .expect("valid domain regex")
});

/// HTML-escape a string.
#[must_use]
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Escape any JSON value into a display-safe string. Null becomes `""`.
#[must_use]
pub fn escape_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => escape_html(s),
        other => escape_html(&other.to_string()),
    }
}

/// Whether a key follows the URL naming convention (`url` or `*_url`).
#[must_use]
pub fn is_url_key(key: &str) -> bool {
    key == "url" || key.ends_with("_url")
}

/// Validate a URL for output.
///
/// Returns `None` for dangerous schemes. Allowed schemes and relative paths are
/// returned unchanged unless they carry HTML metacharacters, bare domains get
/// an `http://` prefix, and anything else is escaped and returned.
#[must_use]
pub fn sanitize_url(url: Option<&str>) -> Option<String> {
    let url = url?.trim();
    if url.is_empty() {
        return None;
    }

    // Browsers drop whitespace and control characters inside a scheme
    let compact: String = url
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect();
    if DANGEROUS_SCHEME.is_match(&compact) {
        tracing::debug!(url = %url, "Rejected URL with dangerous scheme");
        return None;
    }

    let lower = url.to_ascii_lowercase();
    let is_protocol_relative = url.starts_with("//");
    if !is_protocol_relative && SAFE_PREFIXES.iter().any(|prefix| lower.starts_with(prefix)) {
        if url.contains(['<', '>', '"', '\'']) {
            return Some(escape_html(url));
        }
        return Some(url.to_string());
    }

    if BARE_DOMAIN.is_match(url) {
        return Some(format!("http://{}", escape_html(url)));
    }

    Some(escape_html(url))
}

/// Sanitize every value of a record.
///
/// Strings are escaped, URL keys go through [`sanitize_url`] (a rejected URL
/// becomes `""` so the key stays present), and nested objects and arrays are
/// visited up to `max_depth` levels. Containers below the limit are replaced
/// with null.
#[must_use]
pub fn sanitize_record(record: &Map<String, Value>, max_depth: usize) -> Map<String, Value> {
    sanitize_object(record, max_depth, 0)
}

fn sanitize_object(record: &Map<String, Value>, max_depth: usize, depth: usize) -> Map<String, Value> {
    record
        .iter()
        .map(|(key, value)| {
            let clean = if is_url_key(key) && matches!(value, Value::String(_) | Value::Null) {
                Value::String(sanitize_url(value.as_str()).unwrap_or_default())
            } else {
                sanitize_value(value, max_depth, depth + 1)
            };
            (key.clone(), clean)
        })
        .collect()
}

fn sanitize_value(value: &Value, max_depth: usize, depth: usize) -> Value {
    match value {
        Value::String(s) => Value::String(escape_html(s)),
        Value::Object(map) if depth < max_depth => {
            Value::Object(sanitize_object(map, max_depth, depth))
        }
        Value::Array(items) if depth < max_depth => Value::Array(
            items
                .iter()
                .map(|item| sanitize_value(item, max_depth, depth + 1))
                .collect(),
        ),
        Value::Object(_) | Value::Array(_) => {
            tracing::debug!(depth, "Dropping value nested beyond sanitization depth");
            Value::Null
        }
        scalar => scalar.clone(),
    }
}
