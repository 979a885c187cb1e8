//! Dot-delimited state paths (`user.address.city`, `todos.0.title`).

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Prefix that explicitly addresses the state store in expressions
pub const STATE_PREFIX: &str = "state";

/// Splits a path into segments, ignoring empty ones.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}

/// Looks `path` up inside `root`. The empty path addresses nothing.
pub fn get<'a>(root: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let segs = segments(path);
    let (first, rest) = segs.split_first()?;
    get_in(root.get(*first)?, rest)
}

/// Walks `segments` down from `value`. Numeric segments index lists.
pub fn get_in<'a>(value: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    segments.iter().try_fold(value, |current, seg| match current {
        Value::Object(map) => map.get(*seg),
        Value::Array(items) => seg.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Turns a binding expression into a canonical store path.
///
/// Accepts `state.a.b`, `a.b`, `{state.a.b}` and `a[0].b`; returns `None` for
/// anything that is not a plain path.
pub fn normalize(expression: &str) -> Option<String> {
    static PATH_REGEX: OnceLock<Regex> = OnceLock::new();
    static INDEX_REGEX: OnceLock<Regex> = OnceLock::new();
    let path_re = PATH_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_\-]*(\.[A-Za-z0-9_\-]+)*$").expect("valid path regex")
    });
    let index_re =
        INDEX_REGEX.get_or_init(|| Regex::new(r"\[(\d+)\]").expect("valid index regex"));

    let mut expr = expression.trim();
    if let Some(inner) = expr.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        expr = inner.trim();
    }
    let dotted = index_re.replace_all(expr, ".$1");
    if !path_re.is_match(&dotted) {
        return None;
    }
    let stripped = match dotted.strip_prefix(STATE_PREFIX) {
        Some("") => return None,
        Some(rest) if rest.starts_with('.') => &rest[1..],
        _ => &dotted[..],
    };
    Some(stripped.to_string())
}
