//! Query validation and sanitizing

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{Error, Result};

fn html_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<[^>]*>").expect("static pattern"))
}

/// Trim, bound, and sanitize a free-text query
///
/// Length is checked in characters before sanitizing. A query that is empty
/// after HTML tags and NUL bytes are stripped is rejected as empty.
pub fn validate_query(raw: &str, max_chars: usize) -> Result<String> {
    let query = raw.trim();

    if query.is_empty() {
        return Err(Error::InvalidQuery("query cannot be empty".to_string()));
    }
    if query.chars().count() > max_chars {
        return Err(Error::InvalidQuery(format!(
            "query too long (max {} characters)",
            max_chars
        )));
    }

    let sanitized = html_tag_pattern().replace_all(query, "").replace('\0', "");
    let sanitized = sanitized.trim();

    if sanitized.is_empty() {
        return Err(Error::InvalidQuery("query cannot be empty".to_string()));
    }

    Ok(sanitized.to_string())
}

/// Clamp a requested result count into `1..=max`, falling back to `default`
pub fn clamp_top_k(requested: Option<usize>, default: usize, max: usize) -> usize {
    match requested {
        Some(0) | None => default.min(max),
        Some(k) => k.min(max),
    }
}
