//! Tool argument sanitizing and typed extraction
//!
//! Raw arguments arrive as JSON. [`sanitize_args`] bounds them before any
//! validation runs; the extractors turn them into typed values or a
//! `Validation` error naming the offending field.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Longest string kept after sanitizing, in characters
pub const MAX_STRING_CHARS: usize = 5000;
/// Longest array kept after sanitizing
pub const MAX_ARRAY_LEN: usize = 20;

static CONFIG_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("config id pattern"));

/// Trim and cap every string, cap every array, recursing into both
pub fn sanitize_args(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.trim().chars().take(MAX_STRING_CHARS).collect()),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .take(MAX_ARRAY_LEN)
                .map(sanitize_args)
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, sanitize_args(v)))
                .collect::<Map<String, Value>>(),
        ),
        other => other,
    }
}

// ─────────────────────────────────────────────────────────────────
// Extractors
// ─────────────────────────────────────────────────────────────────

/// Optional string field; present-but-not-a-string is an error
pub fn opt_str<'a>(args: &'a Value, field: &str) -> Result<Option<&'a str>> {
    match args.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(Error::validation(field, "must be a string")),
    }
}

/// Required string field with a character-length range
pub fn bounded_str<'a>(args: &'a Value, field: &str, min: usize, max: usize) -> Result<&'a str> {
    let value = opt_str(args, field)?.unwrap_or_default();
    let len = value.chars().count();
    if len < min {
        return Err(Error::validation(
            field,
            format!("must be at least {} characters", min),
        ));
    }
    if len > max {
        return Err(Error::validation(
            field,
            format!("must be at most {} characters", max),
        ));
    }
    Ok(value)
}

/// Optional list of strings with a maximum length
pub fn opt_str_list(args: &Value, field: &str, max: usize) -> Result<Vec<String>> {
    let items = match args.get(field) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(Error::validation(field, "must be a list of strings")),
    };
    if items.len() > max {
        return Err(Error::validation(field, format!("at most {} entries allowed", max)));
    }
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| Error::validation(field, "must be a list of strings"))
        })
        .collect()
}

/// Config ids: non-empty, letters, digits, `_` and `-` only
pub fn config_id<'a>(args: &'a Value, field: &str) -> Result<&'a str> {
    let id = bounded_str(args, field, 1, MAX_STRING_CHARS)?;
    if !CONFIG_ID.is_match(id) {
        return Err(Error::validation(
            field,
            "may only contain letters, digits, '_' and '-'",
        ));
    }
    Ok(id)
}
