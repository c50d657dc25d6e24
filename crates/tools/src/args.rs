//! Argument extraction shared by the domain tools.
//!
//! The registry has already checked arguments against each tool's schema,
//! so these helpers mostly pick values out. They still fail with
//! `ApiError::Validation` instead of panicking when a value is off.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

use freshmate_core::ApiError;

/// Date format the inventory service expects.
pub const INVENTORY_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub fn required_str<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str, ApiError> {
    match args.get(key).and_then(Value::as_str).map(str::trim) {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(ApiError::validation(format!("'{key}' must be a non-empty string"))),
    }
}

pub fn optional_str<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub fn optional_u64(args: &Map<String, Value>, key: &str) -> Result<Option<u64>, ApiError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(Some)
            .ok_or_else(|| ApiError::validation(format!("'{key}' must be a non-negative integer"))),
    }
}

pub fn optional_u32(args: &Map<String, Value>, key: &str) -> Result<Option<u32>, ApiError> {
    optional_u64(args, key)?
        .map(|n| u32::try_from(n).map_err(|_| ApiError::validation(format!("'{key}' is too large"))))
        .transpose()
}

pub fn optional_f64(args: &Map<String, Value>, key: &str) -> Option<f64> {
    args.get(key).and_then(Value::as_f64)
}

pub fn optional_bool(args: &Map<String, Value>, key: &str) -> Option<bool> {
    args.get(key).and_then(Value::as_bool)
}

/// A list given either as a JSON array of strings or a comma-separated string.
pub fn string_list(args: &Map<String, Value>, key: &str) -> Vec<String> {
    let items: Vec<String> = match args.get(key) {
        Some(Value::String(s)) => s.split(',').map(str::to_string).collect(),
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Comma-joined form of [`string_list`], or `None` when empty.
pub fn joined_list(args: &Map<String, Value>, key: &str) -> Option<String> {
    let items = string_list(args, key);
    (!items.is_empty()).then(|| items.join(","))
}

/// Parse a user/model supplied date into the inventory format.
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS` and RFC 3339 timestamps.
pub fn normalize_date(key: &str, raw: &str) -> Result<String, ApiError> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
        return Ok(midnight.format(INVENTORY_DATE_FORMAT).to_string());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, INVENTORY_DATE_FORMAT) {
        return Ok(dt.format(INVENTORY_DATE_FORMAT).to_string());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.naive_utc().format(INVENTORY_DATE_FORMAT).to_string());
    }
    Err(ApiError::validation(format!(
        "'{key}' must be a date like 2025-01-31 or 2025-01-31T00:00:00, got '{raw}'"
    )))
}

pub fn optional_date(args: &Map<String, Value>, key: &str) -> Result<Option<String>, ApiError> {
    optional_str(args, key)
        .map(|raw| normalize_date(key, raw))
        .transpose()
}

/// Calendar date of an inventory timestamp. Only the date part matters.
pub fn date_part(raw: &str) -> Option<NaiveDate> {
    let head = raw.get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}
