//! Reduce HTTP responses and transport failures to [`ApiError`].
//!
//! The mapping is total: every status and every `reqwest` failure lands in
//! exactly one variant.

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde_json::Value;
use std::time::Duration;

use freshmate_core::ApiError;

/// Body fields checked, in order, for a human-readable error message.
const MESSAGE_FIELDS: [&str; 3] = ["error", "message", "detail"];

pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify a non-success response.
    pub fn from_response(status: StatusCode, headers: &HeaderMap, body: &str) -> ApiError {
        let message = extract_message(body).unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
        Self::from_status(status.as_u16(), message, retry_after(headers))
    }

    /// The status table.
    pub fn from_status(status: u16, message: String, retry_after: Option<Duration>) -> ApiError {
        match status {
            400 | 422 => ApiError::Validation { message },
            401 => ApiError::Authentication { message },
            403 => ApiError::Authorization { message },
            404 => ApiError::NotFound { message },
            429 => ApiError::RateLimited {
                message,
                retry_after,
            },
            500..=599 => ApiError::Server { status, message },
            _ => ApiError::Unexpected {
                status: Some(status),
                message,
            },
        }
    }

    /// Classify a failure that produced no usable response.
    pub fn from_transport(err: &reqwest::Error) -> ApiError {
        if err.is_timeout() {
            ApiError::timeout(err.to_string())
        } else if err.is_decode() {
            ApiError::Unexpected {
                status: err.status().map(|s| s.as_u16()),
                message: format!("failed to decode response: {err}"),
            }
        } else if err.is_connect() || err.is_request() || err.is_body() {
            ApiError::connection(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(status.as_u16(), err.to_string(), None)
        } else {
            ApiError::connection(err.to_string())
        }
    }

    /// A 2xx body that did not match the expected shape.
    pub fn from_decode(err: &serde_json::Error) -> ApiError {
        ApiError::unexpected(format!("failed to decode response: {err}"))
    }
}

fn extract_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    MESSAGE_FIELDS.iter().find_map(|field| match value.get(*field)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        nested @ (Value::Array(_) | Value::Object(_)) => Some(nested.to_string()),
        _ => None,
    })
}

/// `Retry-After` in whole seconds. HTTP-date values are ignored.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
