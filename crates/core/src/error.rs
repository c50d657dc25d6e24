//! Error types for the Freshmate domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`ApiError`] is the closed
//! taxonomy every outbound call is reduced to.

use std::time::Duration;
use thiserror::Error;

/// The top-level error type for Freshmate operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Outbound API errors ---
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    // --- Tool registration errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- History errors ---
    #[error("History error: {0}")]
    History(#[from] HistoryError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure of an outbound call surfaces as exactly one of these.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Insufficient permissions: {message}")]
    Authorization { message: String },

    #[error("Resource not found: {message}")]
    NotFound { message: String },

    #[error("Request validation failed: {message}")]
    Validation { message: String },

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Server error (status: {status}): {message}")]
    Server { status: u16, message: String },

    #[error("Connection error: {message}")]
    Connection { message: String },

    #[error("Request timed out: {message}")]
    Timeout { message: String },

    #[error("Unexpected error: {message}")]
    Unexpected {
        status: Option<u16>,
        message: String,
    },
}

impl ApiError {
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected {
            status: None,
            message: message.into(),
        }
    }

    /// The taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::Authorization { .. } => ErrorKind::Authorization,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::RateLimited { .. } => ErrorKind::RateLimit,
            Self::Server { .. } => ErrorKind::Server,
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Unexpected { .. } => ErrorKind::Unexpected,
        }
    }

    /// The human-readable message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Authentication { message }
            | Self::Authorization { message }
            | Self::NotFound { message }
            | Self::Validation { message }
            | Self::RateLimited { message, .. }
            | Self::Server { message, .. }
            | Self::Connection { message }
            | Self::Timeout { message }
            | Self::Unexpected { message, .. } => message,
        }
    }

    /// Connection failures, timeouts, 5xx and 429 are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::Server { .. }
                | Self::Connection { .. }
                | Self::Timeout { .. }
        )
    }

    /// Server-supplied wait hint, only ever present on 429 responses.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Discriminant of [`ApiError`], with the stable names exposed to the model
/// as `error_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Authentication,
    Authorization,
    NotFound,
    Validation,
    RateLimit,
    Server,
    Connection,
    Timeout,
    Unexpected,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication_error",
            Self::Authorization => "authorization_error",
            Self::NotFound => "not_found_error",
            Self::Validation => "validation_error",
            Self::RateLimit => "rate_limit_error",
            Self::Server => "server_error",
            Self::Connection => "connection_error",
            Self::Timeout => "timeout_error",
            Self::Unexpected => "unexpected_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Bounded context errors ---

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid parameter schema for {tool_name}: {reason}")]
    InvalidSchema { tool_name: String, reason: String },
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Corrupted history for thread {thread_id}: {reason}")]
    Corrupted { thread_id: String, reason: String },
}
