//! # Freshmate HTTP
//!
//! The outbound transport shared by every service wrapper and the model
//! provider: token-bucket rate limiting, exponential backoff, and a total
//! mapping from HTTP/transport failures to [`freshmate_core::ApiError`].

pub mod classify;
pub mod client;
pub mod rate_limiter;
pub mod retry;

pub use classify::ErrorClassifier;
pub use client::{ApiRequest, HttpClientCore};
pub use rate_limiter::RateLimiter;
pub use retry::{RetryPolicy, RetryState};
