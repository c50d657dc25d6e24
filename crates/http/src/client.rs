//! The HTTP client core every outbound service goes through.
//!
//! One logical request = one [`ApiRequest`]. The core turns it into as many
//! attempts as the [`RetryPolicy`] allows, takes a [`RateLimiter`] token
//! before each attempt, injects the turn's bearer credential and reduces
//! every failure to an [`ApiError`].

use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use freshmate_config::ClientConfig;
use freshmate_core::{ApiError, AuthContext, Error};

use crate::classify::ErrorClassifier;
use crate::rate_limiter::RateLimiter;
use crate::retry::RetryPolicy;

const USER_AGENT_VALUE: &str = concat!("freshmate/", env!("CARGO_PKG_VERSION"));

/// One logical outbound request, relative to the client's base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    segments: Vec<String>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    /// `path` is split on `/`; its pieces are used as-is.
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            segments: path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: &str) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: &str) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: &str) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append one path segment, percent-encoded (user input goes here).
    /// Blank, `.` and `..` segments are rejected when the request is sent.
    pub fn segment(mut self, value: impl ToString) -> Self {
        self.segments.push(value.to_string());
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn query_opt(self, key: impl Into<String>, value: Option<impl ToString>) -> Self {
        match value {
            Some(v) => self.query(key, v),
            None => self,
        }
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// The path as it will be sent, for logs.
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }
}

pub struct HttpClientCore {
    service: String,
    base_url: Url,
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    default_query: Vec<(String, String)>,
}

impl HttpClientCore {
    /// Build a client for `service` rooted at `base_url`.
    pub fn new(service: impl Into<String>, base_url: &str, config: &ClientConfig) -> Result<Self, Error> {
        let service = service.into();
        let mut base_url = Url::parse(base_url)
            .map_err(|e| Error::config(format!("invalid base URL for {service}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::config(format!(
                "base URL for {service} cannot carry a path: {base_url}"
            )));
        }
        base_url.set_query(None);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;

        let limiter = RateLimiter::new(config.rate_limit_per_second, config.burst_capacity)?;

        Ok(Self {
            service,
            base_url,
            client,
            limiter: Arc::new(limiter),
            retry: RetryPolicy::from_config(config),
            default_query: Vec::new(),
        })
    }

    /// Send `key=value` on every request (service API keys).
    pub fn with_default_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_query.push((key.into(), value.into()));
        self
    }

    /// Share a limiter with other clients.
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.limiter)
    }

    /// Run `request` to completion and decode the body as `T`.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
        auth: &AuthContext,
    ) -> Result<T, ApiError> {
        let url = self.url_for(request)?;
        self.retry
            .execute(|attempt| self.attempt(request, url.clone(), auth, attempt))
            .await
    }

    fn url_for(&self, request: &ApiRequest) -> Result<Url, ApiError> {
        // The url crate silently drops dot segments, which would retarget the request.
        if let Some(bad) = request
            .segments
            .iter()
            .find(|s| matches!(s.trim(), "" | "." | ".."))
        {
            return Err(ApiError::validation(format!(
                "invalid path segment {bad:?} for {}",
                self.service
            )));
        }
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::unexpected(format!("{} base URL cannot carry a path", self.service)))?
            .pop_if_empty()
            .extend(&request.segments);
        Ok(url)
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
        url: Url,
        auth: &AuthContext,
        attempt: u32,
    ) -> Result<T, ApiError> {
        self.limiter.acquire().await;

        debug!(
            service = %self.service,
            method = %request.method,
            path = %request.path(),
            attempt,
            token = %auth.fingerprint(),
            "Sending request"
        );

        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .header(AUTHORIZATION, auth.bearer_header())
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, USER_AGENT_VALUE);
        if !self.default_query.is_empty() {
            builder = builder.query(&self.default_query);
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ErrorClassifier::from_transport(&e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let text = response
            .text()
            .await
            .map_err(|e| ErrorClassifier::from_transport(&e))?;

        if !status.is_success() {
            let err = ErrorClassifier::from_response(status, &headers, &text);
            debug!(
                service = %self.service,
                status = status.as_u16(),
                kind = %err.kind(),
                "Request failed"
            );
            return Err(err);
        }

        debug!(service = %self.service, status = status.as_u16(), "Request succeeded");
        let text = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str(text).map_err(|e| ErrorClassifier::from_decode(&e))
    }
}
