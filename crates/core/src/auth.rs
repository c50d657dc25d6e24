//! Per-turn authentication context.
//!
//! A turn resolves its credential exactly once, at entry, and carries the
//! resulting [`AuthContext`] down to every outbound call. The token itself
//! never appears in logs or `Debug` output; use [`AuthContext::fingerprint`].

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::error::ApiError;

/// Header names checked, in order, when resolving a token from request headers.
const TOKEN_HEADERS: [&str; 2] = ["authorization", "freshalert-token"];

/// Where the credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthSource {
    /// Extracted from an inbound request header.
    Header,
    /// Supplied directly by the caller (CLI flag, service key).
    Explicit,
}

/// An immutable bearer credential for one logical conversation turn.
#[derive(Clone)]
pub struct AuthContext {
    token: String,
    source: AuthSource,
    resolved_at: DateTime<Utc>,
}

impl AuthContext {
    /// Build a context from an explicitly supplied token.
    pub fn explicit(token: impl Into<String>) -> Result<Self, ApiError> {
        Self::resolve(Some(token.into().as_str()), AuthSource::Explicit)
    }

    /// Build a context from a raw header value, `Bearer ` prefix optional.
    pub fn from_header(value: Option<&str>) -> Result<Self, ApiError> {
        Self::resolve(value, AuthSource::Header)
    }

    /// Look up the credential in a header map (case-insensitive names).
    pub fn from_headers(headers: &HashMap<String, String>) -> Result<Self, ApiError> {
        let value = TOKEN_HEADERS.iter().find_map(|wanted| {
            headers
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
                .map(|(_, value)| value.as_str())
        });
        Self::from_header(value)
    }

    fn resolve(raw: Option<&str>, source: AuthSource) -> Result<Self, ApiError> {
        let raw = raw.map(str::trim).unwrap_or_default();
        // A bare scheme with nothing after it counts as missing.
        let token = match raw.split_once(' ') {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
            None if raw.eq_ignore_ascii_case("bearer") => "",
            _ => raw,
        };

        if token.is_empty() {
            return Err(ApiError::authentication("missing bearer token"));
        }

        Ok(Self {
            token: token.to_string(),
            source,
            resolved_at: Utc::now(),
        })
    }

    /// The value for an `Authorization` header.
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// The raw token. Only transport code should need this.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn source(&self) -> AuthSource {
        self.source
    }

    pub fn resolved_at(&self) -> DateTime<Utc> {
        self.resolved_at
    }

    /// A short, log-safe identifier: the first four characters and an ellipsis.
    pub fn fingerprint(&self) -> String {
        let head: String = self.token.chars().take(4).collect();
        format!("{head}…")
    }
}

impl std::fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthContext")
            .field("token", &self.fingerprint())
            .field("source", &self.source)
            .field("resolved_at", &self.resolved_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_strips_bearer_prefix() {
        let auth = AuthContext::from_header(Some("Bearer abc123")).unwrap();
        assert_eq!(auth.token(), "abc123");
        assert_eq!(auth.source(), AuthSource::Header);
        assert_eq!(auth.bearer_header(), "Bearer abc123");
    }

    #[test]
    fn header_without_prefix_is_accepted() {
        let auth = AuthContext::from_header(Some("  raw-token ")).unwrap();
        assert_eq!(auth.token(), "raw-token");
    }

    #[test]
    fn missing_token_fails_fast() {
        let err = AuthContext::from_header(None).unwrap_err();
        assert!(matches!(err, ApiError::Authentication { .. }));

        for blank in ["Bearer   ", "bearer", "  "] {
            let err = AuthContext::from_header(Some(blank)).unwrap_err();
            assert!(matches!(err, ApiError::Authentication { .. }), "{blank:?}");
        }

        assert!(AuthContext::explicit("").is_err());
    }

    #[test]
    fn headers_lookup_is_case_insensitive() {
        let mut headers = HashMap::new();
        headers.insert("FreshAlert-Token".to_string(), "tok-1".to_string());
        let auth = AuthContext::from_headers(&headers).unwrap();
        assert_eq!(auth.token(), "tok-1");

        headers.insert("Authorization".to_string(), "Bearer tok-2".to_string());
        let auth = AuthContext::from_headers(&headers).unwrap();
        assert_eq!(auth.token(), "tok-2");
    }

    #[test]
    fn debug_never_shows_full_token() {
        let auth = AuthContext::explicit("super-secret-token").unwrap();
        let debug = format!("{auth:?}");
        assert!(!debug.contains("super-secret-token"));
        assert!(debug.contains("supe…"));
        assert_eq!(auth.source(), AuthSource::Explicit);
    }
}
