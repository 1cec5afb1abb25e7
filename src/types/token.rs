//! Token sets and token endpoint responses

use super::flow::parse_scopes;
use crate::utils::{capitalize, unix_now};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Access credentials held for one client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    /// Access token for API calls
    pub access_token: String,

    /// Refresh token for obtaining new access tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Token type (usually "Bearer", "OAuth" for OAuth 1.0a)
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Unix timestamp when the token expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,

    /// Scopes granted to this token
    #[serde(default)]
    pub granted_scopes: BTreeSet<String>,

    /// OAuth 1.0a access token secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_secret: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenSet {
    /// Create a bearer token set
    #[must_use]
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: default_token_type(),
            expires_at: None,
            granted_scopes: BTreeSet::new(),
            token_secret: None,
        }
    }

    /// Set the refresh token
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Set the absolute expiry (unix seconds)
    #[must_use]
    pub fn with_expires_at(mut self, expires_at: u64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Set the granted scopes
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.granted_scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Check if the token is past its expiry
    ///
    /// Tokens without a tracked expiry are never considered expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expires_at| unix_now() > expires_at)
    }

    /// Get the Authorization header value for bearer-like tokens
    #[must_use]
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }

    /// Get remaining validity duration, if known
    #[must_use]
    pub fn remaining_validity(&self) -> Option<Duration> {
        self.expires_at.and_then(|expires_at| {
            let now = unix_now();
            (expires_at > now).then(|| Duration::from_secs(expires_at - now))
        })
    }

    /// Merge a refreshed token set into this one
    ///
    /// The access token and expiry are replaced. The refresh token and scopes
    /// are replaced only when the refresh response carried them.
    pub fn apply_refresh(&mut self, refreshed: TokenSet) {
        self.access_token = refreshed.access_token;
        self.token_type = refreshed.token_type;
        self.expires_at = refreshed.expires_at;
        if refreshed.refresh_token.is_some() {
            self.refresh_token = refreshed.refresh_token;
        }
        if !refreshed.granted_scopes.is_empty() {
            self.granted_scopes = refreshed.granted_scopes;
        }
    }
}

/// OAuth 2.0 response from a token endpoint
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Convert into a token set
    ///
    /// `requested` is used as the granted scope set when the provider does not
    /// echo the granted scopes back.
    pub fn into_token_set(self, requested: &BTreeSet<String>) -> TokenSet {
        TokenSet {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self
                .token_type
                .as_deref()
                .map_or_else(default_token_type, capitalize),
            expires_at: self.expires_in.map(|seconds| unix_now() + seconds),
            granted_scopes: self
                .scope
                .as_deref()
                .map_or_else(|| requested.clone(), parse_scopes),
            token_secret: None,
        }
    }
}

/// Error body returned by OAuth 2.0 endpoints
#[derive(Debug, Deserialize)]
pub(crate) struct OAuthErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl OAuthErrorResponse {
    /// `error: description`, or the bare error code
    pub fn message(&self) -> String {
        match &self.error_description {
            Some(description) => format!("{}: {description}", self.error),
            None => self.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_from_response() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"access_token":"access123","token_type":"bearer","expires_in":3600,
                "refresh_token":"refresh456","scope":"user-read-private user-top-read"}"#,
        )
        .unwrap();
        let token = response.into_token_set(&BTreeSet::new());

        assert_eq!(token.access_token, "access123");
        assert_eq!(token.refresh_token.as_deref(), Some("refresh456"));
        assert_eq!(token.token_type, "Bearer");
        assert!(token.expires_at.is_some());
        assert!(!token.is_expired());
        assert!(token.granted_scopes.contains("user-top-read"));
    }

    #[test]
    fn test_requested_scopes_used_when_not_echoed() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token":"a","expires_in":60}"#).unwrap();
        let requested: BTreeSet<String> = ["r.read".to_string()].into();
        let token = response.into_token_set(&requested);
        assert_eq!(token.granted_scopes, requested);
        assert_eq!(token.token_type, "Bearer");
    }

    #[test]
    fn test_token_expired() {
        let token = TokenSet::bearer("access123").with_expires_at(unix_now() - 100);
        assert!(token.is_expired());
        assert!(token.remaining_validity().is_none());

        let no_expiry = TokenSet::bearer("access123");
        assert!(!no_expiry.is_expired());
    }

    #[test]
    fn test_authorization_header() {
        let token = TokenSet::bearer("access123");
        assert_eq!(token.authorization_header(), "Bearer access123");
    }

    #[test]
    fn test_apply_refresh_keeps_unrotated_refresh_token() {
        let mut token = TokenSet::bearer("old")
            .with_refresh_token("refresh")
            .with_scopes(["a", "b"]);
        token.apply_refresh(TokenSet::bearer("new").with_expires_at(unix_now() + 3600));

        assert_eq!(token.access_token, "new");
        assert_eq!(token.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(token.granted_scopes.len(), 2);
        assert!(token.expires_at.is_some());
    }

    #[test]
    fn test_oauth_error_message() {
        let err: OAuthErrorResponse = serde_json::from_str(
            r#"{"error":"invalid_grant","error_description":"Refresh token revoked"}"#,
        )
        .unwrap();
        assert_eq!(err.message(), "invalid_grant: Refresh token revoked");
    }
}
