//! Provider endpoint sets
//!
//! A [`Provider`] describes where a service's authorization endpoints live and
//! how it expects clients to authenticate. Presets exist for Spotify, TIDAL and
//! Discogs; any other OAuth 2.0 service can be described with
//! [`Provider::builder`].
//!
//! # Example
//!
//! ```
//! use minim_auth::{FlowKind, Provider};
//!
//! let provider = Provider::builder()
//!     .name("example")
//!     .api_base_url("https://api.example.com/v1")
//!     .token_url("https://auth.example.com/token")
//!     .supported_flows(vec![FlowKind::ClientCredentials])
//!     .build();
//!
//! assert!(provider.supports(FlowKind::ClientCredentials));
//! assert!(!provider.supports(FlowKind::DeviceCode));
//! ```

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use url::Url;

use crate::error::{AuthError, Result};
use crate::types::FlowKind;

/// How a confidential client presents its secret to the token endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
    /// `Authorization: Basic base64(client_id:client_secret)`
    #[default]
    Basic,
    /// `client_id` and `client_secret` form fields
    Body,
}

/// Endpoints and conventions of one API provider
#[derive(Debug, Clone, TypedBuilder)]
#[builder(doc)]
pub struct Provider {
    /// Provider name, also the credential store section name
    #[builder(setter(into))]
    pub name: String,

    /// OAuth 2.0 authorization endpoint
    #[builder(default, setter(strip_option, into))]
    pub authorization_url: Option<String>,

    /// OAuth 2.0 token endpoint
    #[builder(default, setter(strip_option, into))]
    pub token_url: Option<String>,

    /// RFC 8628 device authorization endpoint
    #[builder(default, setter(strip_option, into))]
    pub device_authorization_url: Option<String>,

    /// OAuth 1.0a request token endpoint
    #[builder(default, setter(strip_option, into))]
    pub request_token_url: Option<String>,

    /// OAuth 1.0a access token endpoint
    #[builder(default, setter(strip_option, into))]
    pub access_token_url: Option<String>,

    /// Base URL that relative request paths are joined onto
    #[builder(setter(into))]
    pub api_base_url: String,

    /// Endpoint returning the authorized user's profile
    #[builder(default, setter(strip_option, into))]
    pub profile_url: Option<String>,

    /// JSON pointer to the user ID inside the profile
    #[builder(default, setter(strip_option, into))]
    pub user_id_pointer: Option<String>,

    /// Prefix of the `{PREFIX}_CLIENT_ID` / `{PREFIX}_CLIENT_SECRET` variables
    #[builder(default, setter(strip_option, into))]
    pub env_prefix: Option<String>,

    /// Client authentication at the token endpoint
    #[builder(default)]
    pub client_auth: ClientAuthMethod,

    /// Flows the provider accepts; empty means unrestricted
    #[builder(default)]
    pub supported_flows: Vec<FlowKind>,

    /// Reject plaintext `http` redirect URIs to non-loopback hosts
    #[builder(default)]
    pub requires_https_redirect: bool,
}

impl Provider {
    /// Spotify Web API
    #[must_use]
    pub fn spotify() -> Self {
        Self::builder()
            .name("spotify")
            .authorization_url("https://accounts.spotify.com/authorize")
            .token_url("https://accounts.spotify.com/api/token")
            .api_base_url("https://api.spotify.com/v1")
            .profile_url("https://api.spotify.com/v1/me")
            .user_id_pointer("/id")
            .env_prefix("SPOTIFY_WEB_API")
            .supported_flows(vec![
                FlowKind::AuthorizationCode,
                FlowKind::AuthorizationCodePkce,
                FlowKind::ClientCredentials,
            ])
            .requires_https_redirect(true)
            .build()
    }

    /// TIDAL API
    #[must_use]
    pub fn tidal() -> Self {
        Self::builder()
            .name("tidal")
            .authorization_url("https://login.tidal.com/authorize")
            .token_url("https://auth.tidal.com/v1/oauth2/token")
            .device_authorization_url("https://auth.tidal.com/v1/oauth2/device_authorization")
            .api_base_url("https://openapi.tidal.com/v2")
            .profile_url("https://openapi.tidal.com/v2/users/me")
            .user_id_pointer("/data/id")
            .env_prefix("TIDAL_API")
            .supported_flows(vec![
                FlowKind::AuthorizationCodePkce,
                FlowKind::ClientCredentials,
                FlowKind::DeviceCode,
            ])
            .build()
    }

    /// Discogs API
    #[must_use]
    pub fn discogs() -> Self {
        Self::builder()
            .name("discogs")
            .authorization_url("https://www.discogs.com/oauth/authorize")
            .request_token_url("https://api.discogs.com/oauth/request_token")
            .access_token_url("https://api.discogs.com/oauth/access_token")
            .api_base_url("https://api.discogs.com")
            .profile_url("https://api.discogs.com/oauth/identity")
            .user_id_pointer("/username")
            .env_prefix("DISCOGS_API")
            .supported_flows(vec![
                FlowKind::OAuth1ThreeLegged,
                FlowKind::OAuth1TwoLegged,
                FlowKind::NoAuth,
            ])
            .build()
    }

    /// Whether the provider accepts `flow`
    #[must_use]
    pub fn supports(&self, flow: FlowKind) -> bool {
        self.supported_flows.is_empty() || self.supported_flows.contains(&flow)
    }

    /// Authorization endpoint
    ///
    /// # Errors
    /// Returns `AuthError::InvalidConfig` if the provider has none.
    pub fn authorization_endpoint(&self) -> Result<Url> {
        self.endpoint("authorization", self.authorization_url.as_deref())
    }

    /// Token endpoint
    ///
    /// # Errors
    /// Returns `AuthError::InvalidConfig` if the provider has none.
    pub fn token_endpoint(&self) -> Result<Url> {
        self.endpoint("token", self.token_url.as_deref())
    }

    /// Device authorization endpoint
    ///
    /// # Errors
    /// Returns `AuthError::InvalidConfig` if the provider has none.
    pub fn device_authorization_endpoint(&self) -> Result<Url> {
        self.endpoint(
            "device authorization",
            self.device_authorization_url.as_deref(),
        )
    }

    /// OAuth 1.0a request token endpoint
    ///
    /// # Errors
    /// Returns `AuthError::InvalidConfig` if the provider has none.
    pub fn request_token_endpoint(&self) -> Result<Url> {
        self.endpoint("request token", self.request_token_url.as_deref())
    }

    /// OAuth 1.0a access token endpoint
    ///
    /// # Errors
    /// Returns `AuthError::InvalidConfig` if the provider has none.
    pub fn access_token_endpoint(&self) -> Result<Url> {
        self.endpoint("access token", self.access_token_url.as_deref())
    }

    /// Profile endpoint, if the provider has one
    ///
    /// # Errors
    /// Returns an error if the configured URL does not parse.
    pub fn profile_endpoint(&self) -> Result<Option<Url>> {
        self.profile_url
            .as_deref()
            .map(|url| self.endpoint("profile", Some(url)))
            .transpose()
    }

    /// Resolve `path` against the API base URL
    ///
    /// Absolute URLs are returned unchanged.
    ///
    /// # Errors
    /// Returns an error if the base URL or the joined URL does not parse.
    pub fn api_url(&self, path: &str) -> Result<Url> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Ok(Url::parse(path)?);
        }
        Ok(Url::parse(&format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        ))?)
    }

    /// Client ID and secret from `{PREFIX}_CLIENT_ID` / `{PREFIX}_CLIENT_SECRET`
    #[must_use]
    pub fn credentials_from_env(&self) -> Option<(String, Option<String>)> {
        let prefix = self.env_prefix.as_deref()?;
        let client_id = std::env::var(format!("{prefix}_CLIENT_ID")).ok()?;
        let client_secret = std::env::var(format!("{prefix}_CLIENT_SECRET")).ok();
        Some((client_id, client_secret))
    }

    /// Validate a redirect URI for this provider
    ///
    /// # Errors
    /// Returns `AuthError::InvalidConfig` for non-http(s) schemes, and for
    /// plaintext `http` to a non-loopback host when the provider requires
    /// HTTPS.
    pub fn validate_redirect_uri(&self, redirect_uri: &Url) -> Result<()> {
        match redirect_uri.scheme() {
            "https" => Ok(()),
            "http" if is_loopback(redirect_uri) || !self.requires_https_redirect => Ok(()),
            "http" => Err(AuthError::invalid_config(format!(
                "{} requires an https redirect URI unless it points to a loopback address, got '{redirect_uri}'",
                self.name
            ))),
            scheme => Err(AuthError::invalid_config(format!(
                "unsupported redirect URI scheme '{scheme}'"
            ))),
        }
    }

    fn endpoint(&self, kind: &str, url: Option<&str>) -> Result<Url> {
        let url = url.ok_or_else(|| {
            AuthError::invalid_config(format!("{} has no {kind} endpoint", self.name))
        })?;
        Ok(Url::parse(url)?)
    }
}

/// Whether the URL points at `localhost`, `127.0.0.1` or `::1`
#[must_use]
pub fn is_loopback(url: &Url) -> bool {
    matches!(
        url.host_str(),
        Some("localhost" | "127.0.0.1" | "[::1]" | "::1")
    )
}
