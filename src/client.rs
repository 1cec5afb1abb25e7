//! `ApiClient` for authorized JSON requests
//!
//! The client pairs a [`TokenSessionGuard`] with a response cache. Paths are
//! resolved against the provider's API base URL; every request goes through
//! the guard, so expired tokens are refreshed and 401/429 responses are
//! retried once.
//!
//! # Example: Client credentials
//!
//! ```no_run
//! use minim_auth::{ApiClient, CacheTtl, ClientConfig, FlowDescriptor, Provider};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::builder()
//!     .provider(Provider::spotify())
//!     .flow(FlowDescriptor::client_credentials(Vec::<String>::new()))
//!     .client_id("your-client-id")
//!     .client_secret("your-client-secret")
//!     .build();
//! let mut client = ApiClient::new(config)?;
//!
//! let album = client
//!     .get_json_cached("albums/4aawyAB9vmqN3uQ7FjRGTy", CacheTtl::Catalog)
//!     .await?;
//! println!("{}", album["name"]);
//! # Ok(())
//! # }
//! ```
//!
//! # Example: Guarded operation
//!
//! ```no_run
//! use minim_auth::scope::{Entitlement, ScopeRequirement};
//! use minim_auth::{ApiClient, ClientConfig, FlowDescriptor, Provider};
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::builder()
//!     .provider(Provider::spotify())
//!     .flow(FlowDescriptor::pkce(
//!         Url::parse("http://127.0.0.1:8888/callback")?,
//!         ["user-modify-playback-state"],
//!     ))
//!     .client_id("your-client-id")
//!     .build();
//! let mut client = ApiClient::new(config)?;
//! client.authorize().await?;
//!
//! client.ensure_scopes(
//!     "player.pause_playback",
//!     &ScopeRequirement::one("user-modify-playback-state"),
//! )?;
//! client
//!     .ensure_entitlement("player.pause_playback", &Entitlement::spotify_premium())
//!     .await?;
//! client.put_json("me/player/pause", None).await?;
//! # Ok(())
//! # }
//! ```

use serde_json::Value;

use crate::cache::{CallSignature, ResponseCache};
use crate::config::{CacheTtl, ClientConfig};
use crate::error::{AuthError, Result};
use crate::guard::TokenSessionGuard;
use crate::scope::{self, Entitlement, ScopeRequirement};
use crate::transport::{HttpResponse, Method, RequestBody};
use crate::types::{FlowDescriptor, TokenSet};

/// Authorized JSON client for one provider
#[derive(Debug)]
pub struct ApiClient {
    guard: TokenSessionGuard,
    cache: Option<ResponseCache>,
}

impl ApiClient {
    /// Create a client
    ///
    /// No request is sent; the first call acquires a token if none was
    /// supplied or stored.
    ///
    /// # Errors
    /// Same as [`TokenSessionGuard::new`].
    pub fn new(config: ClientConfig) -> Result<Self> {
        let guard = TokenSessionGuard::new(&config)?;
        let cache = config.cache.then(|| ResponseCache::new(config.cache_capacity));
        Ok(Self { guard, cache })
    }

    /// The underlying session guard
    pub fn guard(&self) -> &TokenSessionGuard {
        &self.guard
    }

    /// Mutable access to the underlying session guard
    pub fn guard_mut(&mut self) -> &mut TokenSessionGuard {
        &mut self.guard
    }

    /// Current token set, if any
    pub fn token(&self) -> Option<&TokenSet> {
        self.guard.token()
    }

    /// Run the configured flow now instead of on the first request
    ///
    /// Cached responses are dropped once the new token is installed, since
    /// it may belong to another account.
    ///
    /// # Errors
    /// Any flow error.
    pub async fn authorize(&mut self) -> Result<()> {
        self.guard.authorize().await?;
        self.clear_cache();
        Ok(())
    }

    /// Send a request to `path` (relative to the API base URL, or absolute)
    ///
    /// # Errors
    /// Any error of [`TokenSessionGuard::send`].
    pub async fn request(
        &mut self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<HttpResponse> {
        let url = self.guard.provider().api_url(path)?;
        self.guard.send(method, url, body.map(RequestBody::Json)).await
    }

    /// GET `path` and parse the JSON body
    ///
    /// # Errors
    /// Request errors, or `InvalidResponse` for a body that is not JSON.
    pub async fn get_json(&mut self, path: &str) -> Result<Value> {
        let response = self.request(Method::GET, path, None).await?;
        parse_json(&response)
    }

    /// GET `path` through the response cache
    ///
    /// Falls back to [`get_json`](Self::get_json) when caching is disabled.
    ///
    /// # Errors
    /// Same as [`get_json`](Self::get_json).
    pub async fn get_json_cached(&mut self, path: &str, ttl: CacheTtl) -> Result<Value> {
        let url = self.guard.provider().api_url(path)?;
        let key = CallSignature::new(Method::GET.as_str(), url.as_str(), None);
        if let Some(value) = self.cache.as_ref().and_then(|cache| cache.get(&key)) {
            tracing::trace!(%url, "response cache hit");
            return Ok(value);
        }

        let response = self.guard.send(Method::GET, url, None).await?;
        let value = parse_json(&response)?;
        if let Some(cache) = &self.cache {
            cache.insert(key, value.clone(), ttl.duration());
        }
        Ok(value)
    }

    /// POST a JSON body to `path`
    ///
    /// # Errors
    /// Same as [`get_json`](Self::get_json).
    pub async fn post_json(&mut self, path: &str, body: Option<Value>) -> Result<Value> {
        let response = self.request(Method::POST, path, body).await?;
        parse_json(&response)
    }

    /// PUT a JSON body to `path`
    ///
    /// # Errors
    /// Same as [`get_json`](Self::get_json).
    pub async fn put_json(&mut self, path: &str, body: Option<Value>) -> Result<Value> {
        let response = self.request(Method::PUT, path, body).await?;
        parse_json(&response)
    }

    /// DELETE `path`
    ///
    /// # Errors
    /// Same as [`get_json`](Self::get_json).
    pub async fn delete(&mut self, path: &str, body: Option<Value>) -> Result<Value> {
        let response = self.request(Method::DELETE, path, body).await?;
        parse_json(&response)
    }

    /// Check the granted scopes before calling `operation`
    ///
    /// # Errors
    /// `AuthError::Scope` naming the missing scopes.
    pub fn ensure_scopes(&self, operation: &str, requirement: &ScopeRequirement) -> Result<()> {
        scope::ensure(operation, &self.guard.granted_scopes(), requirement)
    }

    /// Profile of the authorized user, cached for [`CacheTtl::User`]
    ///
    /// # Errors
    /// `InvalidConfig` if the provider has no profile endpoint, and request
    /// errors.
    pub async fn profile(&mut self) -> Result<Value> {
        let url = self.guard.provider().profile_endpoint()?.ok_or_else(|| {
            AuthError::invalid_config(format!(
                "{} has no profile endpoint",
                self.guard.provider().name
            ))
        })?;
        self.get_json_cached(url.as_str(), CacheTtl::User).await
    }

    /// Check an entitlement before calling `operation`
    ///
    /// Costs one profile fetch, unless the profile is still cached.
    ///
    /// # Errors
    /// `AuthError::Entitlement` when the profile does not satisfy it, and
    /// errors of [`profile`](Self::profile).
    pub async fn ensure_entitlement(
        &mut self,
        operation: &str,
        entitlement: &Entitlement,
    ) -> Result<()> {
        let profile = self.profile().await?;
        entitlement.ensure(operation, &profile)
    }

    /// Switch to another flow, dropping the current token and cached responses
    ///
    /// # Errors
    /// Same as [`TokenSessionGuard::set_flow`].
    pub fn set_flow(&mut self, flow: FlowDescriptor) -> Result<()> {
        self.guard.set_flow(flow)?;
        self.clear_cache();
        Ok(())
    }

    /// Replace the token set
    pub fn set_access_token(&mut self, token: TokenSet) {
        self.guard.set_access_token(token);
        self.clear_cache();
    }

    /// Forget the current token and its stored record
    ///
    /// # Errors
    /// Same as [`TokenSessionGuard::logout`].
    pub fn logout(&mut self) -> Result<bool> {
        self.clear_cache();
        self.guard.logout()
    }

    /// Drop every cached response
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }
}

/// JSON body of a successful response; `Null` for an empty body
fn parse_json(response: &HttpResponse) -> Result<Value> {
    if response.body.trim().is_empty() {
        return Ok(Value::Null);
    }
    response
        .json()
        .map_err(|e| AuthError::invalid_response(format!("response body is not JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_empty_body_is_null() {
        assert_eq!(parse_json(&HttpResponse::new(204, "")).unwrap(), Value::Null);
        assert_eq!(
            parse_json(&HttpResponse::new(200, r#"{"id":"u"}"#)).unwrap()["id"],
            "u"
        );
        assert!(matches!(
            parse_json(&HttpResponse::new(200, "<html>")),
            Err(AuthError::InvalidResponse(_))
        ));
    }
}
