//! Flow strategies
//!
//! One strategy per [`FlowDescriptor`] variant, dispatched by [`acquire`] and
//! [`refresh`]. Strategies are stateless; everything they need (identity,
//! provider endpoints, HTTP transport, redirect capture) travels in a
//! [`FlowContext`].
//!
//! | Flow | Interaction | Refreshable |
//! |------|-------------|-------------|
//! | Authorization code | redirect capture | yes |
//! | Authorization code + PKCE | redirect capture | yes |
//! | Client credentials | none | no (re-acquired) |
//! | Device code | user visits a verification URI | yes |
//! | OAuth 1.0a three-legged | redirect capture or pasted verifier | no |
//! | OAuth 1.0a two-legged | none, static header | n/a |
//!
//! # Security
//!
//! - PKCE verifiers and `state` values come from the OS CSPRNG and are fresh
//!   for every acquisition
//! - A redirect whose `state` does not match is rejected before the code is
//!   exchanged
//! - Denied redirects never reach the token endpoint

mod authorization_code;
mod client_credentials;
mod device_code;
pub mod oauth1;
mod pkce;

use std::collections::BTreeSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::capture::RedirectCapture;
use crate::error::{AuthError, Result};
use crate::provider::{ClientAuthMethod, Provider};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};
use crate::types::token::TokenResponse;
use crate::types::{ClientIdentity, FlowDescriptor, TokenSet};
use crate::utils::{basic_auth, urlencoding};

pub use pkce::PkceChallenge;

/// Everything a flow strategy needs from its caller
#[derive(Clone, Copy)]
pub struct FlowContext<'a> {
    /// Client the tokens are issued to
    pub identity: &'a ClientIdentity,
    /// Provider endpoints
    pub provider: &'a Provider,
    /// HTTP transport for token endpoint calls
    pub transport: &'a dyn HttpTransport,
    /// Redirect capture for interactive flows
    pub capture: &'a dyn RedirectCapture,
    /// Open authorization and verification URLs in the default browser
    pub open_browser: bool,
    /// Upper bound on interactive waits
    pub capture_timeout: Option<Duration>,
    /// Aborts interactive waits
    pub cancel: &'a CancellationToken,
}

impl std::fmt::Debug for FlowContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowContext")
            .field("identity", self.identity)
            .field("provider", &self.provider.name)
            .field("open_browser", &self.open_browser)
            .field("capture_timeout", &self.capture_timeout)
            .finish_non_exhaustive()
    }
}

/// Run the flow and return a fresh token set
///
/// # Errors
/// Any flow error: `MissingCredentials`, `AuthorizationDenied`,
/// `CaptureTimeout`, `CaptureFailed`, `Cancelled` or `Transport`. Flows that
/// do not issue tokens (two-legged OAuth 1.0a, no auth) fail with
/// `InvalidConfig`.
pub async fn acquire(ctx: &FlowContext<'_>, flow: &FlowDescriptor) -> Result<TokenSet> {
    tracing::info!(provider = %ctx.provider.name, flow = %flow.kind(), "acquiring access token");
    match flow {
        FlowDescriptor::AuthorizationCode {
            redirect_uri,
            scopes,
        } => authorization_code::acquire(ctx, redirect_uri, scopes, false).await,
        FlowDescriptor::AuthorizationCodePkce {
            redirect_uri,
            scopes,
        } => authorization_code::acquire(ctx, redirect_uri, scopes, true).await,
        FlowDescriptor::ClientCredentials { scopes } => {
            client_credentials::acquire(ctx, scopes).await
        }
        FlowDescriptor::DeviceCode {
            scopes,
            poll_interval,
        } => device_code::acquire(ctx, scopes, *poll_interval).await,
        FlowDescriptor::OAuth1ThreeLegged { callback_uri } => {
            oauth1::acquire(ctx, callback_uri.as_ref()).await
        }
        FlowDescriptor::OAuth1TwoLegged | FlowDescriptor::NoAuth => Err(AuthError::invalid_config(
            format!("the {} does not issue access tokens", flow.kind()),
        )),
    }
}

/// Renew `token`
///
/// Uses the `refresh_token` grant when the token carries a refresh token and
/// the flow supports it, falling back to a full [`acquire`] if the token
/// endpoint rejects the refresh. Flows without refresh tokens are re-acquired.
///
/// # Errors
/// Same as [`acquire`].
pub async fn refresh(
    ctx: &FlowContext<'_>,
    flow: &FlowDescriptor,
    token: &TokenSet,
) -> Result<TokenSet> {
    if let Some(refresh_token) = token
        .refresh_token
        .as_deref()
        .filter(|_| flow.kind().supports_refresh())
    {
        tracing::debug!(provider = %ctx.provider.name, "refreshing access token");
        match refresh_grant(ctx, refresh_token, &token.granted_scopes).await {
            Ok(refreshed) => {
                let mut merged = token.clone();
                merged.apply_refresh(refreshed);
                return Ok(merged);
            }
            Err(e @ AuthError::Transport { .. }) => {
                tracing::warn!("Token refresh failed, re-authorizing: {e}");
            }
            Err(e) => return Err(e),
        }
    }
    acquire(ctx, flow).await
}

async fn refresh_grant(
    ctx: &FlowContext<'_>,
    refresh_token: &str,
    scopes: &BTreeSet<String>,
) -> Result<TokenSet> {
    let fields = vec![
        ("grant_type".to_string(), "refresh_token".to_string()),
        ("refresh_token".to_string(), refresh_token.to_string()),
    ];
    token_request(ctx, fields, scopes).await
}

/// POST a grant to the token endpoint and parse the token set
pub(crate) async fn token_request(
    ctx: &FlowContext<'_>,
    fields: Vec<(String, String)>,
    requested: &BTreeSet<String>,
) -> Result<TokenSet> {
    let response = post_token_form(ctx, fields).await?;
    parse_token_response(&response, requested)
}

/// POST a grant to the token endpoint, returning the raw response
pub(crate) async fn post_token_form(
    ctx: &FlowContext<'_>,
    mut fields: Vec<(String, String)>,
) -> Result<HttpResponse> {
    let request = HttpRequest::post(ctx.provider.token_endpoint()?)
        .header("Accept", "application/json");
    let request = authenticate_client(ctx, request, &mut fields);
    ctx.transport.execute(request.form(fields)).await
}

pub(crate) fn parse_token_response(
    response: &HttpResponse,
    requested: &BTreeSet<String>,
) -> Result<TokenSet> {
    if !response.is_success() {
        return Err(response.clone().into_error());
    }
    let token: TokenResponse = response.json().map_err(|e| {
        AuthError::invalid_response(format!("failed to parse token response: {e}"))
    })?;
    Ok(token.into_token_set(requested))
}

/// Attach client authentication per the provider's convention
///
/// Public clients (no secret) identify themselves with a `client_id` field.
fn authenticate_client(
    ctx: &FlowContext<'_>,
    request: HttpRequest,
    fields: &mut Vec<(String, String)>,
) -> HttpRequest {
    let identity = ctx.identity;
    let has_client_id = fields.iter().any(|(k, _)| k == "client_id");
    match (identity.client_secret.as_deref(), ctx.provider.client_auth) {
        (Some(secret), ClientAuthMethod::Basic) => {
            request.header("Authorization", basic_auth(&identity.client_id, secret))
        }
        (Some(secret), ClientAuthMethod::Body) => {
            if !has_client_id {
                fields.push(("client_id".into(), identity.client_id.clone()));
            }
            fields.push(("client_secret".into(), secret.to_string()));
            request
        }
        (None, _) => {
            if !has_client_id {
                fields.push(("client_id".into(), identity.client_id.clone()));
            }
            request
        }
    }
}

/// Append RFC 3986-encoded query parameters to `base`
pub(crate) fn with_query(mut base: Url, params: &[(&str, &str)]) -> Url {
    let encoded = params
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencoding(v)))
        .collect::<Vec<_>>()
        .join("&");
    let query = match base.query() {
        Some(existing) if !existing.is_empty() => format!("{existing}&{encoded}"),
        _ => encoded,
    };
    base.set_query(Some(&query));
    base
}

/// Authorization header value for a request under `flow`
///
/// # Errors
/// `MissingCredentials` when the flow needs a secret or a token that is absent.
pub fn authorization_header(
    identity: &ClientIdentity,
    flow: &FlowDescriptor,
    token: Option<&TokenSet>,
) -> Result<Option<String>> {
    match flow {
        FlowDescriptor::NoAuth => Ok(None),
        FlowDescriptor::OAuth1TwoLegged => oauth1::two_legged_header(identity).map(Some),
        FlowDescriptor::OAuth1ThreeLegged { .. } => {
            let token = token.ok_or_else(|| {
                AuthError::missing_credentials("no OAuth 1.0a access token has been obtained")
            })?;
            oauth1::resource_header(identity, token).map(Some)
        }
        FlowDescriptor::AuthorizationCode { .. }
        | FlowDescriptor::AuthorizationCodePkce { .. }
        | FlowDescriptor::ClientCredentials { .. }
        | FlowDescriptor::DeviceCode { .. } => token
            .map(|t| Some(t.authorization_header()))
            .ok_or_else(|| AuthError::missing_credentials("no access token has been obtained")),
    }
}
