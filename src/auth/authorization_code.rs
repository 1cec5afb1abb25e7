//! Authorization Code Flow, with and without PKCE

use std::collections::BTreeSet;
use url::Url;

use super::{FlowContext, PkceChallenge, token_request, with_query};
use crate::capture::CaptureRequest;
use crate::error::{AuthError, Result};
use crate::types::{TokenSet, join_scopes};
use crate::utils::random_urlsafe;

/// Random bytes behind the `state` parameter
const STATE_BYTES: usize = 24;

pub(super) async fn acquire(
    ctx: &FlowContext<'_>,
    redirect_uri: &Url,
    scopes: &BTreeSet<String>,
    pkce: bool,
) -> Result<TokenSet> {
    if !pkce {
        ctx.identity.require_secret()?;
    }

    let state = random_urlsafe(STATE_BYTES);
    let challenge = pkce.then(PkceChallenge::generate);
    let authorization_url = build_authorization_url(
        ctx,
        redirect_uri,
        scopes,
        &state,
        challenge.as_ref(),
    )?;

    let request = CaptureRequest::new(authorization_url, redirect_uri.as_str())
        .timeout(ctx.capture_timeout)
        .open_browser(ctx.open_browser)
        .cancel(ctx.cancel.clone());
    let redirect = ctx.capture.capture(request).await?.ensure_granted()?;

    if redirect.get("state") != Some(state.as_str()) {
        return Err(AuthError::capture_failed(
            "the state in the redirect does not match the authorization request",
        ));
    }
    let code = redirect
        .get("code")
        .ok_or_else(|| AuthError::capture_failed("the redirect carries no authorization code"))?;

    let mut fields = vec![
        ("grant_type".to_string(), "authorization_code".to_string()),
        ("code".to_string(), code.to_string()),
        ("redirect_uri".to_string(), redirect_uri.to_string()),
    ];
    if let Some(challenge) = challenge {
        fields.push(("client_id".to_string(), ctx.identity.client_id.clone()));
        fields.push(("code_verifier".to_string(), challenge.verifier));
    }

    let token = token_request(ctx, fields, scopes).await?;
    tracing::info!(provider = %ctx.provider.name, "authorization code exchanged for access token");
    Ok(token)
}

fn build_authorization_url(
    ctx: &FlowContext<'_>,
    redirect_uri: &Url,
    scopes: &BTreeSet<String>,
    state: &str,
    challenge: Option<&PkceChallenge>,
) -> Result<Url> {
    let scope = join_scopes(scopes);
    let mut params = vec![
        ("client_id", ctx.identity.client_id.as_str()),
        ("redirect_uri", redirect_uri.as_str()),
        ("response_type", "code"),
        ("state", state),
    ];
    if !scope.is_empty() {
        params.push(("scope", scope.as_str()));
    }
    if let Some(challenge) = challenge {
        params.push(("code_challenge", challenge.challenge.as_str()));
        params.push(("code_challenge_method", PkceChallenge::METHOD));
    }
    Ok(with_query(ctx.provider.authorization_endpoint()?, &params))
}
