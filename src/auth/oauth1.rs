//! OAuth 1.0a with PLAINTEXT signatures (Discogs)
//!
//! The three-legged flow trades a request token for a user-approved access
//! token and secret. Every resource request is then signed with a fresh
//! nonce and timestamp. The two-legged variant sends the consumer key and
//! secret in a static header and never talks to a token endpoint.

use url::Url;

use super::{FlowContext, with_query};
use crate::capture::CaptureRequest;
use crate::error::{AuthError, Result};
use crate::transport::HttpRequest;
use crate::types::{ClientIdentity, TokenSet};
use crate::utils::{random_hex, unix_now, urlencoding};

/// `oauth_token_type` recorded on OAuth 1.0a token sets
pub const OAUTH1_TOKEN_TYPE: &str = "OAuth";

/// Random bytes behind each `oauth_nonce`
const NONCE_BYTES: usize = 32;

/// Build a PLAINTEXT-signed `Authorization: OAuth ...` header value
///
/// The signature is `consumer_secret&token_secret`, with an empty token
/// secret before a token has been issued.
#[must_use]
pub fn signed_header(
    consumer_key: &str,
    consumer_secret: &str,
    token_secret: Option<&str>,
    extra: &[(&str, &str)],
) -> String {
    let signature = format!("{consumer_secret}&{}", token_secret.unwrap_or_default());
    let nonce = random_hex(NONCE_BYTES);
    let timestamp = unix_now().to_string();

    let mut params = vec![
        ("oauth_consumer_key", consumer_key),
        ("oauth_nonce", nonce.as_str()),
        ("oauth_signature", signature.as_str()),
        ("oauth_signature_method", "PLAINTEXT"),
        ("oauth_timestamp", timestamp.as_str()),
    ];
    params.extend_from_slice(extra);

    let fields = params
        .iter()
        .map(|(k, v)| format!("{k}=\"{}\"", urlencoding(v)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("OAuth {fields}")
}

/// Signed header for a resource request with an access token
///
/// # Errors
/// `MissingCredentials` if the consumer secret or the token secret is absent.
pub fn resource_header(identity: &ClientIdentity, token: &TokenSet) -> Result<String> {
    let consumer_secret = identity.require_secret()?;
    let token_secret = token.token_secret.as_deref().ok_or_else(|| {
        AuthError::missing_credentials("the OAuth 1.0a access token has no token secret")
    })?;
    Ok(signed_header(
        &identity.client_id,
        consumer_secret,
        Some(token_secret),
        &[("oauth_token", token.access_token.as_str())],
    ))
}

/// Static consumer key/secret header (`Discogs key=..., secret=...`)
///
/// # Errors
/// `MissingCredentials` if the consumer secret is absent.
pub fn two_legged_header(identity: &ClientIdentity) -> Result<String> {
    let secret = identity.require_secret()?;
    Ok(format!("Discogs key={}, secret={secret}", identity.client_id))
}

pub(super) async fn acquire(ctx: &FlowContext<'_>, callback_uri: Option<&Url>) -> Result<TokenSet> {
    let consumer_key = ctx.identity.client_id.as_str();
    let consumer_secret = ctx.identity.require_secret()?;

    // Request token
    let extra: Vec<(&str, &str)> = callback_uri
        .map(|uri| vec![("oauth_callback", uri.as_str())])
        .unwrap_or_default();
    let request = HttpRequest::get(ctx.provider.request_token_endpoint()?)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .header(
            "Authorization",
            signed_header(consumer_key, consumer_secret, None, &extra),
        );
    let response = ctx.transport.execute(request).await?;
    if !response.is_success() {
        return Err(response.into_error());
    }
    let pairs = response.form_pairs();
    let (request_token, request_secret) = token_pair(&pairs, "request token")?;

    // User authorization
    let authorization_url = with_query(
        ctx.provider.authorization_endpoint()?,
        &[("oauth_token", request_token.as_str())],
    );
    let redirect_prefix = callback_uri.map(Url::to_string).unwrap_or_default();
    let capture = CaptureRequest::new(authorization_url, redirect_prefix)
        .timeout(ctx.capture_timeout)
        .open_browser(ctx.open_browser)
        .cancel(ctx.cancel.clone());
    let redirect = ctx.capture.capture(capture).await?.ensure_granted()?;
    let verifier = redirect
        .get("oauth_verifier")
        .or_else(|| redirect.get("code"))
        .ok_or_else(|| AuthError::capture_failed("the redirect carries no oauth_verifier"))?;

    // Access token
    let request = HttpRequest::post(ctx.provider.access_token_endpoint()?)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .header(
            "Authorization",
            signed_header(
                consumer_key,
                consumer_secret,
                Some(&request_secret),
                &[
                    ("oauth_token", request_token.as_str()),
                    ("oauth_verifier", verifier),
                ],
            ),
        );
    let response = ctx.transport.execute(request).await?;
    if !response.is_success() {
        return Err(response.into_error());
    }
    let pairs = response.form_pairs();
    let (access_token, access_secret) = token_pair(&pairs, "access token")?;

    tracing::info!(provider = %ctx.provider.name, "OAuth 1.0a access token obtained");
    Ok(TokenSet {
        access_token,
        refresh_token: None,
        token_type: OAUTH1_TOKEN_TYPE.to_string(),
        expires_at: None,
        granted_scopes: Default::default(),
        token_secret: Some(access_secret),
    })
}

fn token_pair(
    pairs: &std::collections::BTreeMap<String, String>,
    what: &str,
) -> Result<(String, String)> {
    match (pairs.get("oauth_token"), pairs.get("oauth_token_secret")) {
        (Some(token), Some(secret)) => Ok((token.clone(), secret.clone())),
        _ => Err(AuthError::invalid_response(format!(
            "{what} response is missing oauth_token or oauth_token_secret"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FlowKind;

    fn header_fields(header: &str) -> std::collections::BTreeMap<String, String> {
        header
            .trim_start_matches("OAuth ")
            .split(", ")
            .filter_map(|field| field.split_once('='))
            .map(|(k, v)| (k.to_string(), v.trim_matches('"').to_string()))
            .collect()
    }

    #[test]
    fn test_signed_header_plaintext_signature() {
        let header = signed_header("key", "secret", None, &[("oauth_callback", "http://localhost:8888/cb")]);
        assert!(header.starts_with("OAuth "));
        let fields = header_fields(&header);
        assert_eq!(fields["oauth_signature"], "secret%26");
        assert_eq!(fields["oauth_signature_method"], "PLAINTEXT");
        assert_eq!(fields["oauth_callback"], "http%3A%2F%2Flocalhost%3A8888%2Fcb");
        assert_eq!(fields["oauth_nonce"].len(), 64);
    }

    #[test]
    fn test_nonce_is_fresh_per_request() {
        let a = header_fields(&signed_header("key", "secret", Some("ts"), &[]));
        let b = header_fields(&signed_header("key", "secret", Some("ts"), &[]));
        assert_ne!(a["oauth_nonce"], b["oauth_nonce"]);
        assert_eq!(a["oauth_signature"], "secret%26ts");
    }

    #[test]
    fn test_resource_header_requires_token_secret() {
        let identity = ClientIdentity::new("discogs", "key", Some("secret".into()), FlowKind::OAuth1ThreeLegged);
        let token = TokenSet::bearer("tok");
        assert!(matches!(
            resource_header(&identity, &token),
            Err(AuthError::MissingCredentials(_))
        ));

        let mut token = token;
        token.token_secret = Some("tsecret".into());
        let fields = header_fields(&resource_header(&identity, &token).unwrap());
        assert_eq!(fields["oauth_token"], "tok");
        assert_eq!(fields["oauth_signature"], "secret%26tsecret");
    }

    #[test]
    fn test_two_legged_header() {
        let identity = ClientIdentity::new("discogs", "key", None, FlowKind::OAuth1TwoLegged);
        assert!(matches!(
            two_legged_header(&identity),
            Err(AuthError::MissingCredentials(_))
        ));
    }
}
