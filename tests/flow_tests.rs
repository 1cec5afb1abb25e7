//! Integration tests for the authorization flows
//!
//! Flows run through a session guard with a scripted transport and a scripted
//! redirect capture, so every token endpoint call can be inspected.

mod common;

use common::{
    ScriptedCapture, ScriptedTransport, ok_json, query_param, redirect_uri, test_provider,
    token_json,
};
use minim_auth::transport::{HttpResponse, Method};
use minim_auth::{
    AuthError, ClientConfig, CredentialStore, FlowDescriptor, FlowKind, PkceChallenge, Provider,
    StoredCredentialRecord, TokenSessionGuard, TokenSet,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use url::Url;

fn guard(
    provider: Provider,
    flow: FlowDescriptor,
    secret: Option<&str>,
    transport: Arc<ScriptedTransport>,
    capture: Arc<ScriptedCapture>,
) -> TokenSessionGuard {
    let builder = ClientConfig::builder()
        .provider(provider)
        .flow(flow)
        .client_id("client")
        .transport(transport)
        .capture(capture)
        .persist(false);
    let config = match secret {
        Some(secret) => builder.client_secret(secret).build(),
        None => builder.build(),
    };
    TokenSessionGuard::new(&config).unwrap()
}

fn pending() -> HttpResponse {
    HttpResponse::new(400, r#"{"error":"authorization_pending"}"#)
}

// ============================================================================
// Authorization code with PKCE
// ============================================================================

#[tokio::test]
async fn test_pkce_exchanges_code_with_matching_verifier() {
    let transport = ScriptedTransport::new([token_json("access")]);
    let capture = ScriptedCapture::approving("the-code");
    let mut guard = guard(
        test_provider(),
        FlowDescriptor::pkce(redirect_uri(), ["user-read-private", "playlist-read-private"]),
        None,
        transport.clone(),
        capture.clone(),
    );

    guard.authorize().await.unwrap();
    assert_eq!(guard.token().unwrap().access_token, "access");

    let urls = capture.authorization_urls();
    assert_eq!(urls.len(), 1);
    let url = &urls[0];
    assert_eq!(query_param(url, "response_type").as_deref(), Some("code"));
    assert_eq!(query_param(url, "code_challenge_method").as_deref(), Some("S256"));
    assert_eq!(
        query_param(url, "scope").as_deref(),
        Some("playlist-read-private user-read-private")
    );
    assert!(url.query().unwrap().contains("scope=playlist-read-private%20user-read-private"));

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    let exchange = &requests[0];
    assert_eq!(exchange.form("grant_type"), Some("authorization_code"));
    assert_eq!(exchange.form("code"), Some("the-code"));
    assert_eq!(exchange.form("client_id"), Some("client"));
    assert_eq!(exchange.authorization(), None);

    let verifier = exchange.form("code_verifier").unwrap();
    assert_eq!(
        PkceChallenge::from_verifier(verifier).challenge,
        query_param(url, "code_challenge").unwrap()
    );
}

#[tokio::test]
async fn test_pkce_verifier_is_fresh_per_acquisition() {
    let transport = ScriptedTransport::new([token_json("one"), token_json("two")]);
    let mut guard = guard(
        test_provider(),
        FlowDescriptor::pkce(redirect_uri(), ["user-read-private"]),
        None,
        transport.clone(),
        ScriptedCapture::approving("code"),
    );

    guard.authorize().await.unwrap();
    guard.authorize().await.unwrap();

    let requests = transport.requests();
    let first = requests[0].form("code_verifier").unwrap();
    let second = requests[1].form("code_verifier").unwrap();
    assert_ne!(first, second);
    assert_eq!(first.len(), 86);
}

#[tokio::test]
async fn test_denied_redirect_never_reaches_token_endpoint() {
    let transport = ScriptedTransport::new([token_json("never")]);
    let capture = ScriptedCapture::fixed(&[("error", "access_denied")]);
    let mut guard = guard(
        test_provider(),
        FlowDescriptor::pkce(redirect_uri(), ["user-read-private"]),
        None,
        transport.clone(),
        capture,
    );

    let err = guard.authorize().await.unwrap_err();
    assert!(matches!(err, AuthError::AuthorizationDenied(_)));
    assert!(transport.requests().is_empty());
    assert!(guard.token().is_none());
}

#[tokio::test]
async fn test_state_mismatch_is_rejected() {
    let transport = ScriptedTransport::new([token_json("never")]);
    let capture = ScriptedCapture::fixed(&[("code", "c"), ("state", "forged")]);
    let mut guard = guard(
        test_provider(),
        FlowDescriptor::pkce(redirect_uri(), ["user-read-private"]),
        None,
        transport.clone(),
        capture,
    );

    let err = guard.authorize().await.unwrap_err();
    assert!(matches!(err, AuthError::CaptureFailed(_)));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_authorization_code_uses_basic_auth() {
    let transport = ScriptedTransport::new([token_json("access")]);
    let mut guard = guard(
        test_provider(),
        FlowDescriptor::authorization_code(redirect_uri(), ["user-read-email"]),
        Some("secret"),
        transport.clone(),
        ScriptedCapture::approving("code"),
    );

    guard.authorize().await.unwrap();
    let exchange = &transport.requests()[0];
    // base64("client:secret")
    assert_eq!(exchange.authorization(), Some("Basic Y2xpZW50OnNlY3JldA=="));
    assert_eq!(exchange.form("code_verifier"), None);
    assert_eq!(exchange.form("redirect_uri"), Some("http://127.0.0.1:8888/callback"));
}

#[tokio::test]
async fn test_user_bound_token_is_stored_under_profile_id() {
    let dir = TempDir::new().unwrap();
    let store = CredentialStore::with_path(dir.path().join("credentials.json"));
    let transport = ScriptedTransport::new([token_json("access"), ok_json(r#"{"id":"alice"}"#)]);
    let config = ClientConfig::builder()
        .provider(test_provider())
        .flow(FlowDescriptor::pkce(redirect_uri(), ["user-read-private"]))
        .client_id("client")
        .store(store.clone())
        .transport(transport.clone())
        .capture(ScriptedCapture::approving("code"))
        .build();
    let mut guard = TokenSessionGuard::new(&config).unwrap();

    guard.authorize().await.unwrap();
    assert_eq!(guard.user_identifier(), Some("alice"));
    assert_eq!(transport.requests()[1].authorization(), Some("Bearer access"));

    let record = store
        .load("test", "client", FlowKind::AuthorizationCodePkce, None)
        .unwrap()
        .unwrap();
    assert_eq!(record.user_identifier.as_deref(), Some("alice"));
    assert_eq!(record.token.access_token, "access");
    assert_eq!(record.redirect_uri.as_deref(), Some("http://127.0.0.1:8888/callback"));
}

// ============================================================================
// Client credentials
// ============================================================================

#[tokio::test]
async fn test_client_credentials_request() {
    let transport = ScriptedTransport::new([ok_json(
        r#"{"access_token":"cc","token_type":"Bearer","expires_in":3600}"#,
    )]);
    let mut guard = guard(
        test_provider(),
        FlowDescriptor::client_credentials(["catalog.read"]),
        Some("secret"),
        transport.clone(),
        ScriptedCapture::fixed(&[]),
    );

    guard.authorize().await.unwrap();
    let request = &transport.requests()[0];
    assert_eq!(request.request.method, Method::POST);
    assert_eq!(request.form("grant_type"), Some("client_credentials"));
    assert_eq!(request.form("scope"), Some("catalog.read"));
    assert!(request.authorization().unwrap().starts_with("Basic "));
    assert!(guard.granted_scopes().contains("catalog.read"));
}

#[tokio::test]
async fn test_token_endpoint_error_carries_provider_message() {
    let transport = ScriptedTransport::new([HttpResponse::new(
        400,
        r#"{"error":"invalid_client","error_description":"Invalid client secret"}"#,
    )]);
    let mut guard = guard(
        test_provider(),
        FlowDescriptor::client_credentials(Vec::<String>::new()),
        Some("wrong"),
        transport,
        ScriptedCapture::fixed(&[]),
    );

    let err = guard.authorize().await.unwrap_err();
    assert_eq!(err.to_string(), "HTTP 400: Invalid client secret");
}

// ============================================================================
// Device code
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_device_code_polls_every_two_seconds_until_approved() {
    let transport = ScriptedTransport::new([
        ok_json(
            r#"{"deviceCode":"dc","userCode":"ABCDE","verificationUri":"link.test",
                "verificationUriComplete":"link.test/ABCDE","expiresIn":300}"#,
        ),
        pending(),
        pending(),
        pending(),
        token_json("device-access"),
    ]);
    let mut guard = guard(
        test_provider(),
        FlowDescriptor::device_code(["r_usr", "w_usr"]),
        None,
        transport.clone(),
        ScriptedCapture::fixed(&[]),
    );

    guard.authorize().await.unwrap();
    assert_eq!(guard.token().unwrap().access_token, "device-access");

    let requests = transport.requests();
    assert_eq!(requests.len(), 5);
    assert_eq!(requests[0].path(), "/device");
    assert_eq!(requests[0].form("scope"), Some("r_usr w_usr"));

    for pair in requests.windows(2) {
        let gap = pair[1].at - pair[0].at;
        assert!(
            gap >= Duration::from_secs(2) && gap < Duration::from_millis(2010),
            "expected ~2s between polls, got {gap:?}"
        );
    }
    for poll in &requests[1..] {
        assert_eq!(
            poll.form("grant_type"),
            Some("urn:ietf:params:oauth:grant-type:device_code")
        );
        assert_eq!(poll.form("device_code"), Some("dc"));
    }
}

#[tokio::test(start_paused = true)]
async fn test_device_code_slow_down_backs_off() {
    let transport = ScriptedTransport::new([
        ok_json(r#"{"device_code":"dc","user_code":"U","verification_uri":"https://link.test","expires_in":300,"interval":1}"#),
        HttpResponse::new(400, r#"{"error":"slow_down"}"#),
        token_json("device-access"),
    ]);
    let mut guard = guard(
        test_provider(),
        FlowDescriptor::device_code(Vec::<String>::new()),
        None,
        transport.clone(),
        ScriptedCapture::fixed(&[]),
    );

    guard.authorize().await.unwrap();
    let requests = transport.requests();
    let gap = requests[2].at - requests[1].at;
    assert!(gap >= Duration::from_secs(6) && gap < Duration::from_millis(6010));
}

#[tokio::test(start_paused = true)]
async fn test_device_code_denied_and_unknown_errors() {
    let device = || ok_json(r#"{"device_code":"dc","verification_uri":"https://link.test","expires_in":300}"#);

    let transport = ScriptedTransport::new([
        device(),
        HttpResponse::new(
            400,
            r#"{"error":"access_denied","error_description":"User declined"}"#,
        ),
    ]);
    let mut denied = guard(
        test_provider(),
        FlowDescriptor::device_code(Vec::<String>::new()),
        None,
        transport,
        ScriptedCapture::fixed(&[]),
    );
    assert!(matches!(
        denied.authorize().await.unwrap_err(),
        AuthError::AuthorizationDenied(ref reason) if reason == "access_denied: User declined"
    ));

    let transport = ScriptedTransport::new([
        device(),
        HttpResponse::new(400, r#"{"error":"invalid_grant","error_description":"Device code unknown"}"#),
        pending(),
    ]);
    let mut failed = guard(
        test_provider(),
        FlowDescriptor::device_code(Vec::<String>::new()),
        None,
        transport.clone(),
        ScriptedCapture::fixed(&[]),
    );
    let err = failed.authorize().await.unwrap_err();
    assert!(matches!(err, AuthError::Transport { status: 400, .. }));
    assert_eq!(transport.remaining(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_device_code_expires() {
    let mut responses = vec![ok_json(
        r#"{"device_code":"dc","verification_uri":"https://link.test","expires_in":5}"#,
    )];
    responses.extend((0..10).map(|_| pending()));
    let transport = ScriptedTransport::new(responses);
    let mut guard = guard(
        test_provider(),
        FlowDescriptor::device_code(Vec::<String>::new()),
        None,
        transport,
        ScriptedCapture::fixed(&[]),
    );

    let err = guard.authorize().await.unwrap_err();
    assert!(matches!(err, AuthError::CaptureTimeout(d) if d == Duration::from_secs(5)));
}

// ============================================================================
// OAuth 1.0a
// ============================================================================

fn discogs_test_provider() -> Provider {
    Provider::builder()
        .name("discogs")
        .authorization_url("https://www.discogs.test/oauth/authorize")
        .request_token_url("https://api.discogs.test/oauth/request_token")
        .access_token_url("https://api.discogs.test/oauth/access_token")
        .api_base_url("https://api.discogs.test")
        .supported_flows(vec![
            FlowKind::OAuth1ThreeLegged,
            FlowKind::OAuth1TwoLegged,
            FlowKind::NoAuth,
        ])
        .build()
}

#[tokio::test]
async fn test_oauth1_three_legged_exchange() {
    let transport = ScriptedTransport::new([
        HttpResponse::new(200, "oauth_token=rt&oauth_token_secret=rts&oauth_callback_confirmed=true"),
        HttpResponse::new(200, "oauth_token=at&oauth_token_secret=ats"),
        ok_json(r#"{"id":1}"#),
    ]);
    let capture = ScriptedCapture::fixed(&[("oauth_token", "rt"), ("oauth_verifier", "v123")]);
    let callback = Url::parse("http://localhost:8888/discogs").unwrap();
    let mut guard = guard(
        discogs_test_provider(),
        FlowDescriptor::OAuth1ThreeLegged {
            callback_uri: Some(callback),
        },
        Some("consumer-secret"),
        transport.clone(),
        capture.clone(),
    );

    guard.authorize().await.unwrap();
    let token = guard.token().unwrap();
    assert_eq!(token.access_token, "at");
    assert_eq!(token.token_secret.as_deref(), Some("ats"));

    assert_eq!(
        query_param(&capture.authorization_urls()[0], "oauth_token").as_deref(),
        Some("rt")
    );

    let requests = transport.requests();
    assert_eq!(requests[0].request.method, Method::GET);
    let request_header = requests[0].authorization().unwrap();
    assert!(request_header.starts_with("OAuth "));
    assert!(request_header.contains(r#"oauth_signature="consumer-secret%26""#));
    assert!(request_header.contains("oauth_callback="));

    assert_eq!(requests[1].request.method, Method::POST);
    let access_header = requests[1].authorization().unwrap();
    assert!(access_header.contains(r#"oauth_signature="consumer-secret%26rts""#));
    assert!(access_header.contains(r#"oauth_verifier="v123""#));

    let url = Url::parse("https://api.discogs.test/oauth/identity").unwrap();
    guard.send(Method::GET, url, None).await.unwrap();
    let resource_header = transport.requests()[2].authorization().unwrap().to_string();
    assert!(resource_header.contains(r#"oauth_token="at""#));
    assert!(resource_header.contains(r#"oauth_signature="consumer-secret%26ats""#));
}

#[tokio::test]
async fn test_oauth1_denied_verifier() {
    let transport = ScriptedTransport::new([
        HttpResponse::new(200, "oauth_token=rt&oauth_token_secret=rts"),
    ]);
    let mut guard = guard(
        discogs_test_provider(),
        FlowDescriptor::OAuth1ThreeLegged { callback_uri: None },
        Some("consumer-secret"),
        transport.clone(),
        ScriptedCapture::fixed(&[("denied", "rt")]),
    );

    let err = guard.authorize().await.unwrap_err();
    assert!(matches!(err, AuthError::AuthorizationDenied(_)));
    assert_eq!(transport.requests().len(), 1);
}

#[tokio::test]
async fn test_two_legged_and_anonymous_requests() {
    let transport = ScriptedTransport::new([ok_json("{}"), ok_json("{}")]);
    let mut guard = guard(
        discogs_test_provider(),
        FlowDescriptor::OAuth1TwoLegged,
        Some("consumer-secret"),
        transport.clone(),
        ScriptedCapture::fixed(&[]),
    );
    let url = Url::parse("https://api.discogs.test/database/search?q=nirvana").unwrap();
    guard.send(Method::GET, url.clone(), None).await.unwrap();
    assert_eq!(
        transport.requests()[0].authorization(),
        Some("Discogs key=client, secret=consumer-secret")
    );

    guard.set_flow(FlowDescriptor::NoAuth).unwrap();
    guard.send(Method::GET, url, None).await.unwrap();
    assert_eq!(transport.requests()[1].authorization(), None);
}

#[tokio::test]
async fn test_set_flow_rejects_unsupported_flow() {
    let mut guard = guard(
        discogs_test_provider(),
        FlowDescriptor::NoAuth,
        None,
        ScriptedTransport::new([]),
        ScriptedCapture::fixed(&[]),
    );
    let err = guard
        .set_flow(FlowDescriptor::client_credentials(Vec::<String>::new()))
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidConfig(_)));
    assert_eq!(guard.flow(), &FlowDescriptor::NoAuth);
}

#[tokio::test]
async fn test_set_flow_drops_token_and_runs_new_flow_on_next_send() {
    let transport = ScriptedTransport::new([token_json("app"), ok_json("{}")]);
    let mut guard = guard(
        test_provider(),
        FlowDescriptor::pkce(redirect_uri(), ["user-read-private"]),
        Some("secret"),
        transport.clone(),
        ScriptedCapture::approving("unused"),
    );
    guard.set_access_token(TokenSet::bearer("user-token"));

    guard
        .set_flow(FlowDescriptor::client_credentials(Vec::<String>::new()))
        .unwrap();
    assert!(guard.token().is_none());
    assert_eq!(guard.identity().flow, FlowKind::ClientCredentials);

    let url = Url::parse("https://api.test/v1/albums/1").unwrap();
    guard.send(Method::GET, url, None).await.unwrap();

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].path(), "/token");
    assert_eq!(requests[0].form("grant_type"), Some("client_credentials"));
    assert_eq!(requests[1].path(), "/v1/albums/1");
    assert_eq!(requests[1].authorization(), Some("Bearer app"));
}

#[tokio::test]
async fn test_set_flow_picks_up_stored_token_for_new_flow() {
    let dir = TempDir::new().unwrap();
    let store = CredentialStore::with_path(dir.path().join("credentials.json"));
    let mut record = StoredCredentialRecord::new(
        "test",
        FlowKind::ClientCredentials,
        "client",
        TokenSet::bearer("stored-app"),
    );
    record.client_secret = Some("stored-secret".to_string());
    store.save(&record).unwrap();

    let transport = ScriptedTransport::new([ok_json("{}")]);
    let config = ClientConfig::builder()
        .provider(test_provider())
        .flow(FlowDescriptor::pkce(redirect_uri(), ["user-read-private"]))
        .client_id("client")
        .store(store)
        .transport(transport.clone())
        .capture(ScriptedCapture::approving("unused"))
        .build();
    let mut guard = TokenSessionGuard::new(&config).unwrap();
    guard.set_access_token(TokenSet::bearer("user-token"));

    // No configured secret: the stored record supplies both token and secret
    guard
        .set_flow(FlowDescriptor::client_credentials(Vec::<String>::new()))
        .unwrap();
    assert_eq!(guard.token().unwrap().access_token, "stored-app");
    assert_eq!(guard.identity().client_secret.as_deref(), Some("stored-secret"));

    let url = Url::parse("https://api.test/v1/albums/1").unwrap();
    guard.send(Method::GET, url, None).await.unwrap();
    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].authorization(), Some("Bearer stored-app"));
}
