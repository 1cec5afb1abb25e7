//! Token session guard
//!
//! [`TokenSessionGuard`] owns the token set of one client and wraps every
//! outgoing request:
//!
//! 1. A token past its `expires_at` is refreshed (or re-acquired) exactly
//!    once before the request is dispatched. A missing token is acquired.
//! 2. The request carries the flow's `Authorization` header.
//! 3. A 401 while no expiry is tracked triggers one refresh and one retry.
//! 4. A 429 sleeps `Retry-After + 1` seconds (1 second without a usable
//!    header) and retries once.
//! 5. Any other non-2xx response, and the second 401/429, is returned as
//!    [`AuthError::Transport`].
//!
//! Every attempt runs inside a loop bounded by [`MAX_ATTEMPTS`]. Acquired and
//! refreshed tokens are written to the credential store when persistence is
//! enabled.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::auth::{self, FlowContext};
use crate::capture::{LocalListenerCapture, ManualCapture, RedirectCapture};
use crate::config::ClientConfig;
use crate::error::{AuthError, Result};
use crate::provider::{Provider, is_loopback};
use crate::store::{CredentialStore, FORCE_REAUTHORIZATION_PREFIX, StoredCredentialRecord};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Method, RequestBody, ReqwestTransport};
use crate::types::{ClientIdentity, FlowDescriptor, FlowKind, TokenSet};

/// Upper bound on attempts per request, the first included
pub const MAX_ATTEMPTS: usize = 2;

/// Added to the provider's `Retry-After`
pub const RATE_LIMIT_PADDING: Duration = Duration::from_secs(1);

/// Backoff when a 429 carries no usable `Retry-After`
pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(1);

/// Owns the token set of one client and guards its requests
pub struct TokenSessionGuard {
    identity: ClientIdentity,
    provider: Provider,
    flow: FlowDescriptor,
    token: Option<TokenSet>,
    user_identifier: Option<String>,
    store: Option<CredentialStore>,
    transport: Arc<dyn HttpTransport>,
    capture: Arc<dyn RedirectCapture>,
    explicit_capture: bool,
    open_browser: bool,
    capture_timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for TokenSessionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSessionGuard")
            .field("identity", &self.identity)
            .field("provider", &self.provider.name)
            .field("flow", &self.flow)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("user_identifier", &self.user_identifier)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl TokenSessionGuard {
    /// Build a guard from a configuration
    ///
    /// Resolves the client credentials (configuration, then the provider's
    /// environment variables, then the stored record) and the initial token:
    /// an explicit token wins over a stored one. No network call is made.
    ///
    /// # Errors
    /// `MissingCredentials` when no client ID is available for a flow that
    /// needs one, or the flow needs a secret that is absent and no explicit
    /// token was given. `InvalidConfig` when the provider does not support the
    /// flow or rejects its redirect URI.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let provider = config.provider.clone();
        let flow = config.flow.clone();
        let kind = flow.kind();
        validate_flow(&provider, &flow)?;

        let env = provider.credentials_from_env();
        let client_id = config
            .client_id
            .clone()
            .or_else(|| env.as_ref().map(|(id, _)| id.clone()));
        let client_secret = config
            .client_secret
            .clone()
            .or_else(|| env.and_then(|(_, secret)| secret));
        let client_id = match client_id {
            Some(id) => id,
            None if kind == FlowKind::NoAuth => String::new(),
            None => {
                return Err(AuthError::missing_credentials(format!(
                    "the {kind} requires a client ID for {}",
                    provider.name
                )));
            }
        };

        let store = if config.persist {
            match config.store.clone().map_or_else(CredentialStore::open_default, Ok) {
                Ok(store) => Some(store),
                Err(e) => {
                    tracing::warn!("Credential persistence disabled: {e}");
                    None
                }
            }
        } else {
            None
        };

        let mut identity = ClientIdentity::new(&provider.name, client_id, client_secret, kind);
        let mut user_identifier = config.user_identifier.clone();

        let token = match config.access_token.clone() {
            Some(token) => Some(token),
            None if kind.issues_tokens() => match load_record(store.as_ref(), &identity, user_identifier.as_deref()) {
                Some(record) => {
                    if identity.client_secret.is_none() {
                        identity.client_secret = record.client_secret;
                    }
                    if user_identifier.is_none() {
                        user_identifier = record.user_identifier;
                    }
                    tracing::debug!(provider = %provider.name, flow = %kind, "loaded stored credentials");
                    Some(record.token)
                }
                None => None,
            },
            None => None,
        };

        if kind.requires_client_secret() && identity.client_secret.is_none() && token.is_none() {
            return Err(AuthError::missing_credentials(format!(
                "the {kind} requires a client secret for {}",
                provider.name
            )));
        }

        let (capture, explicit_capture) = match &config.capture {
            Some(capture) => (Arc::clone(capture), true),
            None => (default_capture(&flow), false),
        };
        let transport = config
            .transport
            .clone()
            .unwrap_or_else(|| Arc::new(ReqwestTransport::new()));

        Ok(Self {
            identity,
            provider,
            flow,
            token,
            user_identifier,
            store,
            transport,
            capture,
            explicit_capture,
            open_browser: config.open_browser,
            capture_timeout: config.capture_timeout,
            cancel: config.cancel.clone(),
        })
    }

    /// Client identity
    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    /// Provider endpoints
    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    /// Active flow
    pub fn flow(&self) -> &FlowDescriptor {
        &self.flow
    }

    /// Current token set, if any
    pub fn token(&self) -> Option<&TokenSet> {
        self.token.as_ref()
    }

    /// User the current token belongs to, if known
    pub fn user_identifier(&self) -> Option<&str> {
        self.user_identifier.as_deref()
    }

    /// Scopes granted to the current token (empty without a token)
    pub fn granted_scopes(&self) -> BTreeSet<String> {
        self.token
            .as_ref()
            .map(|token| token.granted_scopes.clone())
            .unwrap_or_default()
    }

    /// Cancellation token shared with interactive waits and backoff
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Context handed to flow strategies
    pub fn flow_context(&self) -> FlowContext<'_> {
        FlowContext {
            identity: &self.identity,
            provider: &self.provider,
            transport: self.transport.as_ref(),
            capture: self.capture.as_ref(),
            open_browser: self.open_browser,
            capture_timeout: self.capture_timeout,
            cancel: &self.cancel,
        }
    }

    /// Make sure a usable token is held
    ///
    /// Acquires a token when none is held and refreshes an expired one. Flows
    /// that do not issue tokens return immediately.
    ///
    /// # Errors
    /// Any flow error.
    pub async fn ensure_token(&mut self) -> Result<()> {
        if !self.flow.kind().issues_tokens() {
            return Ok(());
        }
        match self.token.as_ref().map(TokenSet::is_expired) {
            None => self.authorize().await,
            Some(true) => {
                tracing::debug!(provider = %self.provider.name, "access token expired");
                self.refresh().await
            }
            Some(false) => Ok(()),
        }
    }

    /// Run the active flow and install the new token, discarding the current one
    ///
    /// # Errors
    /// Any flow error.
    pub async fn authorize(&mut self) -> Result<()> {
        let token = {
            let ctx = self.flow_context();
            auth::acquire(&ctx, &self.flow).await?
        };
        self.install(token).await;
        Ok(())
    }

    /// Refresh the current token, or acquire one when none is held
    ///
    /// # Errors
    /// Any flow error.
    pub async fn refresh(&mut self) -> Result<()> {
        let token = {
            let ctx = self.flow_context();
            match &self.token {
                Some(current) => auth::refresh(&ctx, &self.flow, current).await?,
                None => auth::acquire(&ctx, &self.flow).await?,
            }
        };
        self.install(token).await;
        Ok(())
    }

    /// Send a request under the guard
    ///
    /// # Errors
    /// `Transport` for non-2xx responses (including a second 401 or 429),
    /// `Cancelled` if cancelled during a rate-limit backoff, and any error of
    /// the flow when a token has to be acquired or refreshed.
    pub async fn send(
        &mut self,
        method: Method,
        url: Url,
        body: Option<RequestBody>,
    ) -> Result<HttpResponse> {
        self.ensure_token().await?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let request = self.authorize_request(
                HttpRequest::new(method.clone(), url.clone()).body(body.clone()),
            )?;
            let response = self.transport.execute(request).await?;
            if response.is_success() {
                return Ok(response);
            }

            let can_retry = attempt < MAX_ATTEMPTS;
            match response.status {
                401 if can_retry && self.refreshes_on_unauthorized() => {
                    tracing::warn!(%url, "401 without a tracked expiry, refreshing access token");
                    self.refresh().await?;
                }
                429 if can_retry => {
                    let retry_after = retry_delay(&response);
                    tracing::warn!(%url, "{}", AuthError::RateLimited { retry_after });
                    self.backoff(retry_after).await?;
                }
                _ => return Err(response.into_error()),
            }
        }
    }

    /// Switch to another flow
    ///
    /// The current token is dropped; a stored token for the new flow is
    /// picked up, otherwise the next request runs the new flow. On error the
    /// guard is left unchanged.
    ///
    /// # Errors
    /// `InvalidConfig` when the provider does not support the flow or rejects
    /// its redirect URI, and `MissingCredentials` when the flow needs a client
    /// ID or secret that neither the configuration nor a stored record
    /// provides.
    pub fn set_flow(&mut self, flow: FlowDescriptor) -> Result<()> {
        validate_flow(&self.provider, &flow)?;
        let kind = flow.kind();
        if kind != FlowKind::NoAuth && self.identity.client_id.is_empty() {
            return Err(AuthError::missing_credentials(format!(
                "the {kind} requires a client ID for {}",
                self.provider.name
            )));
        }

        let mut identity = self.identity.clone();
        identity.flow = kind;
        let mut user_identifier = self.user_identifier.clone();
        let record = if kind.issues_tokens() {
            load_record(self.store.as_ref(), &identity, user_identifier.as_deref())
        } else {
            None
        };
        let token = record.map(|record| {
            if identity.client_secret.is_none() {
                identity.client_secret = record.client_secret;
            }
            if user_identifier.is_none() {
                user_identifier = record.user_identifier;
            }
            record.token
        });

        if kind.requires_client_secret() && identity.client_secret.is_none() && token.is_none() {
            return Err(AuthError::missing_credentials(format!(
                "the {kind} requires a client secret for {}",
                self.provider.name
            )));
        }

        tracing::debug!(from = %self.flow.kind(), to = %kind, stored = token.is_some(), "switching authorization flow");
        if !self.explicit_capture {
            self.capture = default_capture(&flow);
        }
        self.identity = identity;
        self.user_identifier = user_identifier;
        self.flow = flow;
        self.token = token;
        Ok(())
    }

    /// Replace the token set, persisting it when persistence is enabled
    pub fn set_access_token(&mut self, token: TokenSet) {
        self.token = Some(token);
        self.persist();
    }

    /// Drop the current token and remove its stored record
    ///
    /// Returns whether a stored record was removed.
    ///
    /// # Errors
    /// I/O and JSON errors from the credential store.
    pub fn logout(&mut self) -> Result<bool> {
        self.token = None;
        match &self.store {
            Some(store) => store.remove(
                &self.provider.name,
                &self.identity.client_id,
                self.identity.flow,
                self.user_identifier.as_deref(),
            ),
            None => Ok(false),
        }
    }

    fn refreshes_on_unauthorized(&self) -> bool {
        self.flow.kind().issues_tokens()
            && self.token.as_ref().is_some_and(|token| token.expires_at.is_none())
    }

    fn authorize_request(&self, request: HttpRequest) -> Result<HttpRequest> {
        let header = auth::authorization_header(&self.identity, &self.flow, self.token.as_ref())?;
        Ok(match header {
            Some(value) => request.header("Authorization", value),
            None => request,
        })
    }

    async fn backoff(&self, delay: Duration) -> Result<()> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(AuthError::Cancelled),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }

    async fn install(&mut self, token: TokenSet) {
        self.token = Some(token);
        self.user_identifier = self
            .user_identifier
            .take()
            .map(|user| user.trim_start_matches(FORCE_REAUTHORIZATION_PREFIX).to_string())
            .filter(|user| !user.is_empty());

        if self.store.is_some() && self.user_identifier.is_none() && self.flow.kind().is_user_bound() {
            match self.fetch_user_identifier().await {
                Ok(user) => self.user_identifier = user,
                Err(e) => tracing::warn!("Could not resolve the user identifier: {e}"),
            }
        }
        self.persist();
    }

    /// One profile fetch, outside the retry loop
    async fn fetch_user_identifier(&self) -> Result<Option<String>> {
        let (Some(url), Some(pointer)) = (
            self.provider.profile_endpoint()?,
            self.provider.user_id_pointer.as_deref(),
        ) else {
            return Ok(None);
        };
        let request = self.authorize_request(HttpRequest::get(url))?;
        let response = self.transport.execute(request).await?;
        if !response.is_success() {
            return Err(response.into_error());
        }
        let profile: serde_json::Value = response.json()?;
        Ok(profile.pointer(pointer).and_then(|value| match value {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }))
    }

    fn persist(&self) {
        let (Some(store), Some(token)) = (&self.store, &self.token) else {
            return;
        };
        let mut record = StoredCredentialRecord::new(
            &self.provider.name,
            self.identity.flow,
            &self.identity.client_id,
            token.clone(),
        );
        record.client_secret = self.identity.client_secret.clone();
        record.redirect_uri = self.flow.redirect_uri().map(Url::to_string);
        record.user_identifier = self.user_identifier.clone();
        if let Err(e) = store.save(&record) {
            tracing::warn!("Failed to persist credentials: {e}");
        }
    }
}

/// Delay before retrying a 429
///
/// `Retry-After` seconds plus [`RATE_LIMIT_PADDING`] when the header is a
/// non-negative number, [`DEFAULT_RATE_LIMIT_DELAY`] otherwise.
#[must_use]
pub fn retry_delay(response: &HttpResponse) -> Duration {
    response
        .header("retry-after")
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map_or(DEFAULT_RATE_LIMIT_DELAY, |secs| {
            Duration::from_secs_f64(secs) + RATE_LIMIT_PADDING
        })
}

fn validate_flow(provider: &Provider, flow: &FlowDescriptor) -> Result<()> {
    let kind = flow.kind();
    if !provider.supports(kind) {
        return Err(AuthError::invalid_config(format!(
            "{} does not support the {kind}",
            provider.name
        )));
    }
    if let Some(redirect_uri) = flow.redirect_uri() {
        provider.validate_redirect_uri(redirect_uri)?;
    }
    Ok(())
}

/// Local listener for plaintext loopback redirects, manual paste otherwise
fn default_capture(flow: &FlowDescriptor) -> Arc<dyn RedirectCapture> {
    match flow.redirect_uri() {
        Some(uri) if uri.scheme() == "http" && is_loopback(uri) => {
            Arc::new(LocalListenerCapture::new())
        }
        _ => Arc::new(ManualCapture::new()),
    }
}

fn load_record(
    store: Option<&CredentialStore>,
    identity: &ClientIdentity,
    user_identifier: Option<&str>,
) -> Option<StoredCredentialRecord> {
    let store = store?;
    match store.load(
        &identity.provider,
        &identity.client_id,
        identity.flow,
        user_identifier,
    ) {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!(path = %store.path().display(), "Failed to read stored credentials: {e}");
            None
        }
    }
}
