//! Device Authorization Flow (RFC 8628)

use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;

use super::{FlowContext, parse_token_response, post_token_form};
use crate::capture::{bounded, open_in_browser};
use crate::error::{AuthError, Result};
use crate::transport::HttpRequest;
use crate::types::token::OAuthErrorResponse;
use crate::types::{TokenSet, join_scopes};

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Extra delay requested by a `slow_down` response
const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

/// Device authorization response; TIDAL answers in camelCase
#[derive(Debug, Deserialize)]
struct DeviceAuthorization {
    #[serde(alias = "deviceCode")]
    device_code: String,
    #[serde(default, alias = "userCode")]
    user_code: Option<String>,
    #[serde(default, alias = "verificationUri")]
    verification_uri: Option<String>,
    #[serde(default, alias = "verificationUriComplete")]
    verification_uri_complete: Option<String>,
    #[serde(default, alias = "expiresIn")]
    expires_in: Option<u64>,
    #[serde(default)]
    interval: Option<u64>,
}

impl DeviceAuthorization {
    /// Verification link, with a scheme added if the provider left it out
    fn verification_link(&self) -> Option<String> {
        self.verification_uri_complete
            .as_deref()
            .or(self.verification_uri.as_deref())
            .map(|uri| {
                if uri.contains("://") {
                    uri.to_string()
                } else {
                    format!("https://{uri}")
                }
            })
    }
}

pub(super) async fn acquire(
    ctx: &FlowContext<'_>,
    scopes: &BTreeSet<String>,
    poll_interval: Duration,
) -> Result<TokenSet> {
    let mut fields = vec![("client_id".to_string(), ctx.identity.client_id.clone())];
    if !scopes.is_empty() {
        fields.push(("scope".to_string(), join_scopes(scopes)));
    }

    let request = HttpRequest::post(ctx.provider.device_authorization_endpoint()?)
        .header("Accept", "application/json")
        .form(fields.clone());
    let response = ctx.transport.execute(request).await?;
    if !response.is_success() {
        return Err(response.into_error());
    }
    let device: DeviceAuthorization = response.json().map_err(|e| {
        AuthError::invalid_response(format!("failed to parse device authorization response: {e}"))
    })?;

    present(ctx, &device);

    fields.push(("device_code".to_string(), device.device_code.clone()));
    fields.push(("grant_type".to_string(), DEVICE_CODE_GRANT.to_string()));
    let interval = device.interval.map_or(poll_interval, Duration::from_secs);
    let expires_in = device.expires_in.map(Duration::from_secs);

    bounded(
        poll(ctx, fields, scopes, interval, expires_in),
        expires_in,
        ctx.cancel,
    )
    .await
}

fn present(ctx: &FlowContext<'_>, device: &DeviceAuthorization) {
    let link = device.verification_link();
    if let Some(link) = link.as_deref().filter(|_| ctx.open_browser) {
        match open_in_browser(link) {
            Ok(()) => {
                tracing::info!(%link, "opened device verification page in browser");
                return;
            }
            Err(e) => tracing::debug!("Could not open browser: {e}"),
        }
    }
    match (link, device.user_code.as_deref()) {
        (Some(link), Some(code)) => println!(
            "To grant access to your account, open the following link in your web browser and confirm the code {code}:\n\n{link}\n"
        ),
        (Some(link), None) => println!(
            "To grant access to your account, open the following link in your web browser:\n\n{link}\n"
        ),
        (None, Some(code)) => println!("To grant access to your account, enter the code {code} on the provider's device page.\n"),
        (None, None) => tracing::warn!("device authorization response carries neither a verification URI nor a user code"),
    }
}

/// Poll the token endpoint until the user approves, denies or the code expires
async fn poll(
    ctx: &FlowContext<'_>,
    fields: Vec<(String, String)>,
    scopes: &BTreeSet<String>,
    mut interval: Duration,
    expires_in: Option<Duration>,
) -> Result<TokenSet> {
    loop {
        tokio::time::sleep(interval).await;

        let response = post_token_form(ctx, fields.clone()).await?;
        if response.is_success() {
            tracing::info!(provider = %ctx.provider.name, "device authorization approved");
            return parse_token_response(&response, scopes);
        }

        let body = response.json::<OAuthErrorResponse>().ok();
        match body.as_ref().map_or("", |body| body.error.as_str()) {
            "authorization_pending" => {
                tracing::debug!("device authorization pending");
            }
            "slow_down" => {
                interval += SLOW_DOWN_STEP;
                tracing::debug!(?interval, "device authorization asked to slow down");
            }
            "access_denied" => {
                let reason = body.map_or_else(|| "access_denied".to_string(), |body| body.message());
                return Err(AuthError::denied(reason));
            }
            "expired_token" => {
                return Err(AuthError::CaptureTimeout(expires_in.unwrap_or(interval)));
            }
            _ => return Err(response.into_error()),
        }
    }
}
