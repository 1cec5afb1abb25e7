//! Redirect capture
//!
//! Interactive flows send the user to an authorization page and need the
//! query parameters the provider appends to the redirect URI. How that
//! redirect is observed is pluggable:
//!
//! - [`ManualCapture`] prints the URL and reads the pasted redirect URL (or a
//!   bare verifier) from stdin
//! - [`LocalListenerCapture`] serves the loopback redirect URI itself
//! - [`BrowserCapture`] drives a browser through WebDriver and watches its
//!   location
//!
//! All of them report `error` / `denied` redirects as
//! [`AuthError::AuthorizationDenied`], give up with
//! [`AuthError::CaptureTimeout`] when the configured timeout elapses and with
//! [`AuthError::Cancelled`] when the cancellation token fires.

pub mod browser;
pub mod listener;
pub mod manual;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{AuthError, Result};

pub use browser::{BrowserCapture, BrowserLauncher, BrowserSession, WebDriverLauncher};
pub use listener::LocalListenerCapture;
pub use manual::ManualCapture;

/// Query parameters observed on the redirect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureResult {
    /// Decoded query parameters
    pub params: BTreeMap<String, String>,
    /// When the redirect was observed
    pub captured_at: SystemTime,
}

impl CaptureResult {
    /// Wrap already-decoded parameters
    #[must_use]
    pub fn from_params(params: BTreeMap<String, String>) -> Self {
        Self {
            params,
            captured_at: SystemTime::now(),
        }
    }

    /// Collect the query parameters of a redirect URL
    #[must_use]
    pub fn from_url(url: &Url) -> Self {
        Self::from_params(url.query_pairs().into_owned().collect())
    }

    /// Parse a raw query string (`a=1&b=2`)
    #[must_use]
    pub fn from_query(query: &str) -> Self {
        Self::from_params(
            url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
                .into_owned()
                .collect(),
        )
    }

    /// Look up a parameter
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Whether the provider reported an error or a denial
    #[must_use]
    pub fn is_denied(&self) -> bool {
        self.params.contains_key("error") || self.params.contains_key("denied")
    }

    /// Fail with `AuthorizationDenied` if the redirect carries `error` or `denied`
    ///
    /// # Errors
    /// Returns `AuthError::AuthorizationDenied` with the provider's reason.
    pub fn ensure_granted(self) -> Result<Self> {
        if let Some(error) = self.get("error") {
            let reason = match self.get("error_description") {
                Some(description) => format!("{error}: {description}"),
                None => error.to_string(),
            };
            return Err(AuthError::denied(reason));
        }
        if self.params.contains_key("denied") {
            return Err(AuthError::denied("the user denied access"));
        }
        Ok(self)
    }
}

/// One redirect capture, as requested by a flow
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    /// Page the user must visit
    pub authorization_url: Url,
    /// Redirect URI (or prefix of it) that ends the capture
    pub redirect_prefix: String,
    /// Give up after this long
    pub timeout: Option<Duration>,
    /// Open the authorization URL in the default browser instead of only printing it
    pub open_browser: bool,
    /// Aborts the capture
    pub cancel: CancellationToken,
}

impl CaptureRequest {
    /// Create a request without timeout that prints the URL
    #[must_use]
    pub fn new(authorization_url: Url, redirect_prefix: impl Into<String>) -> Self {
        Self {
            authorization_url,
            redirect_prefix: redirect_prefix.into(),
            timeout: None,
            open_browser: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Set the timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set whether the browser is opened
    #[must_use]
    pub fn open_browser(mut self, open_browser: bool) -> Self {
        self.open_browser = open_browser;
        self
    }

    /// Set the cancellation token
    #[must_use]
    pub fn cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Strategy for observing the authorization redirect
#[async_trait]
pub trait RedirectCapture: Send + Sync {
    /// Send the user to the authorization URL and wait for the redirect
    ///
    /// # Errors
    /// `AuthorizationDenied`, `CaptureTimeout`, `Cancelled`, `CaptureFailed`
    /// or an I/O error from the underlying channel.
    async fn capture(&self, request: CaptureRequest) -> Result<CaptureResult>;
}

/// Run `fut` under an optional timeout and a cancellation token
pub(crate) async fn bounded<F, T>(
    fut: F,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let timed = async {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| AuthError::CaptureTimeout(limit))?,
            None => fut.await,
        }
    };
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(AuthError::Cancelled),
        result = timed => result,
    }
}

/// Print the authorization URL, or open it in the default browser
pub(crate) fn present_url(url: &Url, open_browser: bool) {
    if open_browser {
        match open_in_browser(url.as_str()) {
            Ok(()) => {
                tracing::info!(%url, "opened authorization URL in browser");
                return;
            }
            Err(e) => tracing::debug!("Could not open browser: {e}"),
        }
    }
    println!(
        "To grant access to your account, open the following link in your web browser:\n\n{url}\n"
    );
}

/// Open URL in default browser
pub(crate) fn open_in_browser(url: &str) -> Result<()> {
    #[cfg(target_os = "macos")]
    let mut command = {
        let mut command = std::process::Command::new("open");
        command.arg(url);
        command
    };

    #[cfg(target_os = "windows")]
    let mut command = {
        let mut command = std::process::Command::new("cmd");
        command.args(["/C", "start", "", url]);
        command
    };

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let mut command = {
        let mut command = std::process::Command::new("xdg-open");
        command.arg(url);
        command
    };

    command.spawn()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_url_and_denied() {
        let url = Url::parse("http://127.0.0.1:8888/callback?error=access_denied&state=xyz").unwrap();
        let result = CaptureResult::from_url(&url);
        assert!(result.is_denied());
        assert_eq!(result.get("state"), Some("xyz"));
        assert!(matches!(
            result.ensure_granted(),
            Err(AuthError::AuthorizationDenied(reason)) if reason == "access_denied"
        ));
    }

    #[test]
    fn test_discogs_denied_marker() {
        let result = CaptureResult::from_query("?denied=abc123");
        assert!(matches!(
            result.ensure_granted(),
            Err(AuthError::AuthorizationDenied(_))
        ));
    }

    #[test]
    fn test_granted_passes_through() {
        let result = CaptureResult::from_query("code=abc&state=xyz");
        let result = result.ensure_granted().unwrap();
        assert_eq!(result.get("code"), Some("abc"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let cancel = CancellationToken::new();
        let result: Result<()> = bounded(
            std::future::pending(),
            Some(Duration::from_secs(30)),
            &cancel,
        )
        .await;
        assert!(matches!(result, Err(AuthError::CaptureTimeout(d)) if d == Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_bounded_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<()> = bounded(std::future::pending(), None, &cancel).await;
        assert!(matches!(result, Err(AuthError::Cancelled)));
    }
}
