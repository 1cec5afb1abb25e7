//! Scripted browser capture over the W3C WebDriver protocol
//!
//! [`BrowserCapture`] opens the authorization URL in an automated browser and
//! polls its location every 100 ms until the browser lands on the redirect
//! URI. This works for redirect URIs nobody is listening on, including
//! non-loopback hosts. [`WebDriverLauncher`] speaks to any WebDriver server
//! (`geckodriver`, `chromedriver`) that is already running.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::{CaptureRequest, CaptureResult, RedirectCapture, bounded};
use crate::error::{AuthError, Result};
use crate::transport::{HttpRequest, HttpTransport, Method, RequestBody, ReqwestTransport};

/// Default interval between location polls
pub const DEFAULT_LOCATION_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Starts automated browser sessions
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Start a new session
    async fn launch(&self) -> Result<Box<dyn BrowserSession>>;
}

/// One automated browser session
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Load `url` in the current tab
    async fn navigate(&self, url: &Url) -> Result<()>;

    /// Current location of the tab
    async fn current_url(&self) -> Result<String>;

    /// End the session and close the browser
    async fn close(&self) -> Result<()>;
}

/// Capture by watching an automated browser's location
#[derive(Clone)]
pub struct BrowserCapture {
    launcher: Arc<dyn BrowserLauncher>,
    poll_interval: Duration,
}

impl BrowserCapture {
    /// Capture through `launcher`, polling every 100 ms
    pub fn new(launcher: impl BrowserLauncher + 'static) -> Self {
        Self {
            launcher: Arc::new(launcher),
            poll_interval: DEFAULT_LOCATION_POLL_INTERVAL,
        }
    }

    /// Override the location poll interval
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn watch(&self, session: &dyn BrowserSession, request: &CaptureRequest) -> Result<String> {
        session.navigate(&request.authorization_url).await?;
        loop {
            let location = session.current_url().await?;
            if location.starts_with(&request.redirect_prefix) {
                return Ok(location);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

impl std::fmt::Debug for BrowserCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserCapture")
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RedirectCapture for BrowserCapture {
    async fn capture(&self, request: CaptureRequest) -> Result<CaptureResult> {
        let session = self.launcher.launch().await?;
        tracing::info!(url = %request.authorization_url, "opened authorization URL in automated browser");

        let outcome = bounded(
            self.watch(session.as_ref(), &request),
            request.timeout,
            &request.cancel,
        )
        .await;
        if let Err(e) = session.close().await {
            tracing::warn!("Failed to close browser session: {e}");
        }

        let location = outcome?;
        CaptureResult::from_url(&Url::parse(&location)?).ensure_granted()
    }
}

/// [`BrowserLauncher`] for a running W3C WebDriver server
///
/// Commands go through an [`HttpTransport`], [`ReqwestTransport`] unless
/// another one is supplied.
#[derive(Clone)]
pub struct WebDriverLauncher {
    endpoint: Url,
    capabilities: Value,
    transport: Arc<dyn HttpTransport>,
}

impl WebDriverLauncher {
    /// Connect to the WebDriver server at `endpoint` (e.g. `http://localhost:4444`)
    #[must_use]
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            capabilities: json!({ "browserName": "firefox" }),
            transport: Arc::new(ReqwestTransport::new()),
        }
    }

    /// Replace the requested `alwaysMatch` capabilities
    #[must_use]
    pub fn capabilities(mut self, capabilities: Value) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Send WebDriver commands through `transport`
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = transport;
        self
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(Url::parse(&format!(
            "{}/{path}",
            self.endpoint.as_str().trim_end_matches('/')
        ))?)
    }
}

impl std::fmt::Debug for WebDriverLauncher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebDriverLauncher")
            .field("endpoint", &self.endpoint.as_str())
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        let body = json!({ "capabilities": { "alwaysMatch": self.capabilities } });
        let value = webdriver_call(
            self.transport.as_ref(),
            Method::POST,
            self.url("session")?,
            Some(body),
        )
        .await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| AuthError::invalid_response("WebDriver session has no sessionId"))?;
        tracing::debug!(session_id, "started WebDriver session");

        Ok(Box::new(WebDriverSession {
            base: self.url(&format!("session/{session_id}"))?,
            transport: Arc::clone(&self.transport),
        }))
    }
}

struct WebDriverSession {
    base: Url,
    transport: Arc<dyn HttpTransport>,
}

impl WebDriverSession {
    fn url(&self, path: &str) -> Result<Url> {
        Ok(Url::parse(&format!("{}/{path}", self.base.as_str()))?)
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn navigate(&self, url: &Url) -> Result<()> {
        let body = json!({ "url": url.as_str() });
        webdriver_call(self.transport.as_ref(), Method::POST, self.url("url")?, Some(body)).await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        let value = webdriver_call(self.transport.as_ref(), Method::GET, self.url("url")?, None).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AuthError::invalid_response("WebDriver returned a non-string URL"))
    }

    async fn close(&self) -> Result<()> {
        webdriver_call(self.transport.as_ref(), Method::DELETE, self.base.clone(), None).await?;
        Ok(())
    }
}

/// Send a WebDriver command and unwrap its `value`
async fn webdriver_call(
    transport: &dyn HttpTransport,
    method: Method,
    url: Url,
    body: Option<Value>,
) -> Result<Value> {
    let request = HttpRequest::new(method, url).body(body.map(RequestBody::Json));
    let response = transport.execute(request).await?;
    let mut body: Value = response.json()?;
    let value = body.get_mut("value").map(Value::take).unwrap_or(Value::Null);
    if !response.is_success() {
        let message = value
            .get("message")
            .or_else(|| value.get("error"))
            .and_then(Value::as_str)
            .unwrap_or("unknown WebDriver error");
        return Err(AuthError::capture_failed(format!(
            "WebDriver command failed ({}): {message}",
            response.status
        )));
    }
    Ok(value)
}
