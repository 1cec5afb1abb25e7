//! Loopback HTTP listener that receives the authorization redirect

use async_trait::async_trait;
use axum::Router;
use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use url::{Host, Url};

use super::{CaptureRequest, CaptureResult, RedirectCapture, bounded, present_url};
use crate::error::{AuthError, Result};

/// How long in-flight responses get to finish once the redirect is captured
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

type RedirectSender = Arc<StdMutex<Option<oneshot::Sender<BTreeMap<String, String>>>>>;

/// Capture by serving the loopback redirect URI
///
/// Only the redirect URI's path is routed; requests to any other path
/// (`/favicon.ico`, probes) get a 404, as does a request to the redirect
/// path without a query string. The server stops once the redirect has been
/// answered, or when the capture times out or is cancelled.
#[derive(Debug, Default)]
pub struct LocalListenerCapture {
    prebound: Mutex<Option<TcpListener>>,
}

impl LocalListenerCapture {
    /// Bind the redirect URI's host and port on each capture
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an already bound listener (e.g. an ephemeral port) for the next capture
    #[must_use]
    pub fn with_listener(listener: TcpListener) -> Self {
        Self {
            prebound: Mutex::new(Some(listener)),
        }
    }

    async fn listener_for(&self, redirect_uri: &Url) -> Result<TcpListener> {
        if let Some(listener) = self.prebound.lock().await.take() {
            return Ok(listener);
        }
        let addr = bind_address(redirect_uri)?;
        tracing::debug!(%addr, "binding redirect listener");
        Ok(TcpListener::bind(addr).await?)
    }
}

#[async_trait]
impl RedirectCapture for LocalListenerCapture {
    async fn capture(&self, request: CaptureRequest) -> Result<CaptureResult> {
        let redirect_uri = Url::parse(&request.redirect_prefix)?;
        let path = route_path(&redirect_uri)?;
        let listener = self.listener_for(&redirect_uri).await?;

        let mut server = RedirectServer::start(listener, &path);
        present_url(&request.authorization_url, request.open_browser);

        let result = bounded(server.wait(), request.timeout, &request.cancel).await;
        server.shutdown().await;
        tracing::debug!("redirect listener shut down");
        result?.ensure_granted()
    }
}

/// axum server answering the redirect path until one redirect arrives
struct RedirectServer {
    redirect: oneshot::Receiver<BTreeMap<String, String>>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl RedirectServer {
    fn start(listener: TcpListener, path: &str) -> Self {
        let (redirect_tx, redirect) = oneshot::channel();
        let sender: RedirectSender = Arc::new(StdMutex::new(Some(redirect_tx)));

        let app = Router::new().route(
            path,
            get(move |Query(params): Query<BTreeMap<String, String>>| {
                let sender = sender.clone();
                async move { answer_redirect(params, &sender) }
            }),
        );

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                tracing::error!("redirect listener error: {e}");
            }
        });

        Self {
            redirect,
            shutdown: Some(shutdown),
            handle,
        }
    }

    async fn wait(&mut self) -> Result<CaptureResult> {
        let params = (&mut self.redirect).await.map_err(|_| {
            AuthError::capture_failed("redirect listener stopped before the redirect arrived")
        })?;
        Ok(CaptureResult::from_params(params))
    }

    async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut self.handle).await {
            Ok(_) => {}
            Err(_) => {
                tracing::debug!("redirect listener still draining, aborting");
                self.handle.abort();
            }
        }
    }
}

fn answer_redirect(params: BTreeMap<String, String>, sender: &RedirectSender) -> Response {
    if params.is_empty() {
        return (StatusCode::NOT_FOUND, "Not Found").into_response();
    }
    let status = if params.contains_key("error") || params.contains_key("denied") {
        "denied"
    } else {
        "granted"
    };
    let page = Html(format!("Access {status}. You may close this page."));

    let Some(tx) = sender
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
    else {
        tracing::debug!("ignoring repeated redirect");
        return page.into_response();
    };
    let _ = tx.send(params);
    page.into_response()
}

/// Route path for the redirect URI
///
/// Rejects paths that the router would read as captures or wildcards.
fn route_path(redirect_uri: &Url) -> Result<String> {
    let path = redirect_uri.path();
    let reserved = path.contains(['{', '}'])
        || path
            .split('/')
            .any(|segment| segment.starts_with(':') || segment.starts_with('*'));
    if reserved {
        return Err(AuthError::invalid_config(format!(
            "redirect URI path '{path}' cannot be served by the local listener"
        )));
    }
    Ok(path.to_string())
}

/// Socket address for a loopback redirect URI
fn bind_address(redirect_uri: &Url) -> Result<SocketAddr> {
    let port = redirect_uri.port_or_known_default().ok_or_else(|| {
        AuthError::invalid_config(format!("redirect URI '{redirect_uri}' has no port"))
    })?;
    match redirect_uri.host() {
        Some(Host::Ipv4(ip)) => Ok(SocketAddr::from((ip, port))),
        Some(Host::Ipv6(ip)) => Ok(SocketAddr::from((ip, port))),
        Some(Host::Domain("localhost")) => Ok(SocketAddr::from((Ipv4Addr::LOCALHOST, port))),
        _ => Err(AuthError::invalid_config(format!(
            "redirect URI '{redirect_uri}' does not point to a loopback address"
        ))),
    }
}
