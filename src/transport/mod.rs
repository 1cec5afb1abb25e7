//! HTTP transport layer
//!
//! Flows and the session guard never talk to an HTTP client directly; they
//! build an [`HttpRequest`] and hand it to an [`HttpTransport`]. The default
//! implementation is [`ReqwestTransport`]. Tests substitute a scripted
//! transport so retry and refresh behavior can be observed request by request.

pub mod http;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use url::Url;

use crate::error::{AuthError, Result};
use crate::utils::{MAX_ERROR_BODY_BYTES, truncate_for_display};

pub use http::ReqwestTransport;
pub use reqwest::Method;

/// Body of an outgoing request
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// `application/x-www-form-urlencoded` fields
    Form(Vec<(String, String)>),
    /// JSON document
    Json(Value),
}

/// Outgoing HTTP request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute request URL
    pub url: Url,
    /// Extra headers, in insertion order
    pub headers: Vec<(String, String)>,
    /// Optional request body
    pub body: Option<RequestBody>,
}

impl HttpRequest {
    /// Create a request without headers or body
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    /// Create a GET request
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Create a POST request
    #[must_use]
    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    /// Add a header
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set a form body
    #[must_use]
    pub fn form<I, K, V>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.body = Some(RequestBody::Form(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ));
        self
    }

    /// Set an optional body
    #[must_use]
    pub fn body(mut self, body: Option<RequestBody>) -> Self {
        self.body = body;
        self
    }

    /// Look up a header value (case-insensitive)
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Look up a form field value
    #[must_use]
    pub fn form_value(&self, name: &str) -> Option<&str> {
        match &self.body {
            Some(RequestBody::Form(fields)) => fields
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }
}

/// Response to an [`HttpRequest`], fully buffered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers with lowercase names
    pub headers: Vec<(String, String)>,
    /// Response body text
    pub body: String,
}

impl HttpResponse {
    /// Create a response without headers
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    /// Whether the status is 2xx
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Look up a header value (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Parse the body as JSON
    ///
    /// # Errors
    /// Returns `AuthError::Json` if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Parse a form-encoded body (OAuth 1.0a token endpoints)
    #[must_use]
    pub fn form_pairs(&self) -> BTreeMap<String, String> {
        url::form_urlencoded::parse(self.body.trim().as_bytes())
            .into_owned()
            .collect()
    }

    /// Provider error message, or the raw body text truncated for display
    #[must_use]
    pub fn error_message(&self) -> String {
        provider_message(&self.body).unwrap_or_else(|| {
            let body = self.body.trim();
            if body.is_empty() {
                "no response body".to_string()
            } else {
                truncate_for_display(body, MAX_ERROR_BODY_BYTES)
            }
        })
    }

    /// Convert a non-2xx response into `AuthError::Transport`
    #[must_use]
    pub fn into_error(self) -> AuthError {
        AuthError::transport(self.status, self.error_message())
    }
}

/// Locations of human-readable error messages in provider error bodies
const MESSAGE_POINTERS: [&str; 6] = [
    "/error/message",     // Spotify
    "/errors/0/detail",   // TIDAL (JSON:API)
    "/userMessage",       // TIDAL (private API)
    "/error_description", // OAuth 2.0
    "/description",
    "/message", // Discogs
];

/// Extract the structured error message from a provider error body
#[must_use]
pub fn provider_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    MESSAGE_POINTERS
        .iter()
        .find_map(|pointer| value.pointer(pointer).and_then(Value::as_str))
        .or_else(|| value.get("error").and_then(Value::as_str))
        .map(str::to_string)
}

/// Transport trait for sending HTTP requests
///
/// Implementations must not interpret status codes; non-2xx responses are
/// returned as `Ok` so the session guard can decide what to retry.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send a request and buffer the full response
    ///
    /// # Errors
    /// Returns an error only for network-level failures.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}
