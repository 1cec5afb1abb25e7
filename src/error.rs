//! Error types for minim authorization and guarded requests

use std::time::Duration;
use thiserror::Error;

/// Main error type for token acquisition, redirect capture and guarded requests
#[derive(Error, Debug)]
pub enum AuthError {
    /// Client ID or secret required by the selected flow is absent
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// The user declined consent, or the redirect carried an error indicator
    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    /// Interactive redirect capture did not finish in time
    #[error("Redirect capture timed out after {0:?}")]
    CaptureTimeout(Duration),

    /// Interactive redirect capture failed (malformed redirect, state mismatch, ...)
    #[error("Redirect capture failed: {0}")]
    CaptureFailed(String),

    /// Non-2xx response from a token or resource endpoint
    #[error("HTTP {status}: {message}")]
    Transport {
        /// HTTP status code
        status: u16,
        /// Provider error message, or raw body text
        message: String,
    },

    /// Required authorization scopes are not granted
    #[error("{operation}() requires the '{}' scope(s)", .missing.join("', '"))]
    Scope {
        /// Operation that was guarded
        operation: String,
        /// Scopes that are missing from the granted set
        missing: Vec<String>,
    },

    /// A non-scope entitlement (e.g. subscription tier) is not satisfied
    #[error("{operation}() requires {requirement}")]
    Entitlement {
        /// Operation that was guarded
        operation: String,
        /// Human-readable requirement
        requirement: String,
    },

    /// 429 Too Many Requests, retried once by the session guard
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Delay requested before the next attempt
        retry_after: Duration,
    },

    /// Operation was cancelled through its cancellation token
    #[error("Operation cancelled")]
    Cancelled,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Response from a provider could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Network-level HTTP client error
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Result type alias for minim authorization operations
pub type Result<T> = std::result::Result<T, AuthError>;

impl AuthError {
    /// Create a missing credentials error
    pub fn missing_credentials(msg: impl Into<String>) -> Self {
        Self::MissingCredentials(msg.into())
    }

    /// Create an authorization denied error
    pub fn denied(msg: impl Into<String>) -> Self {
        Self::AuthorizationDenied(msg.into())
    }

    /// Create a capture failure
    pub fn capture_failed(msg: impl Into<String>) -> Self {
        Self::CaptureFailed(msg.into())
    }

    /// Create a transport error from a status code and message
    pub fn transport(status: u16, msg: impl Into<String>) -> Self {
        Self::Transport {
            status,
            message: msg.into(),
        }
    }

    /// Create a scope error
    pub fn scope(operation: impl Into<String>, missing: Vec<String>) -> Self {
        Self::Scope {
            operation: operation.into(),
            missing,
        }
    }

    /// Create an entitlement error
    pub fn entitlement(operation: impl Into<String>, requirement: impl Into<String>) -> Self {
        Self::Entitlement {
            operation: operation.into(),
            requirement: requirement.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create an invalid response error
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// HTTP status carried by this error, if any
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether a caller-level retry could plausibly succeed
    ///
    /// Rate limiting, network timeouts/connect failures, capture timeouts and
    /// 5xx responses are transient. Denials, missing credentials, scope and
    /// configuration errors are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::CaptureTimeout(_) => true,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Transport { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
