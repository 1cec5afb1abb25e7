//! # minim-auth
//!
//! Token lifecycle management for the Spotify, TIDAL and Discogs APIs.
//! Async/await, strong typing, tokio-based.
//!
//! The crate acquires access credentials through several OAuth-like flows,
//! keeps them in a local credential store, refreshes them when they expire
//! and wraps every API request in a guard that retries once on 401 and 429.
//!
//! ## Quick Start
//!
//! ```no_run
//! use minim_auth::{ApiClient, ClientConfig, FlowDescriptor, Provider};
//! use url::Url;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .provider(Provider::spotify())
//!         .flow(FlowDescriptor::pkce(
//!             Url::parse("http://127.0.0.1:8888/callback")?,
//!             ["user-read-private"],
//!         ))
//!         .client_id("your-client-id")
//!         .open_browser(true)
//!         .build();
//!
//!     let mut client = ApiClient::new(config)?;
//!     let me = client.get_json("me").await?;
//!     println!("Logged in as {}", me["display_name"]);
//!     Ok(())
//! }
//! ```
//!
//! The first request runs the flow: the authorization page opens in the
//! browser, the local listener on `127.0.0.1:8888` receives the redirect and
//! the code is exchanged for a token set, which is stored for the next run.
//!
//! ## Flows
//!
//! | Flow | Descriptor | Providers |
//! |------|------------|-----------|
//! | Authorization code | [`FlowDescriptor::AuthorizationCode`] | Spotify |
//! | Authorization code + PKCE | [`FlowDescriptor::AuthorizationCodePkce`] | Spotify, TIDAL |
//! | Client credentials | [`FlowDescriptor::ClientCredentials`] | Spotify, TIDAL |
//! | Device code | [`FlowDescriptor::DeviceCode`] | TIDAL |
//! | OAuth 1.0a | [`FlowDescriptor::OAuth1ThreeLegged`] | Discogs |
//! | Consumer key/secret | [`FlowDescriptor::OAuth1TwoLegged`] | Discogs |
//! | None | [`FlowDescriptor::NoAuth`] | Discogs |
//!
//! ## Architecture
//!
//! - [`types`]: Client identity, flow descriptors and token sets
//! - [`provider`]: Endpoint sets and provider presets
//! - [`auth`]: One strategy per flow, plus refresh
//! - [`capture`]: Redirect capture (manual paste, local listener, WebDriver)
//! - [`store`]: File-backed credential store
//! - [`guard`]: Token session guard around every request
//! - [`scope`]: Scope and entitlement checks
//! - [`cache`]: Response cache with per-entry TTL
//! - [`client`]: JSON client combining the guard and the cache
//! - [`transport`]: HTTP transport seam and the reqwest implementation
//! - [`error`]: Error types and handling
//!
//! ## Logging
//!
//! This crate uses [`tracing`](https://crates.io/crates/tracing) for structured logging.
//! Tracing events are always emitted but are zero-cost when no subscriber is attached.
//! To see logs, attach a tracing subscriber in your application:
//!
//! ```rust,ignore
//! tracing_subscriber::fmt::init();
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T, AuthError>`](Result):
//!
//! ```no_run
//! # use minim_auth::{ApiClient, AuthError};
//! # async fn example(client: &mut ApiClient) {
//! match client.get_json("me/player").await {
//!     Ok(state) => println!("{state}"),
//!     Err(AuthError::AuthorizationDenied(reason)) => eprintln!("Access denied: {reason}"),
//!     Err(e) if e.is_retryable() => eprintln!("Try again later: {e}"),
//!     Err(e) => eprintln!("Error: {e}"),
//! }
//! # }
//! ```
//!
//! ## Security
//!
//! - **Fresh secrets** - PKCE verifiers, `state` values and OAuth 1.0a nonces come from the OS CSPRNG
//! - **Redacted debug output** - Client secrets and tokens never appear in `Debug` output
//! - **Restrictive permissions** - The credential file is written with mode 0600 on Unix
//! - **Bounded waits** - Redirect capture and device polling honor a timeout and a cancellation token
//!
//! ## Examples
//!
//! - `spotify_login.rs` - PKCE login with the local redirect listener
//! - `tidal_device_login.rs` - TIDAL device code login
//!
//! Run examples with:
//! ```bash
//! cargo run --example spotify_login
//! cargo run --example tidal_device_login
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod cache;
pub mod capture;
pub mod client;
pub mod config;
pub mod error;
pub mod guard;
pub mod provider;
pub mod scope;
pub mod store;
pub mod transport;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use auth::PkceChallenge;
pub use capture::{
    BrowserCapture, CaptureRequest, CaptureResult, LocalListenerCapture, ManualCapture,
    RedirectCapture, WebDriverLauncher,
};
pub use client::ApiClient;
pub use config::{CacheTtl, ClientConfig, ClientConfigBuilder};
pub use error::{AuthError, Result};
pub use guard::TokenSessionGuard;
pub use provider::{ClientAuthMethod, Provider};
pub use scope::{Entitlement, ScopeRequirement};
pub use store::{CredentialStore, StoredCredentialRecord};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport};
pub use types::{ClientIdentity, FlowDescriptor, FlowKind, TokenSet};

/// Version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
