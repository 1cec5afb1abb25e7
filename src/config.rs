//! Client configuration

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use typed_builder::TypedBuilder;

use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::capture::RedirectCapture;
use crate::provider::Provider;
use crate::store::CredentialStore;
use crate::transport::HttpTransport;
use crate::types::{FlowDescriptor, TokenSet};

/// Default upper bound on interactive waits (redirect capture, device approval)
pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(300);

/// Lifetime classes for cached responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTtl {
    /// Content that practically never changes (genres, markets)
    Static,
    /// Catalog metadata (albums, artists, tracks)
    Catalog,
    /// Content refreshed once a day (charts, editorial)
    Daily,
    /// Popularity-sensitive listings (top tracks, new releases)
    Popularity,
    /// Search results
    Search,
    /// The current user's profile and library
    User,
    /// Playback state
    Playback,
    /// Custom lifetime
    Custom(Duration),
}

impl CacheTtl {
    /// Lifetime of an entry in this class
    #[must_use]
    pub fn duration(self) -> Duration {
        match self {
            Self::Static | Self::Daily => Duration::from_secs(86_400),
            Self::Catalog => Duration::from_secs(6 * 3_600),
            Self::Popularity => Duration::from_secs(3_600),
            Self::Search => Duration::from_secs(600),
            Self::User => Duration::from_secs(300),
            Self::Playback => Duration::from_secs(10),
            Self::Custom(ttl) => ttl,
        }
    }
}

/// Configuration for a [`TokenSessionGuard`](crate::TokenSessionGuard) and [`ApiClient`](crate::ApiClient)
///
/// Only the provider and the flow are required. Client credentials fall back
/// to the provider's environment variables, then to the credential store.
///
/// # Example
///
/// ```no_run
/// use minim_auth::{ClientConfig, FlowDescriptor, Provider};
/// use url::Url;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ClientConfig::builder()
///     .provider(Provider::spotify())
///     .flow(FlowDescriptor::pkce(
///         Url::parse("http://127.0.0.1:8888/callback")?,
///         ["user-read-private", "user-read-playback-state"],
///     ))
///     .client_id("your-client-id")
///     .open_browser(true)
///     .build();
/// # Ok(())
/// # }
/// ```
#[allow(clippy::struct_excessive_bools)]
#[derive(Clone, TypedBuilder)]
#[builder(
    builder_method(doc = "Create a new builder for ClientConfig"),
    builder_type(doc = "Builder for ClientConfig", vis = "pub"),
    build_method(doc = "Build the ClientConfig")
)]
pub struct ClientConfig {
    /// Provider endpoints
    pub provider: Provider,

    /// Authorization flow
    pub flow: FlowDescriptor,

    /// Client ID or consumer key
    #[builder(default, setter(strip_option, into))]
    pub client_id: Option<String>,

    /// Client secret or consumer secret
    #[builder(default, setter(strip_option, into))]
    pub client_secret: Option<String>,

    /// Explicit token set; takes precedence over stored credentials and flows
    #[builder(default, setter(strip_option))]
    pub access_token: Option<TokenSet>,

    /// Credential store; the platform default is used when unset
    #[builder(default, setter(strip_option))]
    pub store: Option<CredentialStore>,

    /// Read and write the credential store
    #[builder(default = true)]
    pub persist: bool,

    /// Account to use; prefix with `~` to force re-authorization
    #[builder(default, setter(strip_option, into))]
    pub user_identifier: Option<String>,

    /// Redirect capture; chosen from the redirect URI when unset
    #[builder(default, setter(strip_option))]
    pub capture: Option<Arc<dyn RedirectCapture>>,

    /// HTTP transport; reqwest when unset
    #[builder(default, setter(strip_option))]
    pub transport: Option<Arc<dyn HttpTransport>>,

    /// Open authorization pages in the default browser
    #[builder(default)]
    pub open_browser: bool,

    /// Upper bound on interactive waits, `None` to wait indefinitely
    #[builder(default = Some(DEFAULT_CAPTURE_TIMEOUT))]
    pub capture_timeout: Option<Duration>,

    /// Cancels interactive waits and rate-limit backoff
    #[builder(default)]
    pub cancel: CancellationToken,

    /// Cache GET responses made through the cached helpers
    #[builder(default = true)]
    pub cache: bool,

    /// Maximum number of cached responses
    #[builder(default = DEFAULT_CACHE_CAPACITY)]
    pub cache_capacity: u64,
}

#[allow(clippy::missing_fields_in_debug)]
impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("provider", &self.provider.name)
            .field("flow", &self.flow)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "<redacted>"),
            )
            .field("store", &self.store)
            .field("persist", &self.persist)
            .field("user_identifier", &self.user_identifier)
            .field("capture", &self.capture.as_ref().map(|_| "<capture>"))
            .field("transport", &self.transport.as_ref().map(|_| "<transport>"))
            .field("open_browser", &self.open_browser)
            .field("capture_timeout", &self.capture_timeout)
            .field("cache", &self.cache)
            .field("cache_capacity", &self.cache_capacity)
            .finish()
    }
}
