//! Authorization flow kinds and descriptors

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use url::Url;

/// Default interval between device-code token polls
pub const DEFAULT_DEVICE_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Kind of authorization flow, without its parameters
///
/// Used as the storage tag of credential records and for capability checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    /// Authorization Code Flow
    #[serde(rename = "auth_code")]
    AuthorizationCode,
    /// Authorization Code Flow with PKCE
    #[serde(rename = "pkce")]
    AuthorizationCodePkce,
    /// Client Credentials Flow
    ClientCredentials,
    /// Device Authorization Flow
    DeviceCode,
    /// OAuth 1.0a three-legged flow
    #[serde(rename = "oauth1")]
    OAuth1ThreeLegged,
    /// OAuth 1.0a consumer key/secret only
    #[serde(rename = "oauth1_two_legged")]
    OAuth1TwoLegged,
    /// Anonymous access
    #[serde(rename = "none")]
    NoAuth,
}

impl FlowKind {
    /// Stable short tag used in account identifiers
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "auth_code",
            Self::AuthorizationCodePkce => "pkce",
            Self::ClientCredentials => "client_credentials",
            Self::DeviceCode => "device_code",
            Self::OAuth1ThreeLegged => "oauth1",
            Self::OAuth1TwoLegged => "oauth1_two_legged",
            Self::NoAuth => "none",
        }
    }

    /// Whether the flow needs a client secret
    #[must_use]
    pub fn requires_client_secret(&self) -> bool {
        matches!(
            self,
            Self::AuthorizationCode
                | Self::ClientCredentials
                | Self::OAuth1ThreeLegged
                | Self::OAuth1TwoLegged
        )
    }

    /// Whether the flow produces a token set that must be acquired and tracked
    #[must_use]
    pub fn issues_tokens(&self) -> bool {
        !matches!(self, Self::OAuth1TwoLegged | Self::NoAuth)
    }

    /// Whether tokens from this flow may carry a refresh token
    #[must_use]
    pub fn supports_refresh(&self) -> bool {
        matches!(
            self,
            Self::AuthorizationCode | Self::AuthorizationCodePkce | Self::DeviceCode
        )
    }

    /// Whether tokens from this flow belong to an end user
    ///
    /// User-bound records are keyed by a user identifier in the credential store.
    #[must_use]
    pub fn is_user_bound(&self) -> bool {
        matches!(
            self,
            Self::AuthorizationCode
                | Self::AuthorizationCodePkce
                | Self::DeviceCode
                | Self::OAuth1ThreeLegged
        )
    }
}

impl std::fmt::Display for FlowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::AuthorizationCode => "Authorization Code Flow",
            Self::AuthorizationCodePkce => {
                "Authorization Code Flow with Proof Key for Code Exchange (PKCE)"
            }
            Self::ClientCredentials => "Client Credentials Flow",
            Self::DeviceCode => "Device Authorization Flow",
            Self::OAuth1ThreeLegged => "OAuth 1.0a Flow",
            Self::OAuth1TwoLegged => "OAuth 1.0a Consumer Credentials",
            Self::NoAuth => "No Authorization",
        };
        f.write_str(name)
    }
}

/// Active authorization flow together with the parameters it needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowDescriptor {
    /// Authorization code grant with a confidential client
    AuthorizationCode {
        /// Registered redirect URI
        redirect_uri: Url,
        /// Scopes to request
        scopes: BTreeSet<String>,
    },
    /// Authorization code grant with PKCE
    AuthorizationCodePkce {
        /// Registered redirect URI
        redirect_uri: Url,
        /// Scopes to request
        scopes: BTreeSet<String>,
    },
    /// Client credentials grant
    ClientCredentials {
        /// Scopes to request
        scopes: BTreeSet<String>,
    },
    /// Device authorization grant
    DeviceCode {
        /// Scopes to request
        scopes: BTreeSet<String>,
        /// Interval between token polls, unless the provider asks for another
        poll_interval: Duration,
    },
    /// OAuth 1.0a request token / verifier / access token exchange
    OAuth1ThreeLegged {
        /// `oauth_callback` sent with the request token, `None` for out-of-band
        callback_uri: Option<Url>,
    },
    /// OAuth 1.0a consumer key and secret sent as a static header
    OAuth1TwoLegged,
    /// No authorization
    NoAuth,
}

impl FlowDescriptor {
    /// Authorization code flow
    pub fn authorization_code<I, S>(redirect_uri: Url, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AuthorizationCode {
            redirect_uri,
            scopes: collect_scopes(scopes),
        }
    }

    /// Authorization code flow with PKCE
    pub fn pkce<I, S>(redirect_uri: Url, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AuthorizationCodePkce {
            redirect_uri,
            scopes: collect_scopes(scopes),
        }
    }

    /// Client credentials flow
    pub fn client_credentials<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::ClientCredentials {
            scopes: collect_scopes(scopes),
        }
    }

    /// Device code flow with the default 2 second poll interval
    pub fn device_code<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::DeviceCode {
            scopes: collect_scopes(scopes),
            poll_interval: DEFAULT_DEVICE_POLL_INTERVAL,
        }
    }

    /// Flow kind of this descriptor
    #[must_use]
    pub fn kind(&self) -> FlowKind {
        match self {
            Self::AuthorizationCode { .. } => FlowKind::AuthorizationCode,
            Self::AuthorizationCodePkce { .. } => FlowKind::AuthorizationCodePkce,
            Self::ClientCredentials { .. } => FlowKind::ClientCredentials,
            Self::DeviceCode { .. } => FlowKind::DeviceCode,
            Self::OAuth1ThreeLegged { .. } => FlowKind::OAuth1ThreeLegged,
            Self::OAuth1TwoLegged => FlowKind::OAuth1TwoLegged,
            Self::NoAuth => FlowKind::NoAuth,
        }
    }

    /// Scopes requested by this flow (empty for flows without scopes)
    #[must_use]
    pub fn requested_scopes(&self) -> BTreeSet<String> {
        match self {
            Self::AuthorizationCode { scopes, .. }
            | Self::AuthorizationCodePkce { scopes, .. }
            | Self::ClientCredentials { scopes }
            | Self::DeviceCode { scopes, .. } => scopes.clone(),
            Self::OAuth1ThreeLegged { .. } | Self::OAuth1TwoLegged | Self::NoAuth => {
                BTreeSet::new()
            }
        }
    }

    /// Redirect or callback URI used by the interactive leg, if any
    #[must_use]
    pub fn redirect_uri(&self) -> Option<&Url> {
        match self {
            Self::AuthorizationCode { redirect_uri, .. }
            | Self::AuthorizationCodePkce { redirect_uri, .. } => Some(redirect_uri),
            Self::OAuth1ThreeLegged { callback_uri } => callback_uri.as_ref(),
            Self::ClientCredentials { .. }
            | Self::DeviceCode { .. }
            | Self::OAuth1TwoLegged
            | Self::NoAuth => None,
        }
    }
}

/// Split a space-separated scope string into a set
#[must_use]
pub fn parse_scopes(scope: &str) -> BTreeSet<String> {
    scope.split_whitespace().map(str::to_string).collect()
}

/// Join scopes into the space-separated form used on the wire
#[must_use]
pub fn join_scopes(scopes: &BTreeSet<String>) -> String {
    scopes.iter().map(String::as_str).collect::<Vec<_>>().join(" ")
}

fn collect_scopes<I, S>(scopes: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    scopes.into_iter().map(Into::into).collect()
}
