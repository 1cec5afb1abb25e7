//! Client identity

use super::flow::FlowKind;
use serde::{Deserialize, Serialize};

/// Immutable identity of an API client
///
/// Identifies which stored credential record belongs to the client. For
/// OAuth 1.0a flows `client_id`/`client_secret` are the consumer key/secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdentity {
    /// Provider name (e.g. "spotify")
    pub provider: String,
    /// Client ID or consumer key
    pub client_id: String,
    /// Client secret or consumer secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Authorization flow the client was constructed for
    pub flow: FlowKind,
}

impl ClientIdentity {
    /// Create a client identity
    pub fn new(
        provider: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: Option<String>,
        flow: FlowKind,
    ) -> Self {
        Self {
            provider: provider.into(),
            client_id: client_id.into(),
            client_secret,
            flow,
        }
    }

    /// Client secret, or `MissingCredentials` naming the flow that needs it
    ///
    /// # Errors
    /// Returns `AuthError::MissingCredentials` when no secret is configured.
    pub fn require_secret(&self) -> crate::Result<&str> {
        self.client_secret.as_deref().ok_or_else(|| {
            crate::AuthError::missing_credentials(format!(
                "the {} requires a client secret for {}",
                self.flow, self.provider
            ))
        })
    }
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("provider", &self.provider)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("flow", &self.flow)
            .finish()
    }
}
