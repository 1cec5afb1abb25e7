//! Proof Key for Code Exchange (RFC 7636)

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

use crate::utils::random_urlsafe;

/// Number of random bytes behind a code verifier (86 base64url characters)
const VERIFIER_BYTES: usize = 64;

/// PKCE code challenge data
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// Code verifier (random string)
    pub verifier: String,
    /// Code challenge (SHA-256 hash of verifier, base64url encoded)
    pub challenge: String,
}

impl PkceChallenge {
    /// Challenge method sent as `code_challenge_method`
    pub const METHOD: &'static str = "S256";

    /// Generate a new verifier from the OS CSPRNG
    #[must_use]
    pub fn generate() -> Self {
        Self::from_verifier(random_urlsafe(VERIFIER_BYTES))
    }

    /// Derive the challenge for an existing verifier
    #[must_use]
    pub fn from_verifier(verifier: impl Into<String>) -> Self {
        let verifier = verifier.into();
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }
}
