//! Scope and entitlement checks
//!
//! Scope requirements are checked locally against the granted scopes of the
//! current token set, before any request is sent. Entitlements (for example
//! a Spotify Premium subscription) depend on the user's profile and are
//! evaluated lazily by the client on the guarded call only.

use serde_json::Value;
use std::collections::BTreeSet;

use crate::error::{AuthError, Result};

/// Scopes an operation needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeRequirement {
    /// A single scope
    One(String),
    /// Every listed scope
    AllOf(BTreeSet<String>),
    /// At least one of the listed scopes
    AnyOf(BTreeSet<String>),
}

impl ScopeRequirement {
    /// Require a single scope
    pub fn one(scope: impl Into<String>) -> Self {
        Self::One(scope.into())
    }

    /// Require every scope
    pub fn all_of<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AllOf(scopes.into_iter().map(Into::into).collect())
    }

    /// Require any one of the scopes
    pub fn any_of<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AnyOf(scopes.into_iter().map(Into::into).collect())
    }

    /// Scopes of the requirement that `granted` does not satisfy
    ///
    /// Empty when satisfied. For `AnyOf`, every listed scope is reported.
    #[must_use]
    pub fn missing(&self, granted: &BTreeSet<String>) -> Vec<String> {
        match self {
            Self::One(scope) if granted.contains(scope) => Vec::new(),
            Self::One(scope) => vec![scope.clone()],
            Self::AllOf(scopes) => scopes.difference(granted).cloned().collect(),
            Self::AnyOf(scopes) if scopes.is_empty() || !scopes.is_disjoint(granted) => Vec::new(),
            Self::AnyOf(scopes) => scopes.iter().cloned().collect(),
        }
    }
}

/// Fail with `AuthError::Scope` unless `granted` satisfies `requirement`
///
/// # Errors
/// `AuthError::Scope` naming the operation and the missing scopes.
pub fn ensure(
    operation: &str,
    granted: &BTreeSet<String>,
    requirement: &ScopeRequirement,
) -> Result<()> {
    let missing = requirement.missing(granted);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AuthError::scope(operation, missing))
    }
}

/// A profile-based requirement such as a subscription tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entitlement {
    /// Human-readable requirement, used in error messages
    pub name: String,
    /// JSON pointer into the user's profile
    pub pointer: String,
    /// Values at `pointer` that satisfy the entitlement
    pub accepted: BTreeSet<String>,
}

impl Entitlement {
    /// Create an entitlement
    pub fn new<I, S>(name: impl Into<String>, pointer: impl Into<String>, accepted: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            pointer: pointer.into(),
            accepted: accepted.into_iter().map(Into::into).collect(),
        }
    }

    /// Spotify Premium (`/product` of the current user's profile)
    #[must_use]
    pub fn spotify_premium() -> Self {
        Self::new("a Spotify Premium subscription", "/product", ["premium"])
    }

    /// Whether `profile` satisfies the entitlement
    #[must_use]
    pub fn is_satisfied_by(&self, profile: &Value) -> bool {
        profile
            .pointer(&self.pointer)
            .and_then(Value::as_str)
            .is_some_and(|value| self.accepted.contains(value))
    }

    /// Fail with `AuthError::Entitlement` unless `profile` satisfies it
    ///
    /// # Errors
    /// `AuthError::Entitlement` naming the operation and the requirement.
    pub fn ensure(&self, operation: &str, profile: &Value) -> Result<()> {
        if self.is_satisfied_by(profile) {
            Ok(())
        } else {
            Err(AuthError::entitlement(operation, self.name.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn granted(scopes: &[&str]) -> BTreeSet<String> {
        scopes.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_all_of() {
        let requirement = ScopeRequirement::all_of(["a", "b"]);
        let err = ensure("op", &granted(&["a"]), &requirement).unwrap_err();
        assert!(matches!(err, AuthError::Scope { ref missing, .. } if missing == &vec!["b".to_string()]));
        assert!(ensure("op", &granted(&["a", "b", "c"]), &requirement).is_ok());
    }

    #[test]
    fn test_any_of() {
        let requirement = ScopeRequirement::any_of(["a", "b"]);
        assert!(ensure("op", &granted(&["b"]), &requirement).is_ok());
        let err = ensure("op", &granted(&["c"]), &requirement).unwrap_err();
        assert!(matches!(err, AuthError::Scope { ref missing, .. } if missing.len() == 2));
    }

    #[test]
    fn test_one() {
        let requirement = ScopeRequirement::one("user-read-private");
        assert!(ensure("users.get_me", &granted(&["user-read-private"]), &requirement).is_ok());
        let err = ensure("users.get_me", &granted(&[]), &requirement).unwrap_err();
        assert_eq!(
            err.to_string(),
            "users.get_me() requires the 'user-read-private' scope(s)"
        );
    }

    #[test]
    fn test_spotify_premium() {
        let premium = Entitlement::spotify_premium();
        assert!(premium.is_satisfied_by(&json!({"id": "u", "product": "premium"})));
        assert!(!premium.is_satisfied_by(&json!({"id": "u", "product": "free"})));
        assert!(!premium.is_satisfied_by(&json!({"id": "u"})));

        let err = premium
            .ensure("player.start_playback", &json!({"product": "open"}))
            .unwrap_err();
        assert!(matches!(err, AuthError::Entitlement { .. }));
    }
}
