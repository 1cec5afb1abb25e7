//! Credential store for persisting token sets
//!
//! One JSON file holds the stored credential records of every provider,
//! keyed by an account identifier (SHA-256 of client ID, flow and user
//! identifier). Each provider section also remembers the last account stored
//! per flow so a client that does not know its user identifier yet can pick
//! its previous session back up.
//!
//! ```json
//! {
//!   "providers": {
//!     "spotify": {
//!       "last": { "pkce": "9f86d0..." },
//!       "accounts": { "9f86d0...": { "flow": "pkce", "client_id": "...", ... } }
//!     }
//!   }
//! }
//! ```
//!
//! There is no locking: concurrent writers race and the last one wins. Every
//! write replaces the whole file through a temporary file and a rename, so a
//! reader never observes a partially written file.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{AuthError, Result};
use crate::types::{FlowKind, TokenSet};
use crate::utils::{random_hex, unix_now};

/// Prefix on a user identifier that skips stored-token lookup
pub const FORCE_REAUTHORIZATION_PREFIX: char = '~';

/// One stored account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentialRecord {
    /// Unix timestamp when the record was written
    pub added: u64,
    /// Provider name
    pub provider: String,
    /// Flow the token was obtained with
    pub flow: FlowKind,
    /// Client ID or consumer key
    pub client_id: String,
    /// Client secret or consumer secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Redirect URI used by the interactive leg
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    /// User the token belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_identifier: Option<String>,
    /// Stored token set
    pub token: TokenSet,
}

impl StoredCredentialRecord {
    /// Create a record added now
    #[must_use]
    pub fn new(
        provider: impl Into<String>,
        flow: FlowKind,
        client_id: impl Into<String>,
        token: TokenSet,
    ) -> Self {
        Self {
            added: unix_now(),
            provider: provider.into(),
            flow,
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: None,
            user_identifier: None,
            token,
        }
    }

    /// Account identifier this record is stored under
    #[must_use]
    pub fn account_id(&self) -> String {
        account_id(&self.client_id, self.flow, self.user_identifier.as_deref())
    }
}

/// Account identifier for a client, flow and optional user
///
/// A leading `~` on the user identifier is ignored.
#[must_use]
pub fn account_id(client_id: &str, flow: FlowKind, user_identifier: Option<&str>) -> String {
    let key = match user_identifier
        .map(|user| user.trim_start_matches(FORCE_REAUTHORIZATION_PREFIX))
        .filter(|user| !user.is_empty())
    {
        Some(user) => format!("{client_id}:{}:{user}", flow.as_str()),
        None => format!("{client_id}:{}", flow.as_str()),
    };
    Sha256::digest(key.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    providers: BTreeMap<String, ProviderSection>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProviderSection {
    #[serde(default)]
    last: BTreeMap<String, String>,
    #[serde(default)]
    accounts: BTreeMap<String, StoredCredentialRecord>,
}

impl ProviderSection {
    /// Most recently added account for `flow`, optionally restricted to a client
    fn newest(&self, flow: FlowKind, client_id: Option<&str>) -> Option<String> {
        self.accounts
            .iter()
            .filter(|(_, r)| r.flow == flow && client_id.is_none_or(|id| r.client_id == id))
            .max_by_key(|(_, r)| r.added)
            .map(|(id, _)| id.clone())
    }
}

/// File-backed credential store
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Create a store at a custom path
    #[must_use]
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store in the platform config directory (`<config_dir>/minim/credentials.json`)
    ///
    /// # Errors
    /// Returns `AuthError::InvalidConfig` if the platform has no config directory.
    pub fn open_default() -> Result<Self> {
        Self::default_path()
            .map(Self::with_path)
            .ok_or_else(|| AuthError::invalid_config("no platform config directory for the credential store"))
    }

    /// Default store path, if the platform has a config directory
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("minim").join("credentials.json"))
    }

    /// Get the storage path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Find the stored record for a client
    ///
    /// With a user identifier the account is looked up directly; a `~`
    /// prefix returns `None` to force re-authorization. Without one, flows
    /// that are not user-bound use their fixed account and user-bound flows
    /// follow the last-account pointer, which is only honored when its client
    /// ID matches.
    ///
    /// # Errors
    /// I/O and JSON errors from reading the file.
    pub fn load(
        &self,
        provider: &str,
        client_id: &str,
        flow: FlowKind,
        user_identifier: Option<&str>,
    ) -> Result<Option<StoredCredentialRecord>> {
        if user_identifier.is_some_and(|user| user.starts_with(FORCE_REAUTHORIZATION_PREFIX)) {
            return Ok(None);
        }

        let file = self.read()?;
        let Some(section) = file.providers.get(provider) else {
            return Ok(None);
        };

        let id = match user_identifier {
            Some(_) => account_id(client_id, flow, user_identifier),
            None if !flow.is_user_bound() => account_id(client_id, flow, None),
            None => match section.last.get(flow.as_str()) {
                Some(id) => id.clone(),
                None => return Ok(None),
            },
        };

        Ok(section
            .accounts
            .get(&id)
            .filter(|record| record.client_id == client_id && record.flow == flow)
            .cloned())
    }

    /// Write a record, returning its account identifier
    ///
    /// User-bound records also become the last account for their flow.
    ///
    /// # Errors
    /// I/O and JSON errors from reading or writing the file.
    pub fn save(&self, record: &StoredCredentialRecord) -> Result<String> {
        let mut file = self.read()?;
        let id = record.account_id();
        let section = file.providers.entry(record.provider.clone()).or_default();

        let mut record = record.clone();
        record.user_identifier = record
            .user_identifier
            .map(|user| user.trim_start_matches(FORCE_REAUTHORIZATION_PREFIX).to_string());
        if record.flow.is_user_bound() {
            section.last.insert(record.flow.as_str().to_string(), id.clone());
        }
        section.accounts.insert(id.clone(), record);

        self.write(&file)?;
        tracing::debug!(path = %self.path.display(), account = %id, "stored credentials");
        Ok(id)
    }

    /// Remove a stored account
    ///
    /// Without a user identifier, user-bound flows remove the last account
    /// if it belongs to `client_id`, otherwise the newest account of that
    /// client. When the removed account was the last account for its flow,
    /// the pointer moves to the newest remaining account of the flow.
    ///
    /// # Errors
    /// I/O and JSON errors from reading or writing the file.
    pub fn remove(
        &self,
        provider: &str,
        client_id: &str,
        flow: FlowKind,
        user_identifier: Option<&str>,
    ) -> Result<bool> {
        let mut file = self.read()?;
        let Some(section) = file.providers.get_mut(provider) else {
            return Ok(false);
        };

        let id = if user_identifier.is_some() || !flow.is_user_bound() {
            Some(account_id(client_id, flow, user_identifier))
        } else {
            section
                .last
                .get(flow.as_str())
                .filter(|id| {
                    section
                        .accounts
                        .get(*id)
                        .is_some_and(|record| record.client_id == client_id)
                })
                .cloned()
                .or_else(|| section.newest(flow, Some(client_id)))
        };
        let Some(id) = id.filter(|id| section.accounts.contains_key(id)) else {
            return Ok(false);
        };

        section.accounts.remove(&id);
        if section.last.get(flow.as_str()) == Some(&id) {
            match section.newest(flow, None) {
                Some(next) => {
                    section.last.insert(flow.as_str().to_string(), next);
                }
                None => {
                    section.last.remove(flow.as_str());
                }
            }
        }

        self.write(&file)?;
        tracing::debug!(account = %id, "removed stored credentials");
        Ok(true)
    }

    /// Remove every account of a provider
    ///
    /// # Errors
    /// I/O and JSON errors from reading or writing the file.
    pub fn clear_provider(&self, provider: &str) -> Result<()> {
        let mut file = self.read()?;
        if file.providers.remove(provider).is_some() {
            self.write(&file)?;
        }
        Ok(())
    }

    /// All stored accounts of a provider, keyed by account identifier
    ///
    /// # Errors
    /// I/O and JSON errors from reading the file.
    pub fn list(&self, provider: &str) -> Result<Vec<(String, StoredCredentialRecord)>> {
        Ok(self
            .read()?
            .providers
            .remove(provider)
            .map(|section| section.accounts.into_iter().collect())
            .unwrap_or_default())
    }

    fn read(&self) -> Result<StoreFile> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(StoreFile::default()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, file: &StoreFile) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(file)?;
        let file_name = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("credentials.json");
        let temp = self
            .path
            .with_file_name(format!(".{file_name}.{}.tmp", random_hex(4)));

        std::fs::write(&temp, &content)?;

        // Set restrictive permissions on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&temp, perms)?;
        }

        if let Err(e) = std::fs::rename(&temp, &self.path) {
            let _ = std::fs::remove_file(&temp);
            return Err(e.into());
        }
        Ok(())
    }
}
