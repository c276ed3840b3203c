//! Credential storage for the session token, API key, and server base URL.
//!
//! Stores values in `~/.local/share/pantrypal/auth.json` following the
//! XDG Base Directory Specification. Hosts with their own persistence
//! (mobile shells, browsers) can plug in any [`KeyValueStore`] instead.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Persisted keys. Clearing [`SESSION_TOKEN`] must always be paired with an
/// `HttpClientCache` invalidation; `AuthEngine` owns that pairing.
pub mod keys {
    /// Scheme-qualified server base URL.
    pub const API_BASE_URL: &str = "API_BASE_URL";
    /// Opaque bearer token issued at login.
    pub const SESSION_TOKEN: &str = "SESSION_TOKEN";
    /// Long-lived API key, prefixed `pp_` by convention.
    pub const API_KEY: &str = "API_KEY";
}

/// Platform adapter for persistent key-value storage.
///
/// Each client (desktop, mobile bridge, web shell) supplies its own impl;
/// the resolution engine only ever goes through this seam.
pub trait KeyValueStore: Send + Sync {
    /// Read a value, `None` if the key has never been set.
    fn get(&self, key: &str) -> Option<String>;

    /// Write a value, persisting immediately.
    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    /// Remove a value, persisting immediately. Removing an absent key is not
    /// an error.
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// The credential currently in effect for outbound requests.
///
/// A session token and an API key may both be persisted at the same time;
/// the session token takes precedence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Credential {
    /// No credential cached; requests go out without an auth header.
    #[serde(rename = "none")]
    None,

    /// Session token presented as `Authorization: Bearer <token>`.
    #[serde(rename = "session")]
    Session {
        /// The opaque token value.
        token: String,
    },

    /// API key presented as `X-API-Key: <key>`.
    #[serde(rename = "api_key")]
    ApiKey {
        /// The key value.
        key: String,
    },
}

impl Credential {
    /// Create a session-token credential.
    pub fn session(token: impl Into<String>) -> Self {
        Self::Session {
            token: token.into(),
        }
    }

    /// Create an API-key credential.
    pub fn api_key(key: impl Into<String>) -> Self {
        Self::ApiKey { key: key.into() }
    }

    /// Get the raw secret, if any.
    pub fn secret(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::Session { token } => Some(token),
            Self::ApiKey { key } => Some(key),
        }
    }
}

/// Typed facade over a [`KeyValueStore`] for the three persisted keys.
///
/// Pure storage: no probing, no cache invalidation. All writes during normal
/// operation go through `AuthEngine` so the client-cache invariant holds.
#[derive(Debug)]
pub struct CredentialStore<S: KeyValueStore> {
    inner: S,
}

impl<S: KeyValueStore> CredentialStore<S> {
    /// Wrap a key-value store.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Configured server base URL, if one has been saved.
    pub fn base_url(&self) -> Option<String> {
        self.inner.get(keys::API_BASE_URL)
    }

    /// Persist the server base URL. The caller is expected to have validated
    /// and normalized it first (see `AuthEngine::set_server_url`).
    pub fn set_base_url(&mut self, url: &str) -> Result<()> {
        self.inner.set(keys::API_BASE_URL, url)
    }

    /// Cached session token, if any.
    pub fn session_token(&self) -> Option<String> {
        self.inner.get(keys::SESSION_TOKEN)
    }

    /// Persist a session token.
    pub fn set_session_token(&mut self, token: &str) -> Result<()> {
        self.inner.set(keys::SESSION_TOKEN, token)
    }

    /// Forget the cached session token.
    pub fn clear_session_token(&mut self) -> Result<()> {
        self.inner.remove(keys::SESSION_TOKEN)
    }

    /// Cached API key, if any.
    pub fn api_key(&self) -> Option<String> {
        self.inner.get(keys::API_KEY)
    }

    /// Persist an API key. Empty or whitespace-only input clears it instead.
    pub fn set_api_key(&mut self, key: &str) -> Result<()> {
        let key = key.trim();
        if key.is_empty() {
            self.inner.remove(keys::API_KEY)
        } else {
            self.inner.set(keys::API_KEY, key)
        }
    }

    /// Forget the cached API key.
    pub fn clear_api_key(&mut self) -> Result<()> {
        self.inner.remove(keys::API_KEY)
    }

    /// The effective credential for outbound requests.
    ///
    /// Session token wins over API key when both are cached.
    pub fn credential(&self) -> Credential {
        if let Some(token) = self.session_token() {
            Credential::Session { token }
        } else if let Some(key) = self.api_key() {
            Credential::ApiKey { key }
        } else {
            Credential::None
        }
    }
}

/// JSON-file-backed [`KeyValueStore`].
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    state: FileState,
}

/// On-disk shape of the auth file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FileState {
    /// Stored key-value pairs.
    values: HashMap<String, String>,
    /// When the file was last written.
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

impl FileStore {
    /// Get the default storage path.
    ///
    /// Returns `~/.local/share/pantrypal/auth.json` on Linux/macOS.
    pub fn default_path() -> Result<PathBuf> {
        let data_dir =
            dirs::data_local_dir().context("Could not determine local data directory")?;
        Ok(data_dir.join("pantrypal").join("auth.json"))
    }

    /// Open the store at the default path.
    ///
    /// Starts empty if the file doesn't exist yet.
    pub fn open() -> Result<Self> {
        let path = Self::default_path()?;
        Self::open_at(path)
    }

    /// Open the store at a specific path.
    ///
    /// Starts empty if the file doesn't exist yet.
    pub fn open_at(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let file = File::open(&path)
                .with_context(|| format!("Failed to open auth file: {}", path.display()))?;
            let reader = BufReader::new(file);
            serde_json::from_reader(reader)
                .with_context(|| format!("Failed to parse auth file: {}", path.display()))?
        } else {
            FileState::default()
        };
        Ok(Self { path, state })
    }

    /// Write the current state to disk.
    ///
    /// Creates parent directories if needed and sets file permissions to 0600.
    fn save(&mut self) -> Result<()> {
        self.state.updated_at = Some(Utc::now());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let file = File::create(&self.path)
            .with_context(|| format!("Failed to create auth file: {}", self.path.display()))?;

        // 0600: the file holds bearer secrets
        #[cfg(unix)]
        {
            let mut perms = file.metadata()?.permissions();
            perms.set_mode(0o600);
            file.set_permissions(perms)?;
        }

        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, &self.state)
            .with_context(|| format!("Failed to write auth file: {}", self.path.display()))?;

        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.state.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.state.values.insert(key.to_string(), value.to_string());
        self.save()
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        if self.state.values.remove(key).is_some() {
            self.save()?;
        }
        Ok(())
    }
}

/// In-memory [`KeyValueStore`] for tests and for hosts that keep secrets in
/// their own secure storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.values.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_credential_secret() {
        assert_eq!(Credential::None.secret(), None);
        assert_eq!(Credential::session("tok-1").secret(), Some("tok-1"));
        assert_eq!(Credential::api_key("pp_abc").secret(), Some("pp_abc"));
    }

    #[test]
    fn test_credential_serialization() {
        let cred = Credential::session("tok-1");
        let json = serde_json::to_string(&cred).unwrap();
        assert!(json.contains("\"type\":\"session\""));
        assert!(json.contains("\"token\":\"tok-1\""));

        let cred = Credential::api_key("pp_abc");
        let json = serde_json::to_string(&cred).unwrap();
        assert!(json.contains("\"type\":\"api_key\""));
    }

    #[test]
    fn test_session_token_takes_precedence_over_api_key() {
        let mut store = CredentialStore::new(MemoryStore::new());
        store.set_api_key("pp_abc").unwrap();
        store.set_session_token("tok-1").unwrap();

        assert_eq!(store.credential(), Credential::session("tok-1"));

        store.clear_session_token().unwrap();
        assert_eq!(store.credential(), Credential::api_key("pp_abc"));

        store.clear_api_key().unwrap();
        assert_eq!(store.credential(), Credential::None);
    }

    #[test]
    fn test_set_api_key_blank_clears() {
        let mut store = CredentialStore::new(MemoryStore::new());
        store.set_api_key("pp_abc").unwrap();
        store.set_api_key("   ").unwrap();
        assert_eq!(store.api_key(), None);
    }

    #[test]
    fn test_set_api_key_trims_whitespace() {
        let mut store = CredentialStore::new(MemoryStore::new());
        store.set_api_key("  pp_abc  ").unwrap();
        assert_eq!(store.api_key(), Some("pp_abc".to_string()));
    }

    #[test]
    fn test_file_store_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("auth.json");

        let mut store = FileStore::open_at(&path).unwrap();
        store.set(keys::API_BASE_URL, "http://pantry.local:8000").unwrap();
        store.set(keys::SESSION_TOKEN, "tok-1").unwrap();

        let reopened = FileStore::open_at(&path).unwrap();
        assert_eq!(
            reopened.get(keys::API_BASE_URL),
            Some("http://pantry.local:8000".to_string())
        );
        assert_eq!(reopened.get(keys::SESSION_TOKEN), Some("tok-1".to_string()));
        assert_eq!(reopened.get(keys::API_KEY), None);
    }

    #[test]
    fn test_file_store_remove_persists() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("auth.json");

        let mut store = FileStore::open_at(&path).unwrap();
        store.set(keys::SESSION_TOKEN, "tok-1").unwrap();
        store.remove(keys::SESSION_TOKEN).unwrap();

        let reopened = FileStore::open_at(&path).unwrap();
        assert_eq!(reopened.get(keys::SESSION_TOKEN), None);
    }

    #[test]
    fn test_file_store_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nonexistent.json");

        let store = FileStore::open_at(&path).unwrap();
        assert_eq!(store.get(keys::SESSION_TOKEN), None);
        // Opening alone must not create the file
        assert!(!path.exists());
    }

    #[test]
    fn test_file_store_records_updated_at() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("auth.json");

        let mut store = FileStore::open_at(&path).unwrap();
        store.set(keys::API_KEY, "pp_abc").unwrap();

        let reopened = FileStore::open_at(&path).unwrap();
        assert!(reopened.state.updated_at.is_some());
        assert!(reopened.state.updated_at.unwrap() <= Utc::now());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("auth.json");

        let mut store = FileStore::open_at(&path).unwrap();
        store.set(keys::SESSION_TOKEN, "tok-1").unwrap();

        let metadata = std::fs::metadata(&path).unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "Auth file should have 0600 permissions");
    }
}
