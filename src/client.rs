//! Memoized API client bound to a server URL and credential.
//!
//! Every outbound request in the app goes through a client built from the
//! current `(base_url, credential)` pair. The dominant bug class in earlier
//! clients was a stale memoized instance silently reusing an old server URL
//! or a revoked token, so this cache is an owned object with a single writer
//! (`AuthEngine`) instead of ambient global state, and any mutation to the
//! URL or credential must be followed by [`HttpClientCache::invalidate`].

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;

use crate::auth::Credential;

/// Request timeout for general API calls.
const API_TIMEOUT: Duration = Duration::from_secs(10);

/// Header used for API-key auth, independent of session bearer auth.
const API_KEY_HEADER: &str = "X-API-Key";

/// Lazily-built, invalidatable cache of the configured API client.
#[derive(Debug, Default)]
pub struct HttpClientCache {
    entry: Option<CacheEntry>,
}

#[derive(Debug)]
struct CacheEntry {
    base_url: String,
    credential: Credential,
    client: Client,
}

impl HttpClientCache {
    /// Create an empty cache; the first [`client`](Self::client) call builds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the client for the given pair, building and memoizing it if the
    /// cache is empty or was built for a different pair.
    ///
    /// `Client` is internally reference-counted, so the returned handle
    /// stays valid even if the cache is invalidated afterwards.
    pub fn client(&mut self, base_url: &str, credential: &Credential) -> Result<Client> {
        if let Some(entry) = &self.entry {
            if entry.base_url == base_url && &entry.credential == credential {
                return Ok(entry.client.clone());
            }
        }

        let client = build_client(credential)?;
        self.entry = Some(CacheEntry {
            base_url: base_url.to_string(),
            credential: credential.clone(),
            client: client.clone(),
        });
        Ok(client)
    }

    /// Drop the memoized client; the next [`client`](Self::client) call
    /// rebuilds from the then-current pair.
    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    /// Whether a client is currently memoized.
    pub fn is_cached(&self) -> bool {
        self.entry.is_some()
    }

    #[cfg(test)]
    fn cached_pair(&self) -> Option<(&str, &Credential)> {
        self.entry
            .as_ref()
            .map(|e| (e.base_url.as_str(), &e.credential))
    }
}

/// Build a client carrying the credential as a default header.
fn build_client(credential: &Credential) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    match credential {
        Credential::None => {}
        Credential::Session { token } => {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .context("Session token contains characters not valid in a header")?;
            headers.insert(AUTHORIZATION, value);
        }
        Credential::ApiKey { key } => {
            let value = HeaderValue::from_str(key)
                .context("API key contains characters not valid in a header")?;
            headers.insert(API_KEY_HEADER, value);
        }
    }

    Client::builder()
        .timeout(API_TIMEOUT)
        .default_headers(headers)
        .build()
        .context("Failed to build API client")
}
