//! Access resolution: one decision, computed from the server's declared
//! auth mode, the cached credential, and at most one identity probe.
//!
//! The decision table is deliberately asymmetric about failure. An
//! unreachable server cannot confirm or deny that auth is required, so the
//! engine fails open and lets the user in (at minimum to reconfigure the
//! server URL). A reachable server that answers garbage is assumed to be the
//! worse case and the engine fails closed to [`AuthDecision::RequiresLogin`].

use anyhow::Result;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::error::AuthError;
use super::probe::{AuthApi, Identity, ModeProbeResult, ServerAuthMode, UserRecord};
use super::store::{CredentialStore, KeyValueStore};
use crate::client::HttpClientCache;

/// The engine's sole output. Exactly one variant is active at a time; the
/// UI picks gate-vs-app based solely on [`requires_login`](Self::requires_login).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthDecision {
    /// No login UI and no user identity: the server requires no auth, or
    /// declared a mode this client doesn't recognize.
    OpenAccess,

    /// No login UI; the server trusts the request's network. There is no
    /// first-class user, so the UI must not surface account management.
    TrustedNetworkAccess,

    /// Logged in via a validated session token.
    AuthenticatedSession(UserRecord),

    /// Access via a cached API key; no user identity available.
    ApiKeyAccess,

    /// The login UI must be shown. Any previously cached session token has
    /// already been cleared.
    RequiresLogin,
}

impl AuthDecision {
    /// Whether the UI should show the auth gate instead of the main app.
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::RequiresLogin)
    }

    /// The logged-in user, when there is one.
    ///
    /// `None` for trusted-network access: the network, not a user, is the
    /// basis of trust there.
    pub fn user(&self) -> Option<&UserRecord> {
        match self {
            Self::AuthenticatedSession(user) => Some(user),
            _ => None,
        }
    }
}

/// The shared resolution engine behind every PantryPal client.
///
/// Owns the credential store facade, the network seam, and the memoized API
/// client, so every credential mutation invalidates the client cache in one
/// place. Re-resolution is serialized by the exclusive `&mut self` borrow;
/// callers that share the engine across tasks wrap it in an async mutex.
pub struct AuthEngine<S: KeyValueStore, A: AuthApi> {
    store: CredentialStore<S>,
    api: A,
    http: HttpClientCache,
    default_base_url: String,
    decision: AuthDecision,
}

impl<S: KeyValueStore, A: AuthApi> AuthEngine<S, A> {
    /// Create an engine over a key-value store and a probe transport.
    ///
    /// `default_base_url` is used until the user saves a server URL.
    pub fn new(store: S, api: A, default_base_url: impl Into<String>) -> Self {
        Self {
            store: CredentialStore::new(store),
            api,
            http: HttpClientCache::new(),
            default_base_url: default_base_url.into(),
            decision: AuthDecision::RequiresLogin,
        }
    }

    /// The server base URL in effect: the saved one, or the default.
    pub fn base_url(&self) -> String {
        self.store
            .base_url()
            .unwrap_or_else(|| self.default_base_url.clone())
    }

    /// The most recently computed decision.
    pub fn decision(&self) -> &AuthDecision {
        &self.decision
    }

    /// Read access to the credential store.
    pub fn store(&self) -> &CredentialStore<S> {
        &self.store
    }

    /// The memoized API client cache.
    pub fn client_cache(&self) -> &HttpClientCache {
        &self.http
    }

    /// Run the resolution sequence and return the decision.
    ///
    /// Called once at app start and again after explicit credential or
    /// server-URL changes, never polled. Probes are attempted exactly once;
    /// the UI offers manual retry by calling this again. The stored decision
    /// is only written once the sequence completes, so dropping the future
    /// mid-flight (navigation away) applies nothing.
    pub async fn resolve(&mut self) -> AuthDecision {
        let decision = match self.try_resolve().await {
            Ok(decision) => decision,
            Err(err) => {
                tracing::warn!(error = %err, "auth resolution failed; requiring login");
                // RequiresLogin presumes any cached session token invalid,
                // so forget it here too, paired with a cache invalidation
                if let Err(err) = self.store.clear_session_token() {
                    tracing::warn!(error = %err, "failed to clear session token");
                }
                self.http.invalidate();
                AuthDecision::RequiresLogin
            }
        };
        self.decision = decision.clone();
        decision
    }

    async fn try_resolve(&mut self) -> Result<AuthDecision, AuthError> {
        let base_url = self.base_url();

        let mode = match self.api.fetch_auth_status(&base_url).await? {
            ModeProbeResult::Unreachable => {
                // Fail open: the app must stay usable so the user can fix
                // the server URL in settings
                tracing::debug!(%base_url, "server unreachable; granting open access");
                return Ok(AuthDecision::OpenAccess);
            }
            ModeProbeResult::Declared(mode) => mode,
        };

        if mode == ServerAuthMode::None {
            return Ok(AuthDecision::OpenAccess);
        }

        if let Some(token) = self.store.session_token() {
            return match self.api.fetch_identity(&base_url, Some(&token)).await? {
                Identity::Absent => {
                    // Presumed revoked or expired; never retried silently
                    tracing::debug!("cached session rejected; clearing token");
                    self.store.clear_session_token().map_err(storage_error)?;
                    self.http.invalidate();
                    Ok(AuthDecision::RequiresLogin)
                }
                Identity::TrustedNetwork => Ok(AuthDecision::TrustedNetworkAccess),
                Identity::Session(user) => Ok(AuthDecision::AuthenticatedSession(user)),
            };
        }

        match mode {
            ServerAuthMode::Smart => {
                // Unauthenticated probe; the server decides whether the
                // request's network is trusted
                match self.api.fetch_identity(&base_url, None).await? {
                    Identity::TrustedNetwork => Ok(AuthDecision::TrustedNetworkAccess),
                    _ => Ok(AuthDecision::RequiresLogin),
                }
            }
            // No token means no identity probe in full mode
            ServerAuthMode::Full => Ok(AuthDecision::RequiresLogin),
            ServerAuthMode::ApiKeyOnly => {
                if self.store.api_key().is_some() {
                    Ok(AuthDecision::ApiKeyAccess)
                } else {
                    Ok(AuthDecision::RequiresLogin)
                }
            }
            // Mode `none` already returned open above; unknown modes are
            // treated as open rather than locking the user out
            ServerAuthMode::None | ServerAuthMode::Unrecognized => Ok(AuthDecision::OpenAccess),
        }
    }

    /// Record a successful login.
    ///
    /// The caller already holds a token the server just issued, so no
    /// re-probe is needed; the decision is set directly.
    pub fn login(&mut self, session_token: &str, user: UserRecord) -> Result<AuthDecision> {
        self.store.set_session_token(session_token)?;
        self.http.invalidate();
        self.decision = AuthDecision::AuthenticatedSession(user);
        Ok(self.decision.clone())
    }

    /// Log out: best-effort server notification, then local cleanup.
    ///
    /// A failed logout request is logged and never blocks forgetting the
    /// local credential.
    pub async fn logout(&mut self) -> Result<AuthDecision> {
        let base_url = self.base_url();
        if let Some(token) = self.store.session_token() {
            if let Err(err) = self.api.post_logout(&base_url, &token).await {
                tracing::warn!(error = %err, "logout request failed; clearing local session anyway");
            }
        }

        self.store.clear_session_token()?;
        self.http.invalidate();
        self.decision = AuthDecision::RequiresLogin;
        Ok(self.decision.clone())
    }

    /// Validate, normalize, and persist a new server URL.
    ///
    /// The caller must re-run [`resolve`](Self::resolve) afterwards.
    pub fn set_server_url(&mut self, url: &str) -> Result<()> {
        let normalized = normalize_base_url(url)?;
        self.store.set_base_url(&normalized)?;
        self.http.invalidate();
        Ok(())
    }

    /// Persist (or clear, for blank input) the API key.
    pub fn set_api_key(&mut self, key: &str) -> Result<()> {
        self.store.set_api_key(key)?;
        self.http.invalidate();
        Ok(())
    }

    /// Client for general API calls, bound to the current URL and credential.
    pub fn api_client(&mut self) -> Result<Client> {
        let base_url = self.base_url();
        let credential = self.store.credential();
        self.http.client(&base_url, &credential)
    }
}

/// Require an `http://`/`https://` URL with a host, and strip trailing
/// slashes so endpoint paths join cleanly.
fn normalize_base_url(url: &str) -> Result<String, AuthError> {
    let url = url.trim();
    let host = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"));

    match host {
        Some(host) if !host.trim_matches('/').is_empty() => {
            Ok(url.trim_end_matches('/').to_string())
        }
        _ => Err(AuthError::InvalidConfiguration(format!(
            "Server URL must be http:// or https:// with a host: {}",
            url
        ))),
    }
}

fn storage_error(err: anyhow::Error) -> AuthError {
    AuthError::UnexpectedProbeFailure(format!("credential store write failed: {}", err))
}
