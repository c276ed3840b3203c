//! Server probes: declared auth mode and "who am I".
//!
//! Two endpoints drive resolution. `GET /api/auth/status` reports the
//! server's declared [`ServerAuthMode`]; the client never infers the mode
//! locally. `GET /api/auth/me` validates a cached session token, or — sent
//! without any auth header — lets the server apply its own network-trust
//! policy and answer with a trusted-network marker.

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::AuthError;

/// Timeout for the auth-status probe. Kept short so an unreachable server
/// doesn't stall app startup.
const MODE_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for the identity probe and logout, matching general API calls.
const API_TIMEOUT: Duration = Duration::from_secs(10);

/// Authentication policy declared by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerAuthMode {
    /// No authentication required.
    None,
    /// Login required unless the server trusts the request's network.
    Smart,
    /// Login always required.
    Full,
    /// Access via API key only.
    ApiKeyOnly,
    /// A mode this client doesn't know. Treated as open rather than locking
    /// the user out of a newer server.
    #[serde(other)]
    Unrecognized,
}

/// Response shape of `GET /api/auth/status`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthStatus {
    /// The declared mode.
    pub auth_mode: ServerAuthMode,
    /// Whether API requests need an `X-API-Key` header.
    #[serde(default)]
    pub requires_api_key: bool,
}

/// Outcome of the mode probe.
///
/// `Unreachable` is a first-class outcome rather than an error: the engine
/// must fail open for "server is down" and fail closed for "server says
/// full auth required", so the two cannot share an error path.
#[derive(Debug, Clone, PartialEq)]
pub enum ModeProbeResult {
    /// The server answered with its declared mode.
    Declared(ServerAuthMode),
    /// Connection failure or timeout.
    Unreachable,
}

/// A user as reported by the identity endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Server-assigned user id.
    pub id: i64,
    /// Login name.
    pub username: String,
    /// Email address, if on file.
    #[serde(default)]
    pub email: Option<String>,
    /// Display name, if on file.
    #[serde(default)]
    pub full_name: Option<String>,
    /// Whether the user may manage other users.
    #[serde(default)]
    pub is_admin: bool,
}

/// Result of the identity probe.
#[derive(Debug, Clone, PartialEq)]
pub enum Identity {
    /// A real logged-in user behind a valid session token.
    Session(UserRecord),
    /// The server trusts the request's origin network; no per-user identity.
    TrustedNetwork,
    /// Unauthorized, non-ok response, or network failure.
    Absent,
}

/// Network seam for the resolution engine.
///
/// The engine only talks to the server through this trait, so tests (and
/// non-reqwest hosts) can substitute their own transport.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Probe the server's declared auth mode.
    ///
    /// Connection failures and timeouts yield `Ok(Unreachable)`; an error is
    /// only returned for a reachable server that answered garbage.
    async fn fetch_auth_status(&self, base_url: &str) -> Result<ModeProbeResult, AuthError>;

    /// Ask the server who the caller is.
    ///
    /// With `token`, validates that session; without, lets the server apply
    /// its network-trust policy. 401, other non-ok statuses, and network
    /// failures all map to `Ok(Identity::Absent)`.
    async fn fetch_identity(
        &self,
        base_url: &str,
        token: Option<&str>,
    ) -> Result<Identity, AuthError>;

    /// Best-effort logout; the caller ignores failures after logging them.
    async fn post_logout(&self, base_url: &str, token: &str) -> Result<(), AuthError>;
}

/// reqwest-backed [`AuthApi`] used by all native clients.
pub struct HttpAuthApi {
    client: Client,
}

impl HttpAuthApi {
    /// Create a new probe transport.
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for HttpAuthApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn fetch_auth_status(&self, base_url: &str) -> Result<ModeProbeResult, AuthError> {
        let url = format!("{}/api/auth/status", base_url.trim_end_matches('/'));

        let response = match self
            .client
            .get(&url)
            .timeout(MODE_PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(error = %err, "auth status probe could not reach server");
                return Ok(ModeProbeResult::Unreachable);
            }
        };

        if !response.status().is_success() {
            // Reachable but malfunctioning; the engine fails closed on this
            return Err(AuthError::UnexpectedProbeFailure(format!(
                "auth status returned {}",
                response.status()
            )));
        }

        let status: AuthStatus = response.json().await.map_err(|err| {
            AuthError::UnexpectedProbeFailure(format!("malformed auth status response: {}", err))
        })?;

        Ok(ModeProbeResult::Declared(status.auth_mode))
    }

    async fn fetch_identity(
        &self,
        base_url: &str,
        token: Option<&str>,
    ) -> Result<Identity, AuthError> {
        let url = format!("{}/api/auth/me", base_url.trim_end_matches('/'));

        let mut request = self
            .client
            .get(&url)
            .timeout(API_TIMEOUT)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(error = %err, "identity probe failed to reach server");
                return Ok(Identity::Absent);
            }
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Ok(Identity::Absent);
        }
        if !status.is_success() {
            tracing::debug!(%status, "identity probe returned non-ok status");
            return Ok(Identity::Absent);
        }

        let body: serde_json::Value = response.json().await.map_err(|err| {
            AuthError::UnexpectedProbeFailure(format!("malformed identity response: {}", err))
        })?;

        parse_identity(body)
    }

    async fn post_logout(&self, base_url: &str, token: &str) -> Result<(), AuthError> {
        let url = format!("{}/api/auth/logout", base_url.trim_end_matches('/'));

        // Response body ignored; only transport failures matter to the caller
        self.client
            .post(&url)
            .timeout(API_TIMEOUT)
            .header(header::CONTENT_TYPE, "application/json")
            .bearer_auth(token)
            .send()
            .await?;

        Ok(())
    }
}

/// Map a 200 body from `/api/auth/me` to an [`Identity`].
///
/// `type == "trusted_network"` is the server's network-trust marker; any
/// other 200 body is expected to carry a user record.
fn parse_identity(body: serde_json::Value) -> Result<Identity, AuthError> {
    if body.get("type").and_then(|v| v.as_str()) == Some("trusted_network") {
        return Ok(Identity::TrustedNetwork);
    }

    let user: UserRecord = serde_json::from_value(body).map_err(|err| {
        AuthError::UnexpectedProbeFailure(format!("malformed identity response: {}", err))
    })?;

    Ok(Identity::Session(user))
}
