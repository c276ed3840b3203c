//! Error taxonomy for the resolution engine.
//!
//! Network unreachability is deliberately *not* always an error here: at the
//! mode-probe step it is a first-class outcome (`ModeProbeResult::Unreachable`)
//! and the engine fails open. Everywhere else the engine fails closed.

/// Errors surfaced by probes, lifecycle operations, and the client cache.
#[derive(Debug, Clone)]
pub enum AuthError {
    /// Connection failure or timeout.
    NetworkUnreachable(String),

    /// The server rejected the credential (401).
    Unauthorized(String),

    /// Malformed server URL or credential; rejected before persisting.
    InvalidConfiguration(String),

    /// Anything else that went wrong mid-resolution (malformed probe
    /// response, unexpected status). Mapped to `RequiresLogin` by the engine.
    UnexpectedProbeFailure(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NetworkUnreachable(msg) => write!(f, "Network unreachable: {}", msg),
            Self::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            Self::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {}", msg),
            Self::UnexpectedProbeFailure(msg) => write!(f, "Probe failed: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::NetworkUnreachable("Request timed out".to_string())
        } else if err.is_connect() {
            Self::NetworkUnreachable(format!("Connection failed: {}", err))
        } else if err.status() == Some(reqwest::StatusCode::UNAUTHORIZED) {
            Self::Unauthorized(err.to_string())
        } else {
            Self::UnexpectedProbeFailure(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_display() {
        let err = AuthError::NetworkUnreachable("connection refused".to_string());
        assert_eq!(err.to_string(), "Network unreachable: connection refused");

        let err = AuthError::Unauthorized("session expired".to_string());
        assert_eq!(err.to_string(), "Unauthorized: session expired");

        let err = AuthError::InvalidConfiguration("missing scheme".to_string());
        assert_eq!(err.to_string(), "Invalid configuration: missing scheme");

        let err = AuthError::UnexpectedProbeFailure("bad json".to_string());
        assert_eq!(err.to_string(), "Probe failed: bad json");
    }

    #[test]
    fn test_auth_error_from_reqwest() {
        // We can't easily construct reqwest errors, but we can check the
        // From impl exists via the trait bounds
        fn assert_from<T: From<reqwest::Error>>() {}
        assert_from::<AuthError>();
    }
}
