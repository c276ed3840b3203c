//! Authentication for PantryPal clients: credential storage and the
//! access-resolution engine.
//!
//! One resolution engine serves the mobile shell and both web variants;
//! each host plugs in its own [`KeyValueStore`] while sharing the same
//! decision table, probes, and client-cache invalidation rules.

mod error;
mod probe;
mod resolver;
mod store;

pub use error::AuthError;
pub use probe::{
    AuthApi, AuthStatus, HttpAuthApi, Identity, ModeProbeResult, ServerAuthMode, UserRecord,
};
pub use resolver::{AuthDecision, AuthEngine};
pub use store::{keys, Credential, CredentialStore, FileStore, KeyValueStore, MemoryStore};
