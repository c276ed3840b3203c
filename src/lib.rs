//! PantryPal client core - shared glue between the mobile and web shells
//! and the inventory backend.
//!
//! This library owns the one genuinely stateful part of the clients: how a
//! client decides, from the server's declared auth mode and a possibly-stale
//! cached credential, whether to show the login gate or the app.

pub mod auth;
pub mod client;
