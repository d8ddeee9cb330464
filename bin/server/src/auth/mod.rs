//! Authentication module for the gatehouse server.
//!
//! This module provides:
//! - Google sign-in through the OAuth authorization code flow
//! - The Postgres identity store
//! - Bearer token extractors and gate middleware for Axum routes
//!
//! # Session Model
//!
//! The server keeps no session state. A login ends with a signed access token
//! and a refresh token handed to the frontend; every protected request carries
//! the access token, and roles embedded in it are trusted until it expires.
//! Role changes reach a user at their next refresh.

pub mod db;
pub mod google;
pub mod middleware;
pub mod routes;

use gatehouse_access::{
    AccessGate, Directory, IdentityFederator, IdentityStore, SessionIssuer, TokenCodec,
};
use std::sync::Arc;

pub use db::PgIdentityStore;
pub use google::GoogleFederator;
pub use middleware::{Authenticated, require};
pub use routes::{callback, login, refresh};

/// Shared application state.
pub struct AppState {
    /// Login, refresh and profile lookups.
    pub sessions: SessionIssuer,
    /// User, group and role administration.
    pub directory: Directory,
    /// Bearer token authentication.
    pub gate: AccessGate,
    /// Identity provider for starting logins.
    pub federator: Arc<dyn IdentityFederator>,
    /// Where the login callback sends the browser.
    pub frontend_url: String,
    /// Whether cookies carry the Secure flag.
    pub secure_cookies: bool,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(
        store: Arc<dyn IdentityStore>,
        federator: Arc<dyn IdentityFederator>,
        codec: TokenCodec,
        frontend_url: String,
        secure_cookies: bool,
    ) -> Self {
        Self {
            sessions: SessionIssuer::new(store.clone(), federator.clone(), codec.clone()),
            directory: Directory::new(store),
            gate: AccessGate::new(codec),
            federator,
            frontend_url,
            secure_cookies,
        }
    }
}
