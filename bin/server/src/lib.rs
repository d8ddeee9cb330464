//! gatehouse HTTP service.
//!
//! This crate wires the access library to the outside world: Google sign-in
//! over OAuth, a Postgres identity store, and the JSON API for profiles and
//! administration.

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod error;

pub use app::router;
