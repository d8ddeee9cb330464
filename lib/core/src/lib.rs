//! Core types and utilities for the gatehouse identity service.
//!
//! This crate provides the strongly-typed identifiers and the error handling
//! foundation shared by the access library and the HTTP server.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{GroupId, ParseIdError, RoleId, UserId};
