//! Error types for the gatehouse-access crate.
//!
//! Each component reports failures with its own enum, carried as the context
//! of a rootcause `Report`:
//! - `TokenError`: signing and verification of session tokens
//! - `FederationError`: calls to the external identity provider
//! - `StoreError`: the persistence boundary
//! - `AccessError`: the caller-facing taxonomy every service operation returns

use rootcause::prelude::Report;
use std::fmt;

/// Errors from issuing or validating session tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// No signing secret is configured.
    MissingSecret,
    /// The token could not be encoded.
    Signing { reason: String },
    /// The token is not a well-formed compact token.
    Malformed { reason: String },
    /// The header names an algorithm other than the pinned one.
    AlgorithmMismatch,
    /// The signature does not verify against the configured secret.
    InvalidSignature,
    /// The token's expiry instant has passed.
    Expired,
    /// The token was minted by another issuer or for another audience.
    UntrustedOrigin { reason: String },
    /// A claim required for this token kind is absent.
    MissingClaim { claim: String },
    /// The subject claim is not a user identifier.
    InvalidSubject { subject: String },
    /// The token kind differs from the one the caller expects.
    WrongKind { expected: String, found: String },
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSecret => write!(f, "token signing secret is not configured"),
            Self::Signing { reason } => write!(f, "failed to sign token: {reason}"),
            Self::Malformed { reason } => write!(f, "malformed token: {reason}"),
            Self::AlgorithmMismatch => write!(f, "token algorithm is not accepted"),
            Self::InvalidSignature => write!(f, "token signature is invalid"),
            Self::Expired => write!(f, "token has expired"),
            Self::UntrustedOrigin { reason } => write!(f, "token origin rejected: {reason}"),
            Self::MissingClaim { claim } => write!(f, "missing required claim: {claim}"),
            Self::InvalidSubject { subject } => {
                write!(f, "subject claim is not a user id: {subject}")
            }
            Self::WrongKind { expected, found } => {
                write!(f, "expected a {expected} token, found a {found} token")
            }
        }
    }
}

impl std::error::Error for TokenError {}

/// Errors from the external identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FederationError {
    /// The provider client could not be configured.
    Configuration { reason: String },
    /// The authorization code exchange was rejected or failed.
    CodeExchange { reason: String },
    /// The profile endpoint answered with a non-success status.
    ProfileRequest { status: u16 },
    /// The profile payload could not be decoded.
    MalformedProfile { reason: String },
    /// The provider did not answer in time.
    Timeout { operation: String },
    /// The request never reached the provider or the response was cut off.
    Transport { reason: String },
}

impl fmt::Display for FederationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration { reason } => {
                write!(f, "identity provider misconfigured: {reason}")
            }
            Self::CodeExchange { reason } => {
                write!(f, "authorization code exchange failed: {reason}")
            }
            Self::ProfileRequest { status } => {
                write!(f, "profile request failed with status {status}")
            }
            Self::MalformedProfile { reason } => write!(f, "malformed profile: {reason}"),
            Self::Timeout { operation } => {
                write!(f, "identity provider timed out during {operation}")
            }
            Self::Transport { reason } => {
                write!(f, "identity provider unreachable: {reason}")
            }
        }
    }
}

impl std::error::Error for FederationError {}

/// Errors from the identity store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing database failed.
    Database { details: String },
    /// A uniquely-named entity already exists.
    Conflict { entity: &'static str, name: String },
    /// A referenced entity does not exist.
    NotFound { entity: &'static str, id: String },
    /// Stored data could not be mapped back to the domain model.
    Corrupt { details: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database { details } => write!(f, "database error: {details}"),
            Self::Conflict { entity, name } => write!(f, "{entity} '{name}' already exists"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Corrupt { details } => write!(f, "corrupt stored data: {details}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Caller-facing failure of an access operation.
///
/// Every service in this crate reports one of these kinds; the HTTP layer
/// maps each kind to exactly one status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    /// The request is malformed or violates a model rule.
    Validation { reason: String },
    /// No valid credential accompanied the request.
    Unauthenticated { reason: String },
    /// The caller is authenticated but a gate predicate failed.
    AccessDenied { requirement: String },
    /// A referenced entity does not exist.
    NotFound { entity: &'static str, id: String },
    /// The external identity provider failed.
    Federation { reason: String },
    /// An internal dependency failed.
    Internal { reason: String },
}

impl AccessError {
    /// Shorthand for a validation failure.
    #[must_use]
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Shorthand for an authentication failure.
    #[must_use]
    pub fn unauthenticated(reason: impl Into<String>) -> Self {
        Self::Unauthenticated {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation { reason } => write!(f, "invalid request: {reason}"),
            Self::Unauthenticated { reason } => write!(f, "not authenticated: {reason}"),
            Self::AccessDenied { requirement } => write!(f, "access denied: requires {requirement}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Federation { reason } => write!(f, "identity provider error: {reason}"),
            Self::Internal { reason } => write!(f, "internal error: {reason}"),
        }
    }
}

impl std::error::Error for AccessError {}

impl From<TokenError> for AccessError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::MissingSecret | TokenError::Signing { .. } => Self::Internal {
                reason: err.to_string(),
            },
            _ => Self::Unauthenticated {
                reason: err.to_string(),
            },
        }
    }
}

impl From<FederationError> for AccessError {
    fn from(err: FederationError) -> Self {
        Self::Federation {
            reason: err.to_string(),
        }
    }
}

impl From<StoreError> for AccessError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::Conflict { .. } => Self::Validation {
                reason: err.to_string(),
            },
            StoreError::Database { .. } | StoreError::Corrupt { .. } => Self::Internal {
                reason: err.to_string(),
            },
        }
    }
}

/// Re-frames a component report as an `AccessError` report.
///
/// The component report stays attached as the cause, so logs keep the full
/// chain while callers only match on the access taxonomy.
pub(crate) fn escalate<E>(report: Report<E>) -> Report<AccessError>
where
    E: Clone + Into<AccessError> + fmt::Display + fmt::Debug + Send + Sync + 'static,
{
    let kind: AccessError = report.current_context().clone().into();
    report.context(kind)
}
