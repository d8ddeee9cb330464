//! Signed session tokens.
//!
//! Tokens are compact JWTs signed with one shared secret using HS256. Two
//! kinds exist:
//!
//! | Kind | Lifetime | Carries |
//! |------|----------|---------|
//! | `access` | 15 minutes | subject, email, name, roles, permissions |
//! | `refresh` | 7 days | subject only |
//!
//! Validation pins the algorithm, checks issuer and audience, verifies the
//! signature, then checks expiry against the caller's clock with zero leeway
//! and the token kind against the caller's expectation.

use crate::error::TokenError;
use crate::permissions::ResolvedAccess;
use crate::user::User;
use chrono::{DateTime, Duration, Utc};
use gatehouse_core::UserId;
use jsonwebtoken::errors::{Error as JwtError, ErrorKind as JwtErrorKind};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

/// Issuer claim stamped on every token.
pub const ISSUER: &str = "gatehouse";
/// Audience claim stamped on every token.
pub const AUDIENCE: &str = "gatehouse:api";

/// Discriminates access tokens from refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity and authorization details embedded in access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDetails {
    pub email: String,
    pub name: String,
    pub roles: BTreeSet<String>,
    pub permissions: BTreeSet<String>,
}

impl AccessDetails {
    /// Captures a user's profile and resolved access at issuance time.
    #[must_use]
    pub fn new(user: &User, access: ResolvedAccess) -> Self {
        let (roles, permissions) = access.into_parts();
        Self {
            email: user.email().to_string(),
            name: user.display_name().to_string(),
            roles,
            permissions,
        }
    }
}

/// What a token being issued grants.
#[derive(Debug, Clone, Copy)]
pub enum TokenGrant<'a> {
    Access(&'a AccessDetails),
    Refresh,
}

impl TokenGrant<'_> {
    #[must_use]
    pub fn kind(&self) -> TokenKind {
        match self {
            Self::Access(_) => TokenKind::Access,
            Self::Refresh => TokenKind::Refresh,
        }
    }
}

/// Claims as they appear on the wire.
///
/// Kind-specific claims are optional here and checked against the kind after
/// the signature has been verified.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireClaims {
    #[serde(rename = "iss")]
    issuer: String,
    #[serde(rename = "aud")]
    audience: String,
    #[serde(rename = "sub", default, skip_serializing_if = "Option::is_none")]
    subject: Option<String>,
    #[serde(rename = "iat")]
    issued_at: i64,
    #[serde(rename = "exp")]
    expires_at: i64,
    #[serde(rename = "typ")]
    kind: TokenKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    roles: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    permissions: Option<BTreeSet<String>>,
}

impl WireClaims {
    fn into_access_details(self) -> Result<AccessDetails, TokenError> {
        let missing = |claim: &str| TokenError::MissingClaim {
            claim: claim.to_string(),
        };
        Ok(AccessDetails {
            email: self.email.ok_or_else(|| missing("email"))?,
            name: self.name.ok_or_else(|| missing("name"))?,
            roles: self.roles.ok_or_else(|| missing("roles"))?,
            permissions: self.permissions.ok_or_else(|| missing("permissions"))?,
        })
    }
}

/// Verified claims of a validated token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    subject: UserId,
    kind: TokenKind,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    access: Option<AccessDetails>,
}

impl Claims {
    /// Returns the user the token was issued to.
    #[must_use]
    pub fn subject(&self) -> UserId {
        self.subject
    }

    #[must_use]
    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    #[must_use]
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns the access details. Always present on access tokens, never on
    /// refresh tokens.
    #[must_use]
    pub fn access(&self) -> Option<&AccessDetails> {
        self.access.as_ref()
    }

    /// Consumes the claims, returning the access details.
    #[must_use]
    pub fn into_access(self) -> Option<AccessDetails> {
        self.access
    }
}

/// A freshly signed token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// An access and refresh token issued together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds from issuance until the access token expires.
    pub expires_in: i64,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Lifetimes of issued tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetimes {
    pub access: Duration,
    pub refresh: Duration,
}

impl TokenLifetimes {
    /// Access token lifetime when none is configured.
    pub const DEFAULT_ACCESS: Duration = Duration::minutes(15);
    /// Refresh token lifetime when none is configured.
    pub const DEFAULT_REFRESH: Duration = Duration::days(7);

    #[must_use]
    pub fn for_kind(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access,
            TokenKind::Refresh => self.refresh,
        }
    }
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access: Self::DEFAULT_ACCESS,
            refresh: Self::DEFAULT_REFRESH,
        }
    }
}

/// Signs and verifies session tokens with a shared HS256 secret.
#[derive(Clone)]
pub struct TokenCodec {
    secret_configured: bool,
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetimes: TokenLifetimes,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("secret_configured", &self.secret_configured)
            .field("lifetimes", &self.lifetimes)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Creates a codec for the given secret.
    ///
    /// An empty secret is accepted here so configuration problems surface as
    /// typed errors on first use rather than at construction.
    #[must_use]
    pub fn new(secret: &[u8], lifetimes: TokenLifetimes) -> Self {
        Self {
            secret_configured: !secret.is_empty(),
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            lifetimes,
        }
    }

    #[must_use]
    pub fn lifetimes(&self) -> TokenLifetimes {
        self.lifetimes
    }

    /// Issues a token valid for `ttl` from now.
    pub fn issue(
        &self,
        grant: TokenGrant<'_>,
        subject: UserId,
        ttl: Duration,
    ) -> Result<IssuedToken, Report<TokenError>> {
        self.issue_at(grant, subject, ttl, Utc::now())
    }

    /// Issues a token valid for `ttl` from `now`.
    pub fn issue_at(
        &self,
        grant: TokenGrant<'_>,
        subject: UserId,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, Report<TokenError>> {
        if !self.secret_configured {
            return Err(TokenError::MissingSecret.into());
        }

        let issued_at = now.timestamp();
        let expires_at = issued_at
            .checked_add(ttl.num_seconds())
            .ok_or_else(|| TokenError::Signing {
                reason: "expiry out of range".to_string(),
            })?;
        let details = match grant {
            TokenGrant::Access(details) => Some(details),
            TokenGrant::Refresh => None,
        };
        let claims = WireClaims {
            issuer: ISSUER.to_string(),
            audience: AUDIENCE.to_string(),
            subject: Some(subject.to_string()),
            issued_at,
            expires_at,
            kind: grant.kind(),
            email: details.map(|d| d.email.clone()),
            name: details.map(|d| d.name.clone()),
            roles: details.map(|d| d.roles.clone()),
            permissions: details.map(|d| d.permissions.clone()),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(
            |e| TokenError::Signing {
                reason: e.to_string(),
            },
        )?;

        let expires_at = timestamp(expires_at).map_err(|_| TokenError::Signing {
            reason: format!("expiry out of range: {expires_at}"),
        })?;

        Ok(IssuedToken { token, expires_at })
    }

    /// Issues an access and refresh token from the same instant.
    ///
    /// Either both tokens are returned or neither is.
    pub fn issue_pair_at(
        &self,
        subject: UserId,
        details: &AccessDetails,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, Report<TokenError>> {
        let lifetimes = self.lifetimes;
        let access = self.issue_at(
            TokenGrant::Access(details),
            subject,
            lifetimes.for_kind(TokenKind::Access),
            now,
        )?;
        let refresh = self.issue_at(
            TokenGrant::Refresh,
            subject,
            lifetimes.for_kind(TokenKind::Refresh),
            now,
        )?;

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
            expires_in: access.expires_at.timestamp() - now.timestamp(),
            access_expires_at: access.expires_at,
            refresh_expires_at: refresh.expires_at,
        })
    }

    /// Validates a token of the expected kind against the current time.
    pub fn validate(&self, token: &str, expected: TokenKind) -> Result<Claims, Report<TokenError>> {
        self.validate_at(token, expected, Utc::now())
    }

    /// Validates a token of the expected kind against `now`.
    ///
    /// A token is expired iff `now` is strictly after its expiry instant.
    pub fn validate_at(
        &self,
        token: &str,
        expected: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<Claims, Report<TokenError>> {
        self.verify(token, expected, now).map_err(|e| {
            debug!(error = %e, expected = %expected, "token rejected");
            Report::from(e)
        })
    }

    fn verify(
        &self,
        token: &str,
        expected: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<Claims, TokenError> {
        if !self.secret_configured {
            return Err(TokenError::MissingSecret);
        }

        let claims = decode::<WireClaims>(token, &self.decoding, &Self::validation())
            .map_err(classify)?
            .claims;

        if now.timestamp() > claims.expires_at {
            return Err(TokenError::Expired);
        }
        if claims.kind != expected {
            return Err(TokenError::WrongKind {
                expected: expected.to_string(),
                found: claims.kind.to_string(),
            });
        }

        let subject = claims
            .subject
            .as_deref()
            .ok_or_else(|| TokenError::MissingClaim {
                claim: "sub".to_string(),
            })?;
        let subject = subject
            .parse::<UserId>()
            .map_err(|_| TokenError::InvalidSubject {
                subject: subject.to_string(),
            })?;
        let issued_at = timestamp(claims.issued_at)?;
        let expires_at = timestamp(claims.expires_at)?;
        let kind = claims.kind;

        let access = match kind {
            TokenKind::Access => Some(claims.into_access_details()?),
            TokenKind::Refresh => {
                if claims.roles.is_some() || claims.permissions.is_some() {
                    return Err(TokenError::Malformed {
                        reason: "refresh token carries authorization claims".to_string(),
                    });
                }
                None
            }
        };

        Ok(Claims {
            subject,
            kind,
            issued_at,
            expires_at,
            access,
        })
    }

    fn validation() -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is compared against the caller's clock in `verify`.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.leeway = 0;
        validation.set_audience(&[AUDIENCE]);
        validation.set_issuer(&[ISSUER]);
        validation.set_required_spec_claims(&["iss", "aud", "sub", "exp"]);
        validation
    }
}

fn timestamp(seconds: i64) -> Result<DateTime<Utc>, TokenError> {
    DateTime::from_timestamp(seconds, 0).ok_or_else(|| TokenError::Malformed {
        reason: format!("timestamp out of range: {seconds}"),
    })
}

fn classify(err: JwtError) -> TokenError {
    match err.kind() {
        JwtErrorKind::InvalidSignature => TokenError::InvalidSignature,
        JwtErrorKind::InvalidAlgorithm | JwtErrorKind::InvalidAlgorithmName => {
            TokenError::AlgorithmMismatch
        }
        JwtErrorKind::ExpiredSignature => TokenError::Expired,
        JwtErrorKind::InvalidIssuer => TokenError::UntrustedOrigin {
            reason: "issuer".to_string(),
        },
        JwtErrorKind::InvalidAudience => TokenError::UntrustedOrigin {
            reason: "audience".to_string(),
        },
        JwtErrorKind::MissingRequiredClaim(claim) => TokenError::MissingClaim {
            claim: claim.clone(),
        },
        _ => TokenError::Malformed {
            reason: err.to_string(),
        },
    }
}
