//! Request gating: bearer token authentication and role/permission checks.
//!
//! A request moves through three states. It starts unauthenticated, becomes
//! authenticated once its bearer access token validates (yielding a
//! [`Principal`]), and is then authorized or denied by a [`Gate`]'s
//! requirements, checked in the order they were declared.

use crate::error::{AccessError, escalate};
use crate::token::{Claims, TokenCodec, TokenKind};
use gatehouse_core::UserId;
use rootcause::prelude::Report;
use std::collections::BTreeSet;
use std::fmt;

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    user_id: UserId,
    email: String,
    name: String,
    roles: BTreeSet<String>,
    permissions: BTreeSet<String>,
}

impl Principal {
    /// Builds a principal from validated access-token claims.
    pub fn from_claims(claims: Claims) -> Result<Self, AccessError> {
        let user_id = claims.subject();
        let details = claims
            .into_access()
            .ok_or_else(|| AccessError::unauthenticated("token carries no access claims"))?;
        Ok(Self {
            user_id,
            email: details.email,
            name: details.name,
            roles: details.roles,
            permissions: details.permissions,
        })
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    #[must_use]
    pub fn permissions(&self) -> &BTreeSet<String> {
        &self.permissions
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    /// Returns true if the principal holds the built-in admin role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.has_role(crate::role::DefaultRole::Admin.name())
    }
}

/// A predicate a principal must satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Role(String),
    Permission(String),
}

impl Requirement {
    #[must_use]
    pub fn is_met_by(&self, principal: &Principal) -> bool {
        match self {
            Self::Role(role) => principal.has_role(role),
            Self::Permission(permission) => principal.has_permission(permission),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Role(role) => write!(f, "role '{role}'"),
            Self::Permission(permission) => write!(f, "permission '{permission}'"),
        }
    }
}

/// An ordered list of requirements.
///
/// An empty gate admits every authenticated principal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Gate {
    requirements: Vec<Requirement>,
}

impl Gate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn require_role(mut self, role: impl Into<String>) -> Self {
        self.requirements.push(Requirement::Role(role.into()));
        self
    }

    #[must_use]
    pub fn require_permission(mut self, permission: impl Into<String>) -> Self {
        self.requirements
            .push(Requirement::Permission(permission.into()));
        self
    }

    #[must_use]
    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// Checks the requirements in order; the first unmet one is reported.
    pub fn check(&self, principal: &Principal) -> Result<(), AccessError> {
        match self.requirements.iter().find(|r| !r.is_met_by(principal)) {
            Some(unmet) => Err(AccessError::AccessDenied {
                requirement: unmet.to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// Authenticates requests from their `Authorization` header.
#[derive(Debug, Clone)]
pub struct AccessGate {
    codec: TokenCodec,
}

impl AccessGate {
    #[must_use]
    pub fn new(codec: TokenCodec) -> Self {
        Self { codec }
    }

    /// Validates the bearer access token in an `Authorization` header value.
    pub fn authenticate(&self, authorization: Option<&str>) -> Result<Principal, Report<AccessError>> {
        let header =
            authorization.ok_or_else(|| AccessError::unauthenticated("missing bearer token"))?;
        let token = bearer_token(header)
            .ok_or_else(|| AccessError::unauthenticated("authorization scheme must be Bearer"))?;

        let claims = self
            .codec
            .validate(token, TokenKind::Access)
            .map_err(escalate)?;
        Ok(Principal::from_claims(claims)?)
    }

    /// Authenticates a request and then applies a gate to it.
    pub fn authorize(
        &self,
        authorization: Option<&str>,
        gate: &Gate,
    ) -> Result<Principal, Report<AccessError>> {
        let principal = self.authenticate(authorization)?;
        gate.check(&principal)?;
        Ok(principal)
    }
}

/// Extracts the token from a `Bearer <token>` header value.
///
/// The scheme is matched case-insensitively.
#[must_use]
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{AccessDetails, TokenGrant, TokenLifetimes};

    fn codec() -> TokenCodec {
        TokenCodec::new(b"gate-test-secret", TokenLifetimes::default())
    }

    fn details(roles: &[&str], permissions: &[&str]) -> AccessDetails {
        AccessDetails {
            email: "frank@example.com".to_string(),
            name: "Frank".to_string(),
            roles: roles.iter().map(|s| (*s).to_string()).collect(),
            permissions: permissions.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    fn bearer(details: &AccessDetails) -> String {
        let issued = codec()
            .issue(
                TokenGrant::Access(details),
                UserId::new(),
                TokenLifetimes::DEFAULT_ACCESS,
            )
            .expect("issue");
        format!("Bearer {}", issued.token)
    }

    fn kind_of(result: Result<Principal, Report<AccessError>>) -> AccessError {
        result.expect_err("should be rejected").current_context().clone()
    }

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer   abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer"), None);
        assert_eq!(bearer_token("Bearer  "), None);
    }

    #[test]
    fn missing_header_is_unauthenticated() {
        let gate = AccessGate::new(codec());
        assert!(matches!(
            kind_of(gate.authenticate(None)),
            AccessError::Unauthenticated { .. }
        ));
    }

    #[test]
    fn invalid_token_is_unauthenticated() {
        let gate = AccessGate::new(codec());
        assert!(matches!(
            kind_of(gate.authenticate(Some("Bearer not-a-token"))),
            AccessError::Unauthenticated { .. }
        ));
    }

    #[test]
    fn refresh_token_is_not_a_bearer_credential() {
        let refresh = codec()
            .issue(
                TokenGrant::Refresh,
                UserId::new(),
                TokenLifetimes::DEFAULT_REFRESH,
            )
            .expect("issue");
        let gate = AccessGate::new(codec());
        assert!(matches!(
            kind_of(gate.authenticate(Some(&format!("Bearer {}", refresh.token)))),
            AccessError::Unauthenticated { .. }
        ));
    }

    #[test]
    fn valid_token_yields_principal() {
        let gate = AccessGate::new(codec());
        let principal = gate
            .authenticate(Some(&bearer(&details(&["user"], &["profile:read"]))))
            .expect("authenticate");

        assert!(principal.has_role("user"));
        assert!(principal.has_permission("profile:read"));
        assert!(!principal.is_admin());
        assert_eq!(principal.email(), "frank@example.com");
    }

    #[test]
    fn requirements_are_checked_in_order() {
        let principal = AccessGate::new(codec())
            .authenticate(Some(&bearer(&details(&["user"], &["profile:read"]))))
            .expect("authenticate");

        let gate = Gate::new()
            .require_permission("profile:read")
            .require_role("admin")
            .require_permission("users:write");

        assert_eq!(
            gate.check(&principal),
            Err(AccessError::AccessDenied {
                requirement: "role 'admin'".to_string(),
            })
        );
    }

    #[test]
    fn empty_gate_admits_any_principal() {
        let principal = AccessGate::new(codec())
            .authenticate(Some(&bearer(&details(&[], &[]))))
            .expect("authenticate");
        assert!(Gate::new().check(&principal).is_ok());
    }

    #[test]
    fn authorize_denies_missing_permission() {
        let gate = AccessGate::new(codec());
        let header = bearer(&details(&["admin"], &["users:read"]));
        let admin_gate = Gate::new()
            .require_role("admin")
            .require_permission("groups:write");

        assert_eq!(
            kind_of(gate.authorize(Some(&header), &admin_gate)),
            AccessError::AccessDenied {
                requirement: "permission 'groups:write'".to_string(),
            }
        );
        assert!(
            gate.authorize(Some(&header), &Gate::new().require_role("admin"))
                .is_ok()
        );
    }
}
