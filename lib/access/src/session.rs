//! Session issuance: federated login and token refresh.
//!
//! A login exchanges a provider authorization code for a profile, registers
//! or refreshes the matching user, resolves its access and signs a token
//! pair. The first user ever registered becomes an administrator.

use crate::error::{AccessError, escalate};
use crate::federation::{ExternalProfile, IdentityFederator};
use crate::permissions::{ResolvedAccess, resolve};
use crate::role::DefaultRole;
use crate::store::IdentityStore;
use crate::token::{AccessDetails, TokenCodec, TokenKind};
use crate::user::User;
use chrono::Utc;
use gatehouse_core::UserId;
use rootcause::prelude::Report;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, instrument};

/// What callers get to see about a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub email: String,
    pub name: String,
    #[serde(rename = "picture")]
    pub avatar_url: Option<String>,
    /// Names of the groups the user belongs to.
    pub groups: Vec<String>,
    /// Effective role names.
    pub roles: BTreeSet<String>,
    /// Effective permissions.
    pub permissions: BTreeSet<String>,
}

impl UserSummary {
    #[must_use]
    pub fn new(user: &User, access: &ResolvedAccess) -> Self {
        Self {
            id: user.id(),
            email: user.email().to_string(),
            name: user.display_name().to_string(),
            avatar_url: user.avatar_url().map(str::to_string),
            groups: user.group_names(),
            roles: access.roles().clone(),
            permissions: access.permissions().clone(),
        }
    }

    /// Summarizes a user, resolving its access from its current assignments.
    #[must_use]
    pub fn resolve(user: &User) -> Self {
        Self::new(user, &resolve(user))
    }
}

/// A signed-in session: the user and a fresh token pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub user: UserSummary,
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until the access token expires.
    pub expires_in: i64,
}

/// Signs users in and keeps their sessions fresh.
#[derive(Clone)]
pub struct SessionIssuer {
    store: Arc<dyn IdentityStore>,
    federator: Arc<dyn IdentityFederator>,
    codec: TokenCodec,
}

impl SessionIssuer {
    #[must_use]
    pub fn new(
        store: Arc<dyn IdentityStore>,
        federator: Arc<dyn IdentityFederator>,
        codec: TokenCodec,
    ) -> Self {
        Self {
            store,
            federator,
            codec,
        }
    }

    /// Completes a federated login for an authorization code.
    #[instrument(skip_all)]
    pub async fn login(&self, code: &str) -> Result<Session, Report<AccessError>> {
        if code.trim().is_empty() {
            return Err(AccessError::validation("missing authorization code").into());
        }

        let provider_token = self.federator.exchange_code(code).await.map_err(escalate)?;
        let profile = self
            .federator
            .fetch_profile(&provider_token)
            .await
            .map_err(escalate)?;

        let user = self.register_or_update(&profile).await?;
        self.open_session(&user)
    }

    /// Issues a fresh token pair for a valid refresh token.
    ///
    /// Access is re-resolved from the user's current assignments, so role
    /// changes made since the last login take effect here.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<Session, Report<AccessError>> {
        let claims = self
            .codec
            .validate(refresh_token, TokenKind::Refresh)
            .map_err(escalate)?;

        let user = self
            .store
            .find_user_by_id(claims.subject())
            .await
            .map_err(escalate)?
            .ok_or_else(|| AccessError::unauthenticated("user no longer exists"))?;

        info!(user_id = %user.id(), "refreshed session");
        self.open_session(&user)
    }

    /// Returns the summary of a signed-in user.
    #[instrument(skip(self))]
    pub async fn profile(&self, user_id: UserId) -> Result<UserSummary, Report<AccessError>> {
        let user = self
            .store
            .find_user_by_id(user_id)
            .await
            .map_err(escalate)?
            .ok_or_else(|| AccessError::NotFound {
                entity: "user",
                id: user_id.to_string(),
            })?;
        Ok(UserSummary::resolve(&user))
    }

    async fn register_or_update(
        &self,
        profile: &ExternalProfile,
    ) -> Result<User, Report<AccessError>> {
        let existing = self
            .store
            .find_user_by_external_id(&profile.external_id)
            .await
            .map_err(escalate)?;

        if let Some(mut user) = existing {
            user.apply_profile(profile);
            self.store.update_user(&user).await.map_err(escalate)?;
            info!(user_id = %user.id(), "user signed in");
            return Ok(user);
        }

        let defaults = self
            .store
            .find_or_create_default_roles()
            .await
            .map_err(escalate)?;
        let registered = self.store.count_users().await.map_err(escalate)?;
        let initial = if registered == 0 {
            DefaultRole::Admin
        } else {
            DefaultRole::User
        };

        let user = User::from_profile(profile, vec![defaults.get(initial).clone().into()]);
        let user = self.store.create_user(&user).await.map_err(escalate)?;
        info!(user_id = %user.id(), role = %initial, "registered new user");
        Ok(user)
    }

    fn open_session(&self, user: &User) -> Result<Session, Report<AccessError>> {
        let access = resolve(user);
        let details = AccessDetails::new(user, access.clone());
        let pair = self
            .codec
            .issue_pair_at(user.id(), &details, Utc::now())
            .map_err(escalate)?;

        Ok(Session {
            user: UserSummary::new(user, &access),
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            expires_in: pair.expires_in,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FederationError;
    use crate::federation::ScriptedFederator;
    use crate::memory::MemoryStore;
    use crate::token::{TokenGrant, TokenLifetimes};

    struct Harness {
        store: Arc<MemoryStore>,
        federator: Arc<ScriptedFederator>,
        codec: TokenCodec,
        issuer: SessionIssuer,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let federator = Arc::new(ScriptedFederator::new());
        let codec = TokenCodec::new(b"session-test-secret", TokenLifetimes::default());
        let issuer = SessionIssuer::new(store.clone(), federator.clone(), codec.clone());
        Harness {
            store,
            federator,
            codec,
            issuer,
        }
    }

    fn profile(external_id: &str, email: &str) -> ExternalProfile {
        ExternalProfile {
            external_id: external_id.to_string(),
            email: email.to_string(),
            name: external_id.to_uppercase(),
            avatar_url: Some(format!("https://example.com/{external_id}.png")),
        }
    }

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test]
    async fn first_user_is_admin_and_later_users_are_not() {
        let h = harness();
        for (code, id) in [("c1", "ext-1"), ("c2", "ext-2"), ("c3", "ext-3")] {
            h.federator
                .register(code, profile(id, &format!("{id}@example.com")));
        }

        let mut roles = Vec::new();
        for code in ["c1", "c2", "c3"] {
            let session = h.issuer.login(code).await.expect("login");
            roles.push(session.user.roles.clone());
        }

        assert_eq!(roles, vec![names(&["admin"]), names(&["user"]), names(&["user"])]);
    }

    #[tokio::test]
    async fn login_returns_verifiable_token_pair() {
        let h = harness();
        h.federator.register("c1", profile("ext-1", "erin@example.com"));

        let session = h.issuer.login("c1").await.expect("login");
        assert_eq!(session.expires_in, 900);
        assert_eq!(session.user.email, "erin@example.com");
        assert_eq!(session.user.avatar_url.as_deref(), Some("https://example.com/ext-1.png"));

        let claims = h
            .codec
            .validate(&session.access_token, TokenKind::Access)
            .expect("access token");
        let details = claims.access().expect("access details");
        assert_eq!(claims.subject(), session.user.id);
        assert_eq!(details.roles, session.user.roles);
        assert_eq!(details.permissions, session.user.permissions);

        let refresh = h
            .codec
            .validate(&session.refresh_token, TokenKind::Refresh)
            .expect("refresh token");
        assert_eq!(refresh.subject(), session.user.id);
    }

    #[tokio::test]
    async fn returning_user_gets_profile_refreshed_and_keeps_roles() {
        let h = harness();
        h.federator.register("c1", profile("ext-1", "old@example.com"));
        let first = h.issuer.login("c1").await.expect("login");

        h.federator.register("c2", profile("ext-1", "new@example.com"));
        let second = h.issuer.login("c2").await.expect("login");

        assert_eq!(first.user.id, second.user.id);
        assert_eq!(second.user.email, "new@example.com");
        assert_eq!(second.user.roles, names(&["admin"]));
        assert_eq!(h.store.count_users().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn refresh_picks_up_new_roles() {
        let h = harness();
        h.federator.register("c1", profile("ext-1", "a@example.com"));
        h.federator.register("c2", profile("ext-2", "b@example.com"));
        h.issuer.login("c1").await.expect("bootstrap admin");
        let session = h.issuer.login("c2").await.expect("login");
        assert_eq!(session.user.roles, names(&["user"]));

        let defaults = h
            .store
            .find_or_create_default_roles()
            .await
            .expect("roles");
        h.store
            .replace_user_roles(session.user.id, &[defaults.user.id(), defaults.admin.id()])
            .await
            .expect("grant admin");

        let refreshed = h
            .issuer
            .refresh(&session.refresh_token)
            .await
            .expect("refresh");
        let claims = h
            .codec
            .validate(&refreshed.access_token, TokenKind::Access)
            .expect("access token");
        let details = claims.access().expect("access details");
        assert!(details.roles.contains("admin"));
        assert!(details.permissions.contains("users:write"));
    }

    #[tokio::test]
    async fn refresh_rejects_access_tokens() {
        let h = harness();
        h.federator.register("c1", profile("ext-1", "a@example.com"));
        let session = h.issuer.login("c1").await.expect("login");

        let err = h
            .issuer
            .refresh(&session.access_token)
            .await
            .expect_err("access token must not refresh");
        assert!(matches!(
            err.current_context(),
            AccessError::Unauthenticated { .. }
        ));
    }

    #[tokio::test]
    async fn refresh_for_unknown_subject_is_unauthenticated() {
        let h = harness();
        let orphan = h
            .codec
            .issue(
                TokenGrant::Refresh,
                UserId::new(),
                TokenLifetimes::DEFAULT_REFRESH,
            )
            .expect("issue");

        let err = h
            .issuer
            .refresh(&orphan.token)
            .await
            .expect_err("unknown user");
        assert!(matches!(
            err.current_context(),
            AccessError::Unauthenticated { .. }
        ));
    }

    #[tokio::test]
    async fn provider_failure_is_a_federation_error() {
        let h = harness();
        h.federator.register("c1", profile("ext-1", "a@example.com"));
        h.federator.fail_with(FederationError::Timeout {
            operation: "code exchange".to_string(),
        });

        let err = h.issuer.login("c1").await.expect_err("provider down");
        assert!(matches!(err.current_context(), AccessError::Federation { .. }));
        assert_eq!(h.store.count_users().await.expect("count"), 0);
    }

    #[tokio::test]
    async fn empty_code_is_a_validation_error() {
        let h = harness();
        let err = h.issuer.login("  ").await.expect_err("empty code");
        assert!(matches!(err.current_context(), AccessError::Validation { .. }));
    }

    #[tokio::test]
    async fn unsigned_issuer_fails_login_without_tokens() {
        let store = Arc::new(MemoryStore::new());
        let federator = Arc::new(ScriptedFederator::new());
        federator.register("c1", profile("ext-1", "a@example.com"));
        let issuer = SessionIssuer::new(
            store,
            federator,
            TokenCodec::new(b"", TokenLifetimes::default()),
        );

        let err = issuer.login("c1").await.expect_err("no secret");
        assert!(matches!(err.current_context(), AccessError::Internal { .. }));
    }

    #[tokio::test]
    async fn profile_reports_group_names() {
        let h = harness();
        h.federator.register("c1", profile("ext-1", "a@example.com"));
        let session = h.issuer.login("c1").await.expect("login");

        let group = h
            .store
            .create_group(&crate::group::Group::new("ops", "", Vec::new()))
            .await
            .expect("group");
        h.store
            .replace_user_groups(session.user.id, &[group.id()])
            .await
            .expect("assign");

        let summary = h.issuer.profile(session.user.id).await.expect("profile");
        assert_eq!(summary.groups, vec!["ops"]);
        assert_eq!(summary.roles, names(&["admin"]));
    }
}
