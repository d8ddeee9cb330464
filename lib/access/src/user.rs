//! User domain type.
//!
//! A user is identified by the subject id the external identity provider
//! assigns. The internal `UserId` is used for everything else, including the
//! subject of issued session tokens.

use crate::federation::ExternalProfile;
use crate::group::Group;
use crate::role::RoleRef;
use chrono::{DateTime, Utc};
use gatehouse_core::UserId;
use serde::{Deserialize, Serialize};

/// A registered user together with its role and group assignments.
///
/// Profile fields mirror the identity provider and are overwritten on every
/// login. Role and group assignments change only through administrative
/// operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Internal user ID.
    id: UserId,
    /// Subject id from the identity provider. Unique.
    external_id: String,
    email: String,
    display_name: String,
    /// Avatar image URL, if the provider supplied one.
    avatar_url: Option<String>,
    /// Roles assigned directly to the user.
    roles: Vec<RoleRef>,
    /// Groups the user belongs to, each with its roles.
    groups: Vec<Group>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl User {
    /// Creates a new user from a provider profile.
    ///
    /// The user ID is generated automatically. Use this the first time an
    /// external subject id is seen.
    #[must_use]
    pub fn from_profile(profile: &ExternalProfile, roles: Vec<RoleRef>) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::new(),
            external_id: profile.external_id.clone(),
            email: profile.email.clone(),
            display_name: profile.name.clone(),
            avatar_url: profile.avatar_url.clone(),
            roles,
            groups: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a user with all fields specified.
    ///
    /// Use this when reconstituting a user from storage.
    #[must_use]
    #[expect(clippy::too_many_arguments)]
    pub fn with_all_fields(
        id: UserId,
        external_id: String,
        email: String,
        display_name: String,
        avatar_url: Option<String>,
        roles: Vec<RoleRef>,
        groups: Vec<Group>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            external_id,
            email,
            display_name,
            avatar_url,
            roles,
            groups,
            created_at,
            updated_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> UserId {
        self.id
    }

    /// Returns the identity provider's subject id.
    #[must_use]
    pub fn external_id(&self) -> &str {
        &self.external_id
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub fn avatar_url(&self) -> Option<&str> {
        self.avatar_url.as_deref()
    }

    /// Returns the directly assigned roles.
    #[must_use]
    pub fn roles(&self) -> &[RoleRef] {
        &self.roles
    }

    #[must_use]
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Returns the names of the groups the user belongs to.
    #[must_use]
    pub fn group_names(&self) -> Vec<String> {
        self.groups.iter().map(|g| g.name().to_string()).collect()
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Overwrites email, name and avatar from a fresh provider profile.
    ///
    /// Roles and groups are left untouched.
    pub fn apply_profile(&mut self, profile: &ExternalProfile) {
        self.email = profile.email.clone();
        self.display_name = profile.name.clone();
        self.avatar_url = profile.avatar_url.clone();
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::DefaultRole;

    fn profile(external_id: &str) -> ExternalProfile {
        ExternalProfile {
            external_id: external_id.to_string(),
            email: "alice@example.com".to_string(),
            name: "Alice".to_string(),
            avatar_url: Some("https://example.com/alice.png".to_string()),
        }
    }

    #[test]
    fn new_user_has_generated_id() {
        let user = User::from_profile(&profile("g-1"), Vec::new());
        assert!(user.id().to_string().starts_with("usr_"));
    }

    #[test]
    fn new_user_copies_profile() {
        let user = User::from_profile(&profile("g-1"), Vec::new());

        assert_eq!(user.external_id(), "g-1");
        assert_eq!(user.email(), "alice@example.com");
        assert_eq!(user.display_name(), "Alice");
        assert_eq!(user.avatar_url(), Some("https://example.com/alice.png"));
        assert!(user.groups().is_empty());
        assert_eq!(user.created_at(), user.updated_at());
    }

    #[test]
    fn apply_profile_keeps_assignments() {
        let role = DefaultRole::User.to_role();
        let mut user = User::from_profile(&profile("g-1"), vec![role.clone().into()]);
        let original_updated_at = user.updated_at();

        std::thread::sleep(std::time::Duration::from_millis(1));

        user.apply_profile(&ExternalProfile {
            external_id: "g-1".to_string(),
            email: "alice@corp.example.com".to_string(),
            name: "Alice Liddell".to_string(),
            avatar_url: None,
        });

        assert_eq!(user.email(), "alice@corp.example.com");
        assert_eq!(user.display_name(), "Alice Liddell");
        assert!(user.avatar_url().is_none());
        assert_eq!(user.roles().len(), 1);
        assert_eq!(user.roles()[0].id(), role.id());
        assert!(user.updated_at() > original_updated_at);
    }

    #[test]
    fn group_names_follow_membership() {
        let user = User::with_all_fields(
            UserId::new(),
            "g-2".to_string(),
            "bob@example.com".to_string(),
            "Bob".to_string(),
            None,
            Vec::new(),
            vec![
                Group::new("ops", "", Vec::new()),
                Group::new("support", "", Vec::new()),
            ],
            Utc::now(),
            Utc::now(),
        );
        assert_eq!(user.group_names(), vec!["ops", "support"]);
    }

    #[test]
    fn user_serialization_roundtrip() {
        let user = User::from_profile(&profile("g-3"), vec![DefaultRole::Admin.to_role().into()]);

        let json = serde_json::to_string(&user).expect("serialize");
        let parsed: User = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(user, parsed);
    }
}
