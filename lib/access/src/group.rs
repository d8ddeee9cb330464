//! Groups: named collections of users that share roles.
//!
//! Group membership is one level deep. A group carries roles, never other
//! groups.

use crate::role::RoleRef;
use chrono::{DateTime, Utc};
use gatehouse_core::GroupId;
use serde::{Deserialize, Serialize};

/// A named group whose roles apply to every member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    id: GroupId,
    /// Unique group name.
    name: String,
    description: String,
    roles: Vec<RoleRef>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Group {
    /// Creates a new group with a generated ID and the given roles.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, roles: Vec<RoleRef>) -> Self {
        let now = Utc::now();
        Self {
            id: GroupId::new(),
            name: name.into(),
            description: description.into(),
            roles,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a group with all fields specified.
    ///
    /// Use this when reconstituting a group from storage.
    #[must_use]
    pub fn with_all_fields(
        id: GroupId,
        name: String,
        description: String,
        roles: Vec<RoleRef>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            description,
            roles,
            created_at,
            updated_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> GroupId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the roles granted to members of this group.
    #[must_use]
    pub fn roles(&self) -> &[RoleRef] {
        &self.roles
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::{DefaultRole, Role};

    #[test]
    fn new_group_has_generated_id() {
        let group = Group::new("ops", "Operations", Vec::new());
        assert!(group.id().to_string().starts_with("grp_"));
        assert_eq!(group.created_at(), group.updated_at());
    }

    #[test]
    fn new_group_keeps_roles_in_order() {
        let admin = DefaultRole::Admin.to_role();
        let auditor = Role::new("auditor", "", ["users:read"]);
        let group = Group::new(
            "ops",
            "Operations",
            vec![admin.clone().into(), auditor.clone().into()],
        );

        let ids: Vec<_> = group.roles().iter().map(RoleRef::id).collect();
        assert_eq!(ids, vec![admin.id(), auditor.id()]);
    }

    #[test]
    fn with_all_fields_preserves_values() {
        let id = GroupId::new();
        let created = Utc::now() - chrono::Duration::days(3);
        let updated = Utc::now();
        let group = Group::with_all_fields(
            id,
            "support".to_string(),
            "Support desk".to_string(),
            Vec::new(),
            created,
            updated,
        );

        assert_eq!(group.id(), id);
        assert_eq!(group.name(), "support");
        assert_eq!(group.description(), "Support desk");
        assert!(group.roles().is_empty());
        assert_eq!(group.created_at(), created);
        assert_eq!(group.updated_at(), updated);
    }
}
