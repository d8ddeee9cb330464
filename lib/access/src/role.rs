//! Roles and the permission strings they grant.
//!
//! A role is a named bundle of free-form capability strings such as
//! `users:read`. Users receive roles directly or through group membership.
//! Two roles are built in and created on first use; see [`DefaultRole`].

use chrono::{DateTime, Utc};
use gatehouse_core::RoleId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A named set of permissions.
///
/// Role names are unique across the system and permission strings within a
/// role are unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    id: RoleId,
    name: String,
    description: String,
    permissions: BTreeSet<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Role {
    /// Creates a new role with a generated ID.
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, description: impl Into<String>, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let now = Utc::now();
        Self {
            id: RoleId::new(),
            name: name.into(),
            description: description.into(),
            permissions: permissions.into_iter().map(Into::into).collect(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a role with all fields specified.
    ///
    /// Use this when reconstituting a role from storage.
    #[must_use]
    pub fn with_all_fields(
        id: RoleId,
        name: String,
        description: String,
        permissions: BTreeSet<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            description,
            permissions,
            created_at,
            updated_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> RoleId {
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

    /// Returns the permissions this role grants.
    #[must_use]
    pub fn permissions(&self) -> &BTreeSet<String> {
        &self.permissions
    }

    /// Returns true if this role grants the given permission.
    #[must_use]
    pub fn grants(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
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

/// The built-in roles every installation starts with.
///
/// The first user ever registered receives `Admin`; everyone after that
/// receives `User`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultRole {
    /// System administrator.
    Admin,
    /// Regular user.
    User,
}

impl DefaultRole {
    /// Every built-in role, in creation order.
    pub const ALL: [Self; 2] = [Self::Admin, Self::User];

    /// Returns the unique role name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Admin => "System administrator",
            Self::User => "Regular user",
        }
    }

    /// Returns the permissions granted by this role.
    #[must_use]
    pub fn permissions(self) -> &'static [&'static str] {
        match self {
            Self::Admin => &[
                "users:read",
                "users:write",
                "groups:read",
                "groups:write",
                "roles:read",
                "roles:write",
            ],
            Self::User => &["profile:read"],
        }
    }

    /// Returns true if this role has admin privileges.
    #[must_use]
    pub fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }

    /// Builds a fresh `Role` from the canonical table.
    #[must_use]
    pub fn to_role(self) -> Role {
        Role::new(
            self.name(),
            self.description(),
            self.permissions().iter().copied(),
        )
    }
}

impl fmt::Display for DefaultRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The stored records of both built-in roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultRoles {
    pub admin: Role,
    pub user: Role,
}

impl DefaultRoles {
    /// Returns the stored record for a built-in role.
    #[must_use]
    pub fn get(&self, role: DefaultRole) -> &Role {
        match role {
            DefaultRole::Admin => &self.admin,
            DefaultRole::User => &self.user,
        }
    }
}

/// A reference from a user or group to a role.
///
/// `role` is `None` when the referenced role no longer exists. Dangling
/// references are kept so the assignment survives, but they grant nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRef {
    id: RoleId,
    role: Option<Role>,
}

impl RoleRef {
    /// A reference to a role that exists.
    #[must_use]
    pub fn resolved(role: Role) -> Self {
        Self {
            id: role.id(),
            role: Some(role),
        }
    }

    /// A reference to a role that could not be found.
    #[must_use]
    pub fn dangling(id: RoleId) -> Self {
        Self { id, role: None }
    }

    #[must_use]
    pub fn id(&self) -> RoleId {
        self.id
    }

    /// Returns the referenced role, if it still exists.
    #[must_use]
    pub fn role(&self) -> Option<&Role> {
        self.role.as_ref()
    }
}

impl From<Role> for RoleRef {
    fn from(role: Role) -> Self {
        Self::resolved(role)
    }
}
