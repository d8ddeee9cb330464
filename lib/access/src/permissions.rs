//! Effective permission resolution.
//!
//! A user's effective roles are its direct roles plus the roles of every
//! group it belongs to. Its effective permissions are the union of those
//! roles' permissions. Dangling role references contribute nothing.

use crate::role::{Role, RoleRef};
use crate::user::User;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The role names and permissions a user effectively holds.
///
/// Both sets are deduplicated. Their iteration order is an implementation
/// detail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedAccess {
    roles: BTreeSet<String>,
    permissions: BTreeSet<String>,
}

impl ResolvedAccess {
    #[must_use]
    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    #[must_use]
    pub fn permissions(&self) -> &BTreeSet<String> {
        &self.permissions
    }

    #[must_use]
    pub fn has_role(&self, name: &str) -> bool {
        self.roles.contains(name)
    }

    #[must_use]
    pub fn has_permission(&self, name: &str) -> bool {
        self.permissions.contains(name)
    }

    /// Splits into `(roles, permissions)`.
    #[must_use]
    pub fn into_parts(self) -> (BTreeSet<String>, BTreeSet<String>) {
        (self.roles, self.permissions)
    }

    fn absorb(&mut self, refs: &[RoleRef]) {
        for role in refs.iter().filter_map(RoleRef::role) {
            self.grant(role);
        }
    }

    fn grant(&mut self, role: &Role) {
        self.roles.insert(role.name().to_string());
        self.permissions.extend(role.permissions().iter().cloned());
    }
}

/// Computes a user's effective roles and permissions.
///
/// A user with no roles and no groups resolves to two empty sets.
#[must_use]
pub fn resolve(user: &User) -> ResolvedAccess {
    let mut access = ResolvedAccess::default();
    access.absorb(user.roles());
    for group in user.groups() {
        access.absorb(group.roles());
    }
    access
}
