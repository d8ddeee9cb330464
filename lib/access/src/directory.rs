//! Administrative management of users, groups and roles.
//!
//! Callers are expected to have passed an admin gate already; this module
//! enforces model rules only.

use crate::error::{AccessError, escalate};
use crate::group::Group;
use crate::role::{Role, RoleRef};
use crate::session::UserSummary;
use crate::store::IdentityStore;
use gatehouse_core::{GroupId, ParseIdError, RoleId, UserId};
use rootcause::prelude::Report;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Request to create a group.
#[derive(Debug, Clone, Deserialize)]
pub struct NewGroup {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Roles granted to members. Malformed or unknown ids are skipped.
    #[serde(default)]
    pub role_ids: Vec<String>,
}

/// Request to create a role.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRole {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// Parses one identifier, reporting a malformed one as a validation error.
pub fn parse_id<T>(raw: &str) -> Result<T, AccessError>
where
    T: FromStr<Err = ParseIdError>,
{
    raw.trim()
        .parse()
        .map_err(|e: ParseIdError| AccessError::validation(e.to_string()))
}

/// Parses a list of identifiers; any malformed entry fails the whole list.
pub fn parse_ids<T>(raw: &[String]) -> Result<Vec<T>, AccessError>
where
    T: FromStr<Err = ParseIdError>,
{
    raw.iter().map(|id| parse_id(id)).collect()
}

/// User, group and role administration.
#[derive(Clone)]
pub struct Directory {
    store: Arc<dyn IdentityStore>,
}

impl Directory {
    #[must_use]
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    /// Lists every user with its effective access.
    #[instrument(skip(self))]
    pub async fn list_users(&self) -> Result<Vec<UserSummary>, Report<AccessError>> {
        let users = self.store.list_users().await.map_err(escalate)?;
        Ok(users.iter().map(UserSummary::resolve).collect())
    }

    #[instrument(skip(self))]
    pub async fn list_groups(&self) -> Result<Vec<Group>, Report<AccessError>> {
        self.store.list_groups().await.map_err(escalate)
    }

    #[instrument(skip(self))]
    pub async fn list_roles(&self) -> Result<Vec<Role>, Report<AccessError>> {
        self.store.list_roles().await.map_err(escalate)
    }

    /// Creates a group with a unique name.
    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_group(&self, request: NewGroup) -> Result<Group, Report<AccessError>> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(AccessError::validation("group name is required").into());
        }
        if self
            .store
            .find_group_by_name(name)
            .await
            .map_err(escalate)?
            .is_some()
        {
            return Err(AccessError::validation(format!("group '{name}' already exists")).into());
        }

        let known: BTreeMap<RoleId, Role> = self
            .store
            .list_roles()
            .await
            .map_err(escalate)?
            .into_iter()
            .map(|r| (r.id(), r))
            .collect();
        let mut roles: Vec<RoleRef> = Vec::new();
        for raw in &request.role_ids {
            match parse_id::<RoleId>(raw).ok().and_then(|id| known.get(&id)) {
                Some(role) if !roles.iter().any(|r| r.id() == role.id()) => {
                    roles.push(role.clone().into());
                }
                Some(_) => {}
                None => debug!(role_id = %raw, "skipping unknown role"),
            }
        }

        let group = Group::new(name, request.description.trim(), roles);
        let group = self.store.create_group(&group).await.map_err(escalate)?;
        info!(group_id = %group.id(), "created group");
        Ok(group)
    }

    /// Creates a role with a unique name.
    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_role(&self, request: NewRole) -> Result<Role, Report<AccessError>> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(AccessError::validation("role name is required").into());
        }
        if request.permissions.iter().any(|p| p.trim().is_empty()) {
            return Err(AccessError::validation("permissions must not be blank").into());
        }

        let role = Role::new(
            name,
            request.description.trim(),
            request.permissions.iter().map(|p| p.trim().to_string()),
        );
        let role = self.store.create_role(&role).await.map_err(escalate)?;
        info!(role_id = %role.id(), "created role");
        Ok(role)
    }

    /// Replaces the groups a user belongs to.
    #[instrument(skip(self, group_ids))]
    pub async fn assign_user_groups(
        &self,
        user_id: UserId,
        group_ids: &[GroupId],
    ) -> Result<(), Report<AccessError>> {
        self.store
            .replace_user_groups(user_id, group_ids)
            .await
            .map_err(escalate)?;
        info!(groups = group_ids.len(), "replaced user groups");
        Ok(())
    }

    /// Replaces the roles a group grants its members.
    #[instrument(skip(self, role_ids))]
    pub async fn assign_group_roles(
        &self,
        group_id: GroupId,
        role_ids: &[RoleId],
    ) -> Result<(), Report<AccessError>> {
        self.store
            .replace_group_roles(group_id, role_ids)
            .await
            .map_err(escalate)?;
        info!(roles = role_ids.len(), "replaced group roles");
        Ok(())
    }

    /// Replaces the roles assigned directly to a user.
    #[instrument(skip(self, role_ids))]
    pub async fn assign_user_roles(
        &self,
        user_id: UserId,
        role_ids: &[RoleId],
    ) -> Result<(), Report<AccessError>> {
        self.store
            .replace_user_roles(user_id, role_ids)
            .await
            .map_err(escalate)?;
        info!(roles = role_ids.len(), "replaced user roles");
        Ok(())
    }
}
