//! In-process identity store.
//!
//! Keeps normalized records behind a `tokio::sync::RwLock` and assembles
//! aggregates on read, the same shape a relational store returns. Used for
//! local development and tests.

use crate::error::StoreError;
use crate::group::Group;
use crate::role::{DefaultRole, DefaultRoles, Role, RoleRef};
use crate::store::IdentityStore;
use crate::user::User;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatehouse_core::{GroupId, RoleId, UserId};
use rootcause::prelude::Report;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct UserRecord {
    id: UserId,
    external_id: String,
    email: String,
    display_name: String,
    avatar_url: Option<String>,
    role_ids: Vec<RoleId>,
    group_ids: Vec<GroupId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct GroupRecord {
    id: GroupId,
    name: String,
    description: String,
    role_ids: Vec<RoleId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    users: BTreeMap<UserId, UserRecord>,
    groups: BTreeMap<GroupId, GroupRecord>,
    roles: BTreeMap<RoleId, Role>,
}

impl State {
    fn role_refs(&self, ids: &[RoleId]) -> Vec<RoleRef> {
        ids.iter()
            .map(|id| match self.roles.get(id) {
                Some(role) => RoleRef::resolved(role.clone()),
                None => RoleRef::dangling(*id),
            })
            .collect()
    }

    fn group(&self, record: &GroupRecord) -> Group {
        Group::with_all_fields(
            record.id,
            record.name.clone(),
            record.description.clone(),
            self.role_refs(&record.role_ids),
            record.created_at,
            record.updated_at,
        )
    }

    fn user(&self, record: &UserRecord) -> User {
        let groups = record
            .group_ids
            .iter()
            .filter_map(|id| self.groups.get(id))
            .map(|g| self.group(g))
            .collect();
        User::with_all_fields(
            record.id,
            record.external_id.clone(),
            record.email.clone(),
            record.display_name.clone(),
            record.avatar_url.clone(),
            self.role_refs(&record.role_ids),
            groups,
            record.created_at,
            record.updated_at,
        )
    }

    fn role_named(&self, name: &str) -> Option<&Role> {
        self.roles.values().find(|r| r.name() == name)
    }

    fn user_record_mut(&mut self, id: UserId) -> Result<&mut UserRecord, StoreError> {
        self.users.get_mut(&id).ok_or_else(|| StoreError::NotFound {
            entity: "user",
            id: id.to_string(),
        })
    }

    fn ensure_roles_exist(&self, ids: &[RoleId]) -> Result<(), StoreError> {
        match ids.iter().find(|id| !self.roles.contains_key(id)) {
            Some(missing) => Err(StoreError::NotFound {
                entity: "role",
                id: missing.to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// Identity store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn dedup<T: PartialEq + Copy>(ids: &[T]) -> Vec<T> {
    let mut unique = Vec::with_capacity(ids.len());
    for id in ids {
        if !unique.contains(id) {
            unique.push(*id);
        }
    }
    unique
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn find_user_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<User>, Report<StoreError>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.external_id == external_id)
            .map(|u| state.user(u)))
    }

    async fn find_user_by_id(&self, id: UserId) -> Result<Option<User>, Report<StoreError>> {
        let state = self.state.read().await;
        Ok(state.users.get(&id).map(|u| state.user(u)))
    }

    async fn create_user(&self, user: &User) -> Result<User, Report<StoreError>> {
        let mut state = self.state.write().await;
        if state
            .users
            .values()
            .any(|u| u.external_id == user.external_id())
        {
            return Err(StoreError::Conflict {
                entity: "user",
                name: user.external_id().to_string(),
            }
            .into());
        }

        let record = UserRecord {
            id: user.id(),
            external_id: user.external_id().to_string(),
            email: user.email().to_string(),
            display_name: user.display_name().to_string(),
            avatar_url: user.avatar_url().map(str::to_string),
            role_ids: dedup(&user.roles().iter().map(RoleRef::id).collect::<Vec<_>>()),
            group_ids: dedup(&user.groups().iter().map(Group::id).collect::<Vec<_>>()),
            created_at: user.created_at(),
            updated_at: user.updated_at(),
        };
        let created = state.user(&record);
        state.users.insert(record.id, record);
        Ok(created)
    }

    async fn update_user(&self, user: &User) -> Result<(), Report<StoreError>> {
        let mut state = self.state.write().await;
        let record = state.user_record_mut(user.id())?;
        record.email = user.email().to_string();
        record.display_name = user.display_name().to_string();
        record.avatar_url = user.avatar_url().map(str::to_string);
        record.updated_at = user.updated_at();
        Ok(())
    }

    async fn count_users(&self) -> Result<u64, Report<StoreError>> {
        Ok(self.state.read().await.users.len() as u64)
    }

    async fn list_users(&self) -> Result<Vec<User>, Report<StoreError>> {
        let state = self.state.read().await;
        let mut records: Vec<_> = state.users.values().collect();
        records.sort_by_key(|r| (r.created_at, r.id));
        Ok(records.into_iter().map(|r| state.user(r)).collect())
    }

    async fn find_group_by_id(&self, id: GroupId) -> Result<Option<Group>, Report<StoreError>> {
        let state = self.state.read().await;
        Ok(state.groups.get(&id).map(|g| state.group(g)))
    }

    async fn find_group_by_name(&self, name: &str) -> Result<Option<Group>, Report<StoreError>> {
        let state = self.state.read().await;
        Ok(state
            .groups
            .values()
            .find(|g| g.name == name)
            .map(|g| state.group(g)))
    }

    async fn create_group(&self, group: &Group) -> Result<Group, Report<StoreError>> {
        let mut state = self.state.write().await;
        if state.groups.values().any(|g| g.name == group.name()) {
            return Err(StoreError::Conflict {
                entity: "group",
                name: group.name().to_string(),
            }
            .into());
        }

        let role_ids = dedup(&group.roles().iter().map(RoleRef::id).collect::<Vec<_>>());
        state.ensure_roles_exist(&role_ids)?;
        let record = GroupRecord {
            id: group.id(),
            name: group.name().to_string(),
            description: group.description().to_string(),
            role_ids,
            created_at: group.created_at(),
            updated_at: group.updated_at(),
        };
        let created = state.group(&record);
        state.groups.insert(record.id, record);
        Ok(created)
    }

    async fn list_groups(&self) -> Result<Vec<Group>, Report<StoreError>> {
        let state = self.state.read().await;
        let mut groups: Vec<_> = state.groups.values().map(|g| state.group(g)).collect();
        groups.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(groups)
    }

    async fn replace_user_groups(
        &self,
        user_id: UserId,
        group_ids: &[GroupId],
    ) -> Result<(), Report<StoreError>> {
        let mut state = self.state.write().await;
        if let Some(missing) = group_ids.iter().find(|id| !state.groups.contains_key(id)) {
            return Err(StoreError::NotFound {
                entity: "group",
                id: missing.to_string(),
            }
            .into());
        }
        let record = state.user_record_mut(user_id)?;
        record.group_ids = dedup(group_ids);
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn replace_group_roles(
        &self,
        group_id: GroupId,
        role_ids: &[RoleId],
    ) -> Result<(), Report<StoreError>> {
        let mut state = self.state.write().await;
        state.ensure_roles_exist(role_ids)?;
        let record = state
            .groups
            .get_mut(&group_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "group",
                id: group_id.to_string(),
            })?;
        record.role_ids = dedup(role_ids);
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn replace_user_roles(
        &self,
        user_id: UserId,
        role_ids: &[RoleId],
    ) -> Result<(), Report<StoreError>> {
        let mut state = self.state.write().await;
        state.ensure_roles_exist(role_ids)?;
        let record = state.user_record_mut(user_id)?;
        record.role_ids = dedup(role_ids);
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn find_or_create_default_roles(&self) -> Result<DefaultRoles, Report<StoreError>> {
        let mut state = self.state.write().await;
        let mut resolved = Vec::with_capacity(DefaultRole::ALL.len());
        for default in DefaultRole::ALL {
            let existing = state.role_named(default.name()).cloned();
            let role = match existing {
                Some(existing) => existing,
                None => {
                    let role = default.to_role();
                    state.roles.insert(role.id(), role.clone());
                    role
                }
            };
            resolved.push(role);
        }

        let mut resolved = resolved.into_iter();
        match (resolved.next(), resolved.next()) {
            (Some(admin), Some(user)) => Ok(DefaultRoles { admin, user }),
            _ => Err(StoreError::Corrupt {
                details: "default roles incomplete".to_string(),
            }
            .into()),
        }
    }

    async fn create_role(&self, role: &Role) -> Result<Role, Report<StoreError>> {
        let mut state = self.state.write().await;
        if state.role_named(role.name()).is_some() {
            return Err(StoreError::Conflict {
                entity: "role",
                name: role.name().to_string(),
            }
            .into());
        }
        state.roles.insert(role.id(), role.clone());
        Ok(role.clone())
    }

    async fn list_roles(&self) -> Result<Vec<Role>, Report<StoreError>> {
        let state = self.state.read().await;
        let mut roles: Vec<_> = state.roles.values().cloned().collect();
        roles.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(roles)
    }
}
