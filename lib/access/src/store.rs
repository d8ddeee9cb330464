//! Persistence boundary for users, groups and roles.
//!
//! Every lookup returns a fully populated aggregate: a user comes back with
//! its direct roles and its groups, and every group with its roles. Callers
//! never issue follow-up queries to complete an aggregate.

use crate::error::StoreError;
use crate::group::Group;
use crate::role::{DefaultRoles, Role};
use crate::user::User;
use async_trait::async_trait;
use gatehouse_core::{GroupId, Result, RoleId, UserId};

/// Storage for identities and their access assignments.
///
/// Replacement operations swap the whole assignment set at once.
/// Concurrent replacements of the same set are last-writer-wins.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_user_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<User>, StoreError>;

    async fn find_user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError>;

    /// Persists a new user with its direct roles and returns the stored
    /// aggregate.
    async fn create_user(&self, user: &User) -> Result<User, StoreError>;

    /// Overwrites the profile fields of an existing user.
    ///
    /// Role and group assignments are not touched.
    async fn update_user(&self, user: &User) -> Result<(), StoreError>;

    async fn count_users(&self) -> Result<u64, StoreError>;

    /// Lists all users, oldest first.
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    async fn find_group_by_id(&self, id: GroupId) -> Result<Option<Group>, StoreError>;

    async fn find_group_by_name(&self, name: &str) -> Result<Option<Group>, StoreError>;

    /// Persists a new group with its roles.
    ///
    /// Fails with `StoreError::Conflict` if the name is taken.
    async fn create_group(&self, group: &Group) -> Result<Group, StoreError>;

    /// Lists all groups ordered by name.
    async fn list_groups(&self) -> Result<Vec<Group>, StoreError>;

    /// Replaces the groups a user belongs to.
    async fn replace_user_groups(
        &self,
        user_id: UserId,
        group_ids: &[GroupId],
    ) -> Result<(), StoreError>;

    /// Replaces the roles a group grants.
    async fn replace_group_roles(
        &self,
        group_id: GroupId,
        role_ids: &[RoleId],
    ) -> Result<(), StoreError>;

    /// Replaces the roles assigned directly to a user.
    async fn replace_user_roles(
        &self,
        user_id: UserId,
        role_ids: &[RoleId],
    ) -> Result<(), StoreError>;

    /// Returns the built-in roles, creating any that are missing.
    async fn find_or_create_default_roles(&self) -> Result<DefaultRoles, StoreError>;

    /// Persists a new role.
    ///
    /// Fails with `StoreError::Conflict` if the name is taken.
    async fn create_role(&self, role: &Role) -> Result<Role, StoreError>;

    /// Lists all roles ordered by name.
    async fn list_roles(&self) -> Result<Vec<Role>, StoreError>;
}
