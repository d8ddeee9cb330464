//! Postgres-backed identity store.
//!
//! Aggregates are assembled from a handful of set-based queries: the user
//! rows, their direct role links, their group memberships, and the groups
//! with their role links. Replacement operations run in a transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatehouse_access::{
    DefaultRole, DefaultRoles, Group, IdentityStore, Role, RoleRef, StoreError, User,
};
use gatehouse_core::{GroupId, RoleId, UserId};
use rootcause::prelude::Report;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

/// Row type for user queries.
#[derive(FromRow)]
struct UserRow {
    id: String,
    external_id: String,
    email: String,
    display_name: String,
    avatar_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Row type for role queries.
#[derive(FromRow)]
struct RoleRow {
    id: String,
    name: String,
    description: String,
    permissions: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RoleRow {
    fn try_into_role(self) -> Result<Role, StoreError> {
        Ok(Role::with_all_fields(
            parse_stored::<RoleId>("role", &self.id)?,
            self.name,
            self.description,
            self.permissions.into_iter().collect::<BTreeSet<_>>(),
            self.created_at,
            self.updated_at,
        ))
    }
}

/// A role together with the user or group that holds it.
#[derive(FromRow)]
struct RoleLinkRow {
    owner_id: String,
    #[sqlx(flatten)]
    role: RoleRow,
}

/// Row type for group queries.
#[derive(FromRow)]
struct GroupRow {
    id: String,
    name: String,
    description: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct MembershipRow {
    user_id: String,
    group_id: String,
}

fn parse_stored<T>(entity: &str, raw: &str) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e| StoreError::Corrupt {
        details: format!("invalid {entity} id '{raw}': {e}"),
    })
}

fn database(error: sqlx::Error) -> StoreError {
    StoreError::Database {
        details: error.to_string(),
    }
}

/// Maps an insert failure, reporting a unique violation as a name conflict.
fn insert_error(entity: &'static str, name: &str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |error| match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict {
            entity,
            name: name.to_string(),
        },
        _ => database(error),
    }
}

const ROLE_COLUMNS: &str = "r.id, r.name, r.description, r.permissions, r.created_at, r.updated_at";

/// Identity store over a Postgres connection pool.
#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    /// Creates a new store.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Loads the role links of the given owners from a link table.
    async fn role_links(
        &self,
        link_table: &str,
        owner_column: &str,
        owner_ids: &[String],
    ) -> Result<HashMap<String, Vec<RoleRef>>, StoreError> {
        let sql = format!(
            "SELECT l.{owner_column} AS owner_id, {ROLE_COLUMNS} \
             FROM {link_table} l JOIN roles r ON r.id = l.role_id \
             WHERE l.{owner_column} = ANY($1) \
             ORDER BY r.name"
        );
        let rows: Vec<RoleLinkRow> = sqlx::query_as(&sql)
            .bind(owner_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(database)?;

        let mut links: HashMap<String, Vec<RoleRef>> = HashMap::new();
        for row in rows {
            let role = row.role.try_into_role()?;
            links.entry(row.owner_id).or_default().push(role.into());
        }
        Ok(links)
    }

    async fn hydrate_groups(&self, rows: Vec<GroupRow>) -> Result<Vec<Group>, StoreError> {
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let mut roles = self.role_links("group_roles", "group_id", &ids).await?;

        rows.into_iter()
            .map(|row| {
                Ok(Group::with_all_fields(
                    parse_stored::<GroupId>("group", &row.id)?,
                    row.name,
                    row.description,
                    roles.remove(&row.id).unwrap_or_default(),
                    row.created_at,
                    row.updated_at,
                ))
            })
            .collect()
    }

    async fn hydrate_users(&self, rows: Vec<UserRow>) -> Result<Vec<User>, StoreError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let mut direct = self.role_links("user_roles", "user_id", &ids).await?;

        let memberships: Vec<MembershipRow> = sqlx::query_as(
            r#"
            SELECT ug.user_id, ug.group_id
            FROM user_groups ug JOIN groups g ON g.id = ug.group_id
            WHERE ug.user_id = ANY($1)
            ORDER BY g.name
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(database)?;

        let group_ids: Vec<String> = memberships
            .iter()
            .map(|m| m.group_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let group_rows: Vec<GroupRow> = sqlx::query_as(
            r#"
            SELECT id, name, description, created_at, updated_at
            FROM groups
            WHERE id = ANY($1)
            "#,
        )
        .bind(&group_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(database)?;
        let groups: HashMap<String, Group> = self
            .hydrate_groups(group_rows)
            .await?
            .into_iter()
            .map(|g| (g.id().to_string(), g))
            .collect();

        let mut member_of: HashMap<String, Vec<Group>> = HashMap::new();
        for membership in memberships {
            if let Some(group) = groups.get(&membership.group_id) {
                member_of
                    .entry(membership.user_id)
                    .or_default()
                    .push(group.clone());
            }
        }

        rows.into_iter()
            .map(|row| {
                Ok(User::with_all_fields(
                    parse_stored::<UserId>("user", &row.id)?,
                    row.external_id,
                    row.email,
                    row.display_name,
                    row.avatar_url,
                    direct.remove(&row.id).unwrap_or_default(),
                    member_of.remove(&row.id).unwrap_or_default(),
                    row.created_at,
                    row.updated_at,
                ))
            })
            .collect()
    }

    async fn fetch_user(&self, sql: &str, key: &str) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(database)?;
        match row {
            Some(row) => Ok(self.hydrate_users(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn fetch_group(&self, sql: &str, key: &str) -> Result<Option<Group>, StoreError> {
        let row: Option<GroupRow> = sqlx::query_as(sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(database)?;
        match row {
            Some(row) => Ok(self.hydrate_groups(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles r WHERE r.name = $1");
        let row: Option<RoleRow> = sqlx::query_as(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(database)?;
        row.map(RoleRow::try_into_role).transpose()
    }

    async fn insert_role(&self, role: &Role, on_conflict_ignore: bool) -> Result<(), StoreError> {
        let sql = if on_conflict_ignore {
            r#"
            INSERT INTO roles (id, name, description, permissions, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (name) DO NOTHING
            "#
        } else {
            r#"
            INSERT INTO roles (id, name, description, permissions, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#
        };
        let permissions: Vec<String> = role.permissions().iter().cloned().collect();
        sqlx::query(sql)
            .bind(role.id().to_string())
            .bind(role.name())
            .bind(role.description())
            .bind(&permissions)
            .bind(role.created_at())
            .bind(role.updated_at())
            .execute(&self.pool)
            .await
            .map_err(insert_error("role", role.name()))?;
        Ok(())
    }
}

/// Confirms a row exists inside a transaction.
async fn ensure_exists(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
    entity: &'static str,
    id: &str,
) -> Result<(), StoreError> {
    let sql = format!("SELECT id FROM {table} WHERE id = $1");
    let found: Option<(String,)> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(database)?;
    match found {
        Some(_) => Ok(()),
        None => Err(StoreError::NotFound {
            entity,
            id: id.to_string(),
        }),
    }
}

/// Confirms every id exists inside a transaction, reporting the first
/// missing one in request order.
async fn ensure_all_exist(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
    entity: &'static str,
    ids: &[String],
) -> Result<(), StoreError> {
    let sql = format!("SELECT id FROM {table} WHERE id = ANY($1)");
    let found: Vec<(String,)> = sqlx::query_as(&sql)
        .bind(ids)
        .fetch_all(&mut **tx)
        .await
        .map_err(database)?;
    let found: BTreeSet<String> = found.into_iter().map(|(id,)| id).collect();
    match ids.iter().find(|id| !found.contains(*id)) {
        Some(missing) => Err(StoreError::NotFound {
            entity,
            id: missing.clone(),
        }),
        None => Ok(()),
    }
}

/// The link tables and their owner/target shapes.
struct LinkTable {
    table: &'static str,
    owner_table: &'static str,
    owner_entity: &'static str,
    owner_column: &'static str,
    target_table: &'static str,
    target_entity: &'static str,
    target_column: &'static str,
}

const USER_GROUPS: LinkTable = LinkTable {
    table: "user_groups",
    owner_table: "users",
    owner_entity: "user",
    owner_column: "user_id",
    target_table: "groups",
    target_entity: "group",
    target_column: "group_id",
};

const GROUP_ROLES: LinkTable = LinkTable {
    table: "group_roles",
    owner_table: "groups",
    owner_entity: "group",
    owner_column: "group_id",
    target_table: "roles",
    target_entity: "role",
    target_column: "role_id",
};

const USER_ROLES: LinkTable = LinkTable {
    table: "user_roles",
    owner_table: "users",
    owner_entity: "user",
    owner_column: "user_id",
    target_table: "roles",
    target_entity: "role",
    target_column: "role_id",
};

impl PgIdentityStore {
    /// Swaps the full set of links for one owner.
    async fn replace_links(
        &self,
        link: &LinkTable,
        owner_id: String,
        target_ids: Vec<String>,
    ) -> Result<(), StoreError> {
        let mut target_ids = target_ids;
        let mut seen = BTreeSet::new();
        target_ids.retain(|id| seen.insert(id.clone()));

        let mut tx = self.pool.begin().await.map_err(database)?;
        ensure_exists(&mut tx, link.owner_table, link.owner_entity, &owner_id).await?;
        ensure_all_exist(&mut tx, link.target_table, link.target_entity, &target_ids).await?;

        let delete = format!("DELETE FROM {} WHERE {} = $1", link.table, link.owner_column);
        sqlx::query(&delete)
            .bind(&owner_id)
            .execute(&mut *tx)
            .await
            .map_err(database)?;

        let insert = format!(
            "INSERT INTO {} ({}, {}) SELECT $1, UNNEST($2::text[])",
            link.table, link.owner_column, link.target_column
        );
        sqlx::query(&insert)
            .bind(&owner_id)
            .bind(&target_ids)
            .execute(&mut *tx)
            .await
            .map_err(database)?;

        tx.commit().await.map_err(database)?;
        Ok(())
    }
}

const USER_SELECT: &str =
    "SELECT id, external_id, email, display_name, avatar_url, created_at, updated_at FROM users";
const GROUP_SELECT: &str = "SELECT id, name, description, created_at, updated_at FROM groups";

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn find_user_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<User>, Report<StoreError>> {
        let sql = format!("{USER_SELECT} WHERE external_id = $1");
        Ok(self.fetch_user(&sql, external_id).await?)
    }

    async fn find_user_by_id(&self, id: UserId) -> Result<Option<User>, Report<StoreError>> {
        let sql = format!("{USER_SELECT} WHERE id = $1");
        Ok(self.fetch_user(&sql, &id.to_string()).await?)
    }

    async fn create_user(&self, user: &User) -> Result<User, Report<StoreError>> {
        let mut tx = self.pool.begin().await.map_err(database)?;
        sqlx::query(
            r#"
            INSERT INTO users (id, external_id, email, display_name, avatar_url, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(user.id().to_string())
        .bind(user.external_id())
        .bind(user.email())
        .bind(user.display_name())
        .bind(user.avatar_url())
        .bind(user.created_at())
        .bind(user.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(insert_error("user", user.external_id()))?;

        let role_ids: Vec<String> = user.roles().iter().map(|r| r.id().to_string()).collect();
        sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role_id)
            SELECT $1, UNNEST($2::text[])
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user.id().to_string())
        .bind(&role_ids)
        .execute(&mut *tx)
        .await
        .map_err(database)?;
        tx.commit().await.map_err(database)?;

        self.find_user_by_id(user.id())
            .await?
            .ok_or_else(|| {
                StoreError::Corrupt {
                    details: format!("user '{}' vanished after insert", user.id()),
                }
                .into()
            })
    }

    async fn update_user(&self, user: &User) -> Result<(), Report<StoreError>> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email = $2, display_name = $3, avatar_url = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(user.id().to_string())
        .bind(user.email())
        .bind(user.display_name())
        .bind(user.avatar_url())
        .bind(user.updated_at())
        .execute(&self.pool)
        .await
        .map_err(database)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "user",
                id: user.id().to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn count_users(&self) -> Result<u64, Report<StoreError>> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .map_err(database)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn list_users(&self) -> Result<Vec<User>, Report<StoreError>> {
        let sql = format!("{USER_SELECT} ORDER BY created_at, id");
        let rows: Vec<UserRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(database)?;
        Ok(self.hydrate_users(rows).await?)
    }

    async fn find_group_by_id(&self, id: GroupId) -> Result<Option<Group>, Report<StoreError>> {
        let sql = format!("{GROUP_SELECT} WHERE id = $1");
        Ok(self.fetch_group(&sql, &id.to_string()).await?)
    }

    async fn find_group_by_name(&self, name: &str) -> Result<Option<Group>, Report<StoreError>> {
        let sql = format!("{GROUP_SELECT} WHERE name = $1");
        Ok(self.fetch_group(&sql, name).await?)
    }

    async fn create_group(&self, group: &Group) -> Result<Group, Report<StoreError>> {
        let mut tx = self.pool.begin().await.map_err(database)?;
        sqlx::query(
            r#"
            INSERT INTO groups (id, name, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(group.id().to_string())
        .bind(group.name())
        .bind(group.description())
        .bind(group.created_at())
        .bind(group.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(insert_error("group", group.name()))?;

        let role_ids: Vec<String> = group.roles().iter().map(|r| r.id().to_string()).collect();
        sqlx::query(
            r#"
            INSERT INTO group_roles (group_id, role_id)
            SELECT $1, r.id FROM roles r WHERE r.id = ANY($2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(group.id().to_string())
        .bind(&role_ids)
        .execute(&mut *tx)
        .await
        .map_err(database)?;
        tx.commit().await.map_err(database)?;

        self.find_group_by_id(group.id())
            .await?
            .ok_or_else(|| {
                StoreError::Corrupt {
                    details: format!("group '{}' vanished after insert", group.id()),
                }
                .into()
            })
    }

    async fn list_groups(&self) -> Result<Vec<Group>, Report<StoreError>> {
        let sql = format!("{GROUP_SELECT} ORDER BY name");
        let rows: Vec<GroupRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(database)?;
        Ok(self.hydrate_groups(rows).await?)
    }

    async fn replace_user_groups(
        &self,
        user_id: UserId,
        group_ids: &[GroupId],
    ) -> Result<(), Report<StoreError>> {
        let targets = group_ids.iter().map(ToString::to_string).collect();
        Ok(self
            .replace_links(&USER_GROUPS, user_id.to_string(), targets)
            .await?)
    }

    async fn replace_group_roles(
        &self,
        group_id: GroupId,
        role_ids: &[RoleId],
    ) -> Result<(), Report<StoreError>> {
        let targets = role_ids.iter().map(ToString::to_string).collect();
        Ok(self
            .replace_links(&GROUP_ROLES, group_id.to_string(), targets)
            .await?)
    }

    async fn replace_user_roles(
        &self,
        user_id: UserId,
        role_ids: &[RoleId],
    ) -> Result<(), Report<StoreError>> {
        let targets = role_ids.iter().map(ToString::to_string).collect();
        Ok(self
            .replace_links(&USER_ROLES, user_id.to_string(), targets)
            .await?)
    }

    async fn find_or_create_default_roles(&self) -> Result<DefaultRoles, Report<StoreError>> {
        let mut resolved = Vec::with_capacity(DefaultRole::ALL.len());
        for default in DefaultRole::ALL {
            self.insert_role(&default.to_role(), true).await?;
            let role = self
                .find_role_by_name(default.name())
                .await?
                .ok_or_else(|| StoreError::Corrupt {
                    details: format!("default role '{default}' missing after insert"),
                })?;
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
        self.insert_role(role, false).await?;
        Ok(role.clone())
    }

    async fn list_roles(&self) -> Result<Vec<Role>, Report<StoreError>> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles r ORDER BY r.name");
        let rows: Vec<RoleRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(database)?;
        Ok(rows
            .into_iter()
            .map(RoleRow::try_into_role)
            .collect::<Result<_, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role_row(id: &str) -> RoleRow {
        let now = Utc::now();
        RoleRow {
            id: id.to_string(),
            name: "auditor".to_string(),
            description: "Reads audit logs".to_string(),
            permissions: vec!["audit:read".to_string(), "audit:read".to_string()],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn role_row_converts_and_dedups_permissions() {
        let id = RoleId::new();
        let role = role_row(&id.to_string()).try_into_role().expect("convert");

        assert_eq!(role.id(), id);
        assert_eq!(role.permissions().len(), 1);
        assert!(role.grants("audit:read"));
    }

    #[test]
    fn corrupt_role_id_is_reported() {
        assert!(matches!(
            role_row("not-a-role-id").try_into_role(),
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[test]
    fn unrelated_database_errors_are_not_conflicts() {
        assert!(matches!(
            insert_error("group", "ops")(sqlx::Error::RowNotFound),
            StoreError::Database { .. }
        ));
    }
}
