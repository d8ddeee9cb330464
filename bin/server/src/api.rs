//! JSON handlers for the profile and administration endpoints.
//!
//! Access checks happen in the gate layers installed by [`crate::app`];
//! handlers only translate between HTTP and [`gatehouse_access::Directory`].

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use gatehouse_access::{Group, NewGroup, NewRole, Role, UserSummary, parse_id, parse_ids};
use gatehouse_core::{GroupId, RoleId, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::{AppState, Authenticated};
use crate::error::ApiError;

/// Body of a group membership replacement.
#[derive(Debug, Deserialize)]
pub struct GroupAssignment {
    pub group_ids: Vec<String>,
}

/// Body of a role assignment replacement.
#[derive(Debug, Deserialize)]
pub struct RoleAssignment {
    pub role_ids: Vec<String>,
}

/// Acknowledgement for updates that return no entity.
#[derive(Debug, Serialize)]
pub struct Updated {
    pub message: &'static str,
}

pub async fn health() -> &'static str {
    "ok"
}

/// Returns the caller's own profile with its effective access.
pub async fn profile(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
) -> Result<Json<UserSummary>, ApiError> {
    let summary = state.sessions.profile(principal.user_id()).await?;
    Ok(Json(summary))
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    Ok(Json(state.directory.list_users().await?))
}

pub async fn list_groups(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Group>>, ApiError> {
    Ok(Json(state.directory.list_groups().await?))
}

pub async fn create_group(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewGroup>, JsonRejection>,
) -> Result<(StatusCode, Json<Group>), ApiError> {
    let Json(request) = payload?;
    let group = state.directory.create_group(request).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn list_roles(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Role>>, ApiError> {
    Ok(Json(state.directory.list_roles().await?))
}

pub async fn create_role(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewRole>, JsonRejection>,
) -> Result<(StatusCode, Json<Role>), ApiError> {
    let Json(request) = payload?;
    let role = state.directory.create_role(request).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

/// Replaces the groups a user belongs to.
pub async fn assign_user_groups(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    payload: Result<Json<GroupAssignment>, JsonRejection>,
) -> Result<Json<Updated>, ApiError> {
    let user_id: UserId = parse_id(&user_id)?;
    let Json(request) = payload?;
    let group_ids: Vec<GroupId> = parse_ids(&request.group_ids)?;

    state
        .directory
        .assign_user_groups(user_id, &group_ids)
        .await?;
    Ok(Json(Updated {
        message: "user groups updated",
    }))
}

/// Replaces the roles a group grants.
pub async fn assign_group_roles(
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<String>,
    payload: Result<Json<RoleAssignment>, JsonRejection>,
) -> Result<Json<Updated>, ApiError> {
    let group_id: GroupId = parse_id(&group_id)?;
    let Json(request) = payload?;
    let role_ids: Vec<RoleId> = parse_ids(&request.role_ids)?;

    state
        .directory
        .assign_group_roles(group_id, &role_ids)
        .await?;
    Ok(Json(Updated {
        message: "group roles updated",
    }))
}

/// Replaces the roles assigned directly to a user.
pub async fn assign_user_roles(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    payload: Result<Json<RoleAssignment>, JsonRejection>,
) -> Result<Json<Updated>, ApiError> {
    let user_id: UserId = parse_id(&user_id)?;
    let Json(request) = payload?;
    let role_ids: Vec<RoleId> = parse_ids(&request.role_ids)?;

    state
        .directory
        .assign_user_roles(user_id, &role_ids)
        .await?;
    Ok(Json(Updated {
        message: "user roles updated",
    }))
}
