//! # Users API Handlers
//!
//! Tenant-scoped user management. Every query runs in the partition of the
//! resolved tenant. Creating a user, or updating one with a `role` field,
//! runs a membership sync before the response is built.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::accounts::{NewUser, UserPatch};
use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::handlers::types::{CreateUserResponse, ListResponse, UpdateUserResponse, UserResponse};
use crate::models::ActivityType;
use crate::repositories::{ActivityRepository, UserRepository};
use crate::server::AppState;

/// One audit entry
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ActivityResponse {
    pub id: Uuid,
    pub activity_type: ActivityType,
    pub details: String,
    /// `success` or `failed`
    pub status: String,
    pub ip_address: Option<String>,
    pub created_at: String,
}

/// List users of the current tenant
#[utoipa::path(
    get,
    path = "/api/users/",
    responses(
        (status = 200, description = "Users of the tenant", body = ListResponse<UserResponse>),
        (status = 401, description = "Not authenticated for this tenant", body = ApiError)
    ),
    tag = "users"
)]
pub async fn list_users(
    State(_state): State<AppState>,
    auth: AuthenticatedUser,
) -> Result<Json<ListResponse<UserResponse>>, ApiError> {
    let users = UserRepository::new(&auth.context.partition).list().await?;
    Ok(Json(ListResponse::new(
        users.into_iter().map(UserResponse::from).collect(),
    )))
}

/// Create a user in the current tenant (administrators only)
#[utoipa::path(
    post,
    path = "/api/users/",
    request_body = NewUser,
    responses(
        (status = 201, description = "User created and synchronized", body = CreateUserResponse),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 401, description = "Not authenticated for this tenant", body = ApiError),
        (status = 403, description = "Administrator role required", body = ApiError),
        (status = 409, description = "E-mail already in use", body = ApiError)
    ),
    tag = "users"
)]
pub async fn create_user(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Json(request): Json<NewUser>,
) -> Result<(StatusCode, Json<CreateUserResponse>), ApiError> {
    auth.ensure_admin()?;

    let created = state
        .accounts
        .create_user(&auth.context.partition, auth.context.tenant.id, request)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateUserResponse {
            sync: (&created.sync).into(),
            user: created.user.into(),
        }),
    ))
}

/// Update a user of the current tenant (administrators only)
#[utoipa::path(
    patch,
    path = "/api/users/{id}",
    params(
        ("id" = Uuid, Path, description = "User UUID")
    ),
    request_body = UserPatch,
    responses(
        (status = 200, description = "User updated", body = UpdateUserResponse),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 401, description = "Not authenticated for this tenant", body = ApiError),
        (status = 403, description = "Administrator role required", body = ApiError),
        (status = 404, description = "User not found in this tenant", body = ApiError)
    ),
    tag = "users"
)]
pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    Path(user_id): Path<Uuid>,
    Json(patch): Json<UserPatch>,
) -> Result<Json<UpdateUserResponse>, ApiError> {
    auth.ensure_admin()?;

    let updated = state
        .accounts
        .update_user(&auth.context.partition, user_id, patch)
        .await?;

    Ok(Json(UpdateUserResponse {
        sync: updated.sync.as_ref().map(Into::into),
        changes: updated.changes.changes,
        user: updated.user.into(),
    }))
}

/// Audit trail of one user; administrators may read anyone's, others only their own
#[utoipa::path(
    get,
    path = "/api/users/{id}/activity",
    params(
        ("id" = Uuid, Path, description = "User UUID")
    ),
    responses(
        (status = 200, description = "Activity, oldest first", body = ListResponse<ActivityResponse>),
        (status = 401, description = "Not authenticated for this tenant", body = ApiError),
        (status = 403, description = "Not allowed to read this user's activity", body = ApiError),
        (status = 404, description = "User not found in this tenant", body = ApiError)
    ),
    tag = "users"
)]
pub async fn list_user_activity(
    State(_state): State<AppState>,
    auth: AuthenticatedUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ListResponse<ActivityResponse>>, ApiError> {
    if auth.user.id != user_id {
        auth.ensure_admin()?;
    }

    let partition = &auth.context.partition;
    UserRepository::new(partition).get(user_id).await?;
    let activity = ActivityRepository::new(partition)
        .list_for_user(user_id)
        .await?;

    Ok(Json(ListResponse::new(
        activity
            .into_iter()
            .map(|entry| ActivityResponse {
                id: entry.id,
                activity_type: entry.activity_type,
                details: entry.details,
                status: entry.status,
                ip_address: entry.ip_address,
                created_at: entry.created_at.to_rfc3339(),
            })
            .collect(),
    )))
}
