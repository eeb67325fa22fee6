//! # Groups API Handlers

use axum::{
    extract::{Path, State},
    response::Json,
};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{ApiError, not_found};
use crate::handlers::types::{GroupMemberResponse, GroupResponse, ListResponse};
use crate::repositories::MembershipRepository;
use crate::server::AppState;

/// List groups of the current tenant with member counts
#[utoipa::path(
    get,
    path = "/api/groups/",
    responses(
        (status = 200, description = "Groups of the tenant", body = ListResponse<GroupResponse>),
        (status = 401, description = "Not authenticated for this tenant", body = ApiError)
    ),
    tag = "groups"
)]
pub async fn list_groups(
    State(_state): State<AppState>,
    auth: AuthenticatedUser,
) -> Result<Json<ListResponse<GroupResponse>>, ApiError> {
    let partition = &auth.context.partition;
    let groups = MembershipRepository::new(partition.db(), partition.schema())
        .list_groups()
        .await?;

    Ok(Json(ListResponse::new(
        groups.into_iter().map(GroupResponse::from).collect(),
    )))
}

/// List members of one group
#[utoipa::path(
    get,
    path = "/api/groups/{id}/members",
    params(
        ("id" = Uuid, Path, description = "Group UUID")
    ),
    responses(
        (status = 200, description = "Group members", body = ListResponse<GroupMemberResponse>),
        (status = 401, description = "Not authenticated for this tenant", body = ApiError),
        (status = 404, description = "Group not found in this tenant", body = ApiError)
    ),
    tag = "groups"
)]
pub async fn list_group_members(
    State(_state): State<AppState>,
    auth: AuthenticatedUser,
    Path(group_id): Path<Uuid>,
) -> Result<Json<ListResponse<GroupMemberResponse>>, ApiError> {
    let partition = &auth.context.partition;
    let repo = MembershipRepository::new(partition.db(), partition.schema());

    if repo.find_group(group_id).await?.is_none() {
        return Err(not_found("Group not found"));
    }
    let members = repo.members_of(group_id).await?;

    Ok(Json(ListResponse::new(
        members.into_iter().map(GroupMemberResponse::from).collect(),
    )))
}
