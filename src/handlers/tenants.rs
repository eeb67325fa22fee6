//! # Tenants API Handlers
//!
//! Operator-only endpoints for listing and provisioning tenants.

use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::OperatorAuth;
use crate::error::ApiError;
use crate::handlers::types::{ListResponse, TenantResponse};
use crate::server::AppState;
use crate::tenancy::NewTenant;

/// Request payload for provisioning a tenant
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateTenantRequestDto {
    /// Display name for the tenant (required, max 255 characters)
    #[schema(example = "Acme Care")]
    pub name: String,
    /// Partition key: lower-case letters, digits and underscores, max 63 characters
    #[schema(example = "acme")]
    pub schema_name: String,
    /// Hostnames (and e-mail domains) routed to this tenant; the first is primary
    #[serde(default)]
    #[schema(example = json!(["acme.lms.example.com", "acme.example.com"]))]
    pub domains: Vec<String>,
}

/// Response payload for tenant provisioning
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateTenantResponseDto {
    pub tenant: TenantResponse,
    /// System roles seeded into the new partition
    pub roles_created: usize,
    /// System groups seeded into the new partition
    pub groups_created: usize,
}

/// List all tenants with their domains
#[utoipa::path(
    get,
    path = "/api/tenants/",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Tenants", body = ListResponse<TenantResponse>),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn list_tenants(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
) -> Result<Json<ListResponse<TenantResponse>>, ApiError> {
    let tenants = state.directory.list_tenants().await?;

    Ok(Json(ListResponse::new(
        tenants
            .into_iter()
            .map(|(tenant, domains)| TenantResponse::new(tenant, domains))
            .collect(),
    )))
}

/// Provision a tenant: partition, domains, and seeded system roles and groups
#[utoipa::path(
    post,
    path = "/api/tenants/",
    security(("bearer_auth" = [])),
    request_body = CreateTenantRequestDto,
    responses(
        (status = 201, description = "Tenant provisioned", body = CreateTenantResponseDto),
        (status = 400, description = "Validation failed", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 409, description = "Schema name or domain already in use", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "tenants"
)]
pub async fn create_tenant(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Json(request): Json<CreateTenantRequestDto>,
) -> Result<(StatusCode, Json<CreateTenantResponseDto>), ApiError> {
    let provisioned = state
        .directory
        .create_tenant(NewTenant {
            name: request.name,
            schema_name: request.schema_name,
            domains: request.domains,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateTenantResponseDto {
            roles_created: provisioned.seeded.roles_created,
            groups_created: provisioned.seeded.groups_created,
            tenant: TenantResponse::new(provisioned.tenant, provisioned.domains),
        }),
    ))
}
