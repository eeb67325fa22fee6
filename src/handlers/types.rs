//! # Common API Types
//!
//! Response shapes shared across handlers.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::accounts::UserFieldChange;
use crate::membership_sync::SyncOutcome;
use crate::models::{RoleCode, UserStatus, domain, group, group_membership, tenant, user};
use crate::repositories::GroupSummary;

/// Wrapper for list endpoints
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
}

impl<T> ListResponse<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self { data }
    }
}

/// A user as exposed over the API (never includes the password hash)
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    #[schema(example = "jane@acme.example.com")]
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: RoleCode,
    pub status: UserStatus,
    pub is_locked: bool,
    /// ISO 8601 timestamp of the last successful login
    pub last_login_at: Option<String>,
    pub created_at: String,
}

impl From<user::Model> for UserResponse {
    fn from(user: user::Model) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
            status: user.status,
            is_locked: user.is_locked,
            last_login_at: user.last_login_at.map(|at| at.to_rfc3339()),
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

/// A domain bound to a tenant
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DomainResponse {
    #[schema(example = "acme.lms.example.com")]
    pub domain: String,
    pub is_primary: bool,
}

impl From<domain::Model> for DomainResponse {
    fn from(domain: domain::Model) -> Self {
        Self {
            domain: domain.domain,
            is_primary: domain.is_primary,
        }
    }
}

/// A tenant with its domains
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TenantResponse {
    pub id: Uuid,
    #[schema(example = "Acme Care")]
    pub name: String,
    #[schema(example = "acme")]
    pub schema_name: String,
    pub is_active: bool,
    pub domains: Vec<DomainResponse>,
    pub created_at: String,
}

impl TenantResponse {
    pub fn new(tenant: tenant::Model, domains: Vec<domain::Model>) -> Self {
        Self {
            id: tenant.id,
            name: tenant.name,
            schema_name: tenant.schema_name,
            is_active: tenant.is_active,
            domains: domains.into_iter().map(DomainResponse::from).collect(),
            created_at: tenant.created_at.to_rfc3339(),
        }
    }
}

/// Outcome of the membership sync that followed a write
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SyncSummary {
    /// `changed`, `unchanged`, `skipped` or `failed`
    #[schema(example = "changed")]
    pub status: String,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl From<&SyncOutcome> for SyncSummary {
    fn from(outcome: &SyncOutcome) -> Self {
        let (added, removed) = match outcome {
            SyncOutcome::Synced(report) => (report.added.clone(), report.removed.clone()),
            _ => (Vec::new(), Vec::new()),
        };
        Self {
            status: outcome.label().to_string(),
            added,
            removed,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateUserResponse {
    pub user: UserResponse,
    pub sync: SyncSummary,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UpdateUserResponse {
    pub user: UserResponse,
    pub changes: Vec<UserFieldChange>,
    /// Present only when the role was part of the update
    pub sync: Option<SyncSummary>,
}

/// A group with its member count
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GroupResponse {
    pub id: Uuid,
    #[schema(example = "Carers")]
    pub name: String,
    pub description: String,
    /// Code of the role the group mirrors
    pub role_code: Option<String>,
    pub is_system: bool,
    pub is_active: bool,
    pub member_count: u64,
}

impl From<GroupSummary> for GroupResponse {
    fn from(summary: GroupSummary) -> Self {
        let GroupSummary {
            group,
            role_code,
            member_count,
        } = summary;
        Self::from_parts(group, role_code, member_count)
    }
}

impl GroupResponse {
    fn from_parts(group: group::Model, role_code: Option<String>, member_count: u64) -> Self {
        Self {
            id: group.id,
            name: group.name,
            description: group.description,
            role_code,
            is_system: group.is_system,
            is_active: group.is_active,
            member_count,
        }
    }
}

/// One member of a group
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GroupMemberResponse {
    pub membership_id: Uuid,
    pub user: UserResponse,
    pub is_primary: bool,
    pub is_active: bool,
    pub joined_at: String,
}

impl From<(group_membership::Model, user::Model)> for GroupMemberResponse {
    fn from((membership, user): (group_membership::Model, user::Model)) -> Self {
        Self {
            membership_id: membership.id,
            user: user.into(),
            is_primary: membership.is_primary,
            is_active: membership.is_active,
            joined_at: membership.joined_at.to_rfc3339(),
        }
    }
}

/// Liveness answer for load balancers and orchestrators
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}
