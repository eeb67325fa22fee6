//! # Data Models
//!
//! SeaORM entities for the shared tenant directory (`tenant`, `domain`) and
//! the partitioned per-tenant tables.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod domain;
pub mod group;
pub mod group_membership;
pub mod role;
pub mod tenant;
pub mod user;
pub mod user_activity;

pub use domain::Entity as Domain;
pub use group::Entity as Group;
pub use group_membership::Entity as GroupMembership;
pub use role::{Entity as Role, RoleCode};
pub use tenant::Entity as Tenant;
pub use user::{Entity as User, UserStatus};
pub use user_activity::{ActivityType, Entity as UserActivity};

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "lms".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
