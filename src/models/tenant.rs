//! Tenant entity model
//!
//! Tenants live in the shared store. `schema_name` names the partition that
//! holds all of the tenant's users, roles, groups and activity.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

use crate::partition::{InvalidPartitionKey, PartitionKey};

/// Tenant (organization) owning exactly one data partition
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "tenants")]
pub struct Model {
    /// Unique identifier for the tenant (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Display name of the organization
    pub name: String,

    /// Partition key, unique across all tenants
    #[sea_orm(unique)]
    pub schema_name: String,

    /// Inactive tenants are kept for history but never resolved
    pub is_active: bool,

    /// Timestamp when the tenant was created
    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// Partition key of this tenant.
    pub fn partition_key(&self) -> Result<PartitionKey, InvalidPartitionKey> {
        PartitionKey::parse(&self.schema_name)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::domain::Entity")]
    Domain,
}

impl Related<super::domain::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Domain.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
