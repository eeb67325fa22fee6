//! User entity model
//!
//! Users belong to exactly one tenant partition for their whole lifetime.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::role::RoleCode;

/// Account lifecycle state.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "suspended")]
    Suspended,
}

impl UserStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UserStatus::Pending => "pending",
            UserStatus::Active => "active",
            UserStatus::Suspended => "suspended",
        }
    }
}

/// User account stored in a tenant partition
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Partition discriminator; never changes after creation
    pub schema_name: String,

    /// Owning tenant
    pub tenant_id: Uuid,

    /// Lower-cased e-mail, unique per partition
    pub email: String,

    /// Argon2 PHC string; `None` for accounts that cannot log in with a password
    pub password_hash: Option<String>,

    pub first_name: String,

    pub last_name: String,

    /// Current role; drives system group membership
    pub role: RoleCode,

    pub status: UserStatus,

    pub is_locked: bool,

    /// Consecutive failed password attempts
    pub login_attempts: i32,

    pub last_login_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Suspended or locked accounts cannot authenticate.
    pub fn is_blocked(&self) -> bool {
        self.status == UserStatus::Suspended || self.is_locked
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::group_membership::Entity")]
    GroupMembership,
}

impl Related<super::group_membership::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GroupMembership.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
