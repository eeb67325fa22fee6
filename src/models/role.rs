//! Role entity model and the closed role vocabulary.
//!
//! [`RoleCode`] is the set of roles a user can hold. Adding a role means
//! adding a variant with its group name; provisioning then seeds the matching
//! system role and system group for every new tenant.

use std::fmt;
use std::str::FromStr;

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

/// Role held by a user within a tenant.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum RoleCode {
    #[sea_orm(string_value = "admin")]
    Admin,
    #[sea_orm(string_value = "hr")]
    Hr,
    #[sea_orm(string_value = "carer")]
    Carer,
    #[sea_orm(string_value = "client")]
    Client,
    #[sea_orm(string_value = "family")]
    Family,
    #[sea_orm(string_value = "auditor")]
    Auditor,
    #[sea_orm(string_value = "tutor")]
    Tutor,
    #[sea_orm(string_value = "assessor")]
    Assessor,
    #[sea_orm(string_value = "iqa")]
    Iqa,
    #[sea_orm(string_value = "eqa")]
    Eqa,
    #[sea_orm(string_value = "recruiter")]
    Recruiter,
    #[sea_orm(string_value = "team_manager")]
    TeamManager,
}

impl RoleCode {
    pub fn as_str(self) -> &'static str {
        match self {
            RoleCode::Admin => "admin",
            RoleCode::Hr => "hr",
            RoleCode::Carer => "carer",
            RoleCode::Client => "client",
            RoleCode::Family => "family",
            RoleCode::Auditor => "auditor",
            RoleCode::Tutor => "tutor",
            RoleCode::Assessor => "assessor",
            RoleCode::Iqa => "iqa",
            RoleCode::Eqa => "eqa",
            RoleCode::Recruiter => "recruiter",
            RoleCode::TeamManager => "team_manager",
        }
    }

    /// Human-readable role name.
    pub fn display_name(self) -> &'static str {
        match self {
            RoleCode::Admin => "Admin",
            RoleCode::Hr => "HR",
            RoleCode::Carer => "Carer",
            RoleCode::Client => "Client",
            RoleCode::Family => "Family",
            RoleCode::Auditor => "Auditor",
            RoleCode::Tutor => "Tutor",
            RoleCode::Assessor => "Assessor",
            RoleCode::Iqa => "IQA",
            RoleCode::Eqa => "EQA",
            RoleCode::Recruiter => "Recruiter",
            RoleCode::TeamManager => "Team Manager",
        }
    }

    /// Name of the system group whose membership follows this role.
    pub fn group_name(self) -> &'static str {
        match self {
            RoleCode::Admin => "Admins",
            RoleCode::Hr => "HR",
            RoleCode::Carer => "Carers",
            RoleCode::Client => "Clients",
            RoleCode::Family => "Family",
            RoleCode::Auditor => "Auditors",
            RoleCode::Tutor => "Tutors",
            RoleCode::Assessor => "Assessors",
            RoleCode::Iqa => "IQAs",
            RoleCode::Eqa => "EQAs",
            RoleCode::Recruiter => "Recruiters",
            RoleCode::TeamManager => "Team Managers",
        }
    }

    /// Role assigned when none is given.
    pub fn default_role() -> Self {
        RoleCode::Client
    }
}

impl fmt::Display for RoleCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown role code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for RoleCode {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <RoleCode as sea_orm::Iterable>::iter()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// Role definition stored in a tenant partition
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "roles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Partition discriminator
    pub schema_name: String,

    pub name: String,

    /// Role code; system roles use a [`RoleCode`] value
    pub code: String,

    /// Permission identifiers as a JSON array
    #[sea_orm(column_type = "Json")]
    pub permissions: JsonValue,

    pub is_default: bool,

    /// Seeded at provisioning; mirrors one [`RoleCode`]
    pub is_system: bool,

    pub is_active: bool,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::group::Entity")]
    Group,
}

impl Related<super::group::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Group.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
