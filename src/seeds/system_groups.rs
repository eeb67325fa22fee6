//! System role and group seeding
//!
//! Every partition gets one system role per role code and one system group
//! bound to it. Role-driven membership sync relies on these pairs.

use chrono::Utc;
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set};
use serde_json::json;
use uuid::Uuid;

use crate::models::{RoleCode, group, role};
use crate::partition::PartitionKey;

/// Counts of records created by [`seed_system_groups`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub roles_created: usize,
    pub groups_created: usize,
}

fn default_permissions(code: RoleCode) -> serde_json::Value {
    match code {
        RoleCode::Admin => json!(["*"]),
        RoleCode::Hr | RoleCode::TeamManager => json!(["users.view", "users.manage"]),
        RoleCode::Auditor | RoleCode::Iqa | RoleCode::Eqa => json!(["users.view", "audit.view"]),
        _ => json!([]),
    }
}

/// Ensures the system role/group pair exists for every role code in `schema`.
///
/// Existing rows are left untouched, so the call is safe to repeat.
pub async fn seed_system_groups<C>(conn: &C, schema: &PartitionKey) -> Result<SeedReport, DbErr>
where
    C: ConnectionTrait,
{
    let mut report = SeedReport::default();
    let now = Utc::now();

    for code in <RoleCode as sea_orm::Iterable>::iter() {
        let existing_role = role::Entity::find()
            .filter(role::Column::SchemaName.eq(schema.as_str()))
            .filter(role::Column::Code.eq(code.as_str()))
            .one(conn)
            .await?;

        let role_id = match existing_role {
            Some(existing) => {
                log::debug!("Role '{}' already exists in {}, skipping", code, schema);
                existing.id
            }
            None => {
                let id = Uuid::new_v4();
                role::Entity::insert(role::ActiveModel {
                    id: Set(id),
                    schema_name: Set(schema.as_str().to_string()),
                    name: Set(code.display_name().to_string()),
                    code: Set(code.as_str().to_string()),
                    permissions: Set(default_permissions(code)),
                    is_default: Set(code == RoleCode::default_role()),
                    is_system: Set(true),
                    is_active: Set(true),
                    created_at: Set(now.into()),
                })
                .exec_without_returning(conn)
                .await?;
                report.roles_created += 1;
                id
            }
        };

        let group_exists = group::Entity::find()
            .filter(group::Column::SchemaName.eq(schema.as_str()))
            .filter(group::Column::Name.eq(code.group_name()))
            .one(conn)
            .await?
            .is_some();

        if group_exists {
            log::debug!(
                "Group '{}' already exists in {}, skipping",
                code.group_name(),
                schema
            );
            continue;
        }

        group::Entity::insert(group::ActiveModel {
            id: Set(Uuid::new_v4()),
            schema_name: Set(schema.as_str().to_string()),
            name: Set(code.group_name().to_string()),
            description: Set(format!("All users with the {} role", code.display_name())),
            role_id: Set(role_id),
            is_active: Set(true),
            is_system: Set(true),
            created_at: Set(now.into()),
        })
        .exec_without_returning(conn)
        .await?;
        report.groups_created += 1;
    }

    log::info!(
        "Seeded {} roles and {} system groups in {}",
        report.roles_created,
        report.groups_created,
        schema
    );

    Ok(report)
}
