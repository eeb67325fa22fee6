//! # Group and Membership Repository
//!
//! Queries over `roles`, `groups` and `group_memberships` for one partition.
//! Generic over the connection so the membership synchronizer can run them
//! inside its transaction.

use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::{group, group_membership, role, user};

/// A group together with its member count.
#[derive(Debug, Clone)]
pub struct GroupSummary {
    pub group: group::Model,
    pub role_code: Option<String>,
    pub member_count: u64,
}

/// Repository for groups and memberships of one partition
pub struct MembershipRepository<'a, C: ConnectionTrait> {
    conn: &'a C,
    schema: &'a str,
}

impl<'a, C: ConnectionTrait> MembershipRepository<'a, C> {
    pub fn new(conn: &'a C, schema: &'a str) -> Self {
        Self { conn, schema }
    }

    /// System groups with the role each one mirrors.
    pub async fn system_groups_with_roles(
        &self,
    ) -> Result<Vec<(group::Model, role::Model)>, RepositoryError> {
        let rows = group::Entity::find()
            .filter(group::Column::SchemaName.eq(self.schema))
            .filter(group::Column::IsSystem.eq(true))
            .order_by_asc(group::Column::Name)
            .find_also_related(role::Entity)
            .all(self.conn)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(group, role)| match role {
                Some(role) if role.schema_name == self.schema => Some((group, role)),
                _ => {
                    log::warn!(
                        "System group '{}' in {} has no role in the same partition",
                        group.name,
                        self.schema
                    );
                    None
                }
            })
            .collect())
    }

    /// Memberships of `user_id` restricted to `group_ids`.
    pub async fn memberships_in(
        &self,
        user_id: Uuid,
        group_ids: &[Uuid],
    ) -> Result<Vec<group_membership::Model>, RepositoryError> {
        if group_ids.is_empty() {
            return Ok(Vec::new());
        }

        Ok(group_membership::Entity::find()
            .filter(group_membership::Column::SchemaName.eq(self.schema))
            .filter(group_membership::Column::UserId.eq(user_id))
            .filter(group_membership::Column::GroupId.is_in(group_ids.iter().copied()))
            .all(self.conn)
            .await?)
    }

    /// All memberships of a user.
    pub async fn memberships_of(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<group_membership::Model>, RepositoryError> {
        Ok(group_membership::Entity::find()
            .filter(group_membership::Column::SchemaName.eq(self.schema))
            .filter(group_membership::Column::UserId.eq(user_id))
            .all(self.conn)
            .await?)
    }

    pub async fn add_membership(
        &self,
        user_id: Uuid,
        group_id: Uuid,
        role_id: Option<Uuid>,
        is_primary: bool,
    ) -> Result<group_membership::Model, RepositoryError> {
        Ok(group_membership::ActiveModel {
            id: Set(Uuid::new_v4()),
            schema_name: Set(self.schema.to_string()),
            user_id: Set(user_id),
            group_id: Set(group_id),
            role_id: Set(role_id),
            is_active: Set(true),
            is_primary: Set(is_primary),
            joined_at: Set(Utc::now().into()),
        }
        .insert(self.conn)
        .await?)
    }

    pub async fn remove_membership(&self, membership_id: Uuid) -> Result<(), RepositoryError> {
        group_membership::Entity::delete_many()
            .filter(group_membership::Column::SchemaName.eq(self.schema))
            .filter(group_membership::Column::Id.eq(membership_id))
            .exec(self.conn)
            .await?;
        Ok(())
    }

    /// Every group of the partition with its member count.
    pub async fn list_groups(&self) -> Result<Vec<GroupSummary>, RepositoryError> {
        let groups = group::Entity::find()
            .filter(group::Column::SchemaName.eq(self.schema))
            .order_by_asc(group::Column::Name)
            .find_also_related(role::Entity)
            .all(self.conn)
            .await?;

        let mut counts: HashMap<Uuid, u64> = HashMap::new();
        for membership in group_membership::Entity::find()
            .filter(group_membership::Column::SchemaName.eq(self.schema))
            .all(self.conn)
            .await?
        {
            *counts.entry(membership.group_id).or_default() += 1;
        }

        Ok(groups
            .into_iter()
            .map(|(group, role)| GroupSummary {
                member_count: counts.get(&group.id).copied().unwrap_or(0),
                role_code: role.map(|role| role.code),
                group,
            })
            .collect())
    }

    pub async fn find_group(&self, group_id: Uuid) -> Result<Option<group::Model>, RepositoryError> {
        Ok(group::Entity::find_by_id(group_id)
            .filter(group::Column::SchemaName.eq(self.schema))
            .one(self.conn)
            .await?)
    }

    /// Members of one group with their user rows.
    pub async fn members_of(
        &self,
        group_id: Uuid,
    ) -> Result<Vec<(group_membership::Model, user::Model)>, RepositoryError> {
        let rows = group_membership::Entity::find()
            .filter(group_membership::Column::SchemaName.eq(self.schema))
            .filter(group_membership::Column::GroupId.eq(group_id))
            .order_by_asc(group_membership::Column::JoinedAt)
            .find_also_related(user::Entity)
            .all(self.conn)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(membership, user)| user.map(|user| (membership, user)))
            .collect())
    }
}
