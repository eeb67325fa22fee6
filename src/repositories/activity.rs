//! # Activity Log
//!
//! Audit events are written through an [`ActivitySink`]. Recording never
//! fails the caller: sink errors are logged and dropped.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::user_activity::{self, ActivityType};
use crate::partition::{PartitionKey, PartitionScope};

/// One audit event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEvent {
    pub schema: PartitionKey,
    pub user_id: Option<Uuid>,
    pub activity_type: ActivityType,
    pub details: String,
    pub success: bool,
    pub ip_address: Option<String>,
}

impl ActivityEvent {
    pub fn new(
        schema: PartitionKey,
        user_id: Option<Uuid>,
        activity_type: ActivityType,
        details: impl Into<String>,
    ) -> Self {
        Self {
            schema,
            user_id,
            activity_type,
            details: details.into(),
            success: true,
            ip_address: None,
        }
    }

    pub fn failed(mut self) -> Self {
        self.success = false;
        self
    }
}

/// Destination for audit events.
#[async_trait]
pub trait ActivitySink: Send + Sync {
    /// Records an event. Implementations swallow their own failures.
    async fn record(&self, event: ActivityEvent);
}

/// Writes events to the partition's `user_activities` table.
#[derive(Debug, Clone)]
pub struct DbActivitySink {
    db: DatabaseConnection,
}

impl DbActivitySink {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ActivitySink for DbActivitySink {
    async fn record(&self, event: ActivityEvent) {
        let row = user_activity::ActiveModel {
            id: Set(Uuid::new_v4()),
            schema_name: Set(event.schema.as_str().to_string()),
            user_id: Set(event.user_id),
            activity_type: Set(event.activity_type),
            details: Set(event.details),
            status: Set(if event.success { "success" } else { "failed" }.to_string()),
            ip_address: Set(event.ip_address),
            created_at: Set(Utc::now().into()),
        };

        if let Err(err) = row.insert(&self.db).await {
            tracing::warn!(
                schema = %event.schema,
                activity = ?event.activity_type,
                error = %err,
                "Failed to record user activity"
            );
        }
    }
}

/// Read access to the activity log of one partition.
pub struct ActivityRepository<'a> {
    scope: &'a PartitionScope,
}

impl<'a> ActivityRepository<'a> {
    pub fn new(scope: &'a PartitionScope) -> Self {
        Self { scope }
    }

    /// Activity of one user, oldest first.
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<user_activity::Model>, RepositoryError> {
        Ok(user_activity::Entity::find()
            .filter(user_activity::Column::SchemaName.eq(self.scope.schema()))
            .filter(user_activity::Column::UserId.eq(user_id))
            .order_by_asc(user_activity::Column::CreatedAt)
            .all(self.scope.db())
            .await?)
    }
}
