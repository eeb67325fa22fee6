//! # Membership Synchronizer
//!
//! Keeps a user's memberships in system groups equal to the set of system
//! groups whose role matches the user's role. Hand-managed (non-system)
//! memberships are never touched.
//!
//! Passes for the same user are serialized by a per-user async lock, and the
//! removals and additions of one pass commit in a single transaction. Audit
//! events go out only after the commit. A failed pass is logged and
//! reported, never propagated: the next role-touching write heals it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use sea_orm::{ColumnTrait, DbErr, EntityTrait, QueryFilter, TransactionTrait};
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::{ActivityType, group_membership, user};
use crate::partition::PartitionScope;
use crate::repositories::{ActivityEvent, ActivitySink, MembershipRepository};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("user {0} not found in partition")]
    UserNotFound(Uuid),
    #[error("user belongs to partition '{user}', not '{active}'")]
    PartitionMismatch { user: String, active: String },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("membership sync database error: {0}")]
    Database(#[from] DbErr),
}

/// Changes applied by one pass, by group name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl SyncReport {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Result of [`MembershipSynchronizer::sync_user`].
#[derive(Debug)]
pub enum SyncOutcome {
    /// No partition was active; nothing to do.
    Skipped,
    Synced(SyncReport),
    Failed(SyncError),
}

impl SyncOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SyncOutcome::Skipped => "skipped",
            SyncOutcome::Synced(report) if report.is_noop() => "unchanged",
            SyncOutcome::Synced(_) => "changed",
            SyncOutcome::Failed(_) => "failed",
        }
    }
}

type LockKey = (String, Uuid);

/// Registry of per-user locks. Entries are dropped once no pass holds them.
#[derive(Debug, Default)]
struct UserLocks {
    inner: Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>,
}

impl UserLocks {
    async fn acquire(&self, key: &LockKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            Arc::clone(map.entry(key.clone()).or_default())
        };
        lock.lock_owned().await
    }

    fn release(&self, key: &LockKey) {
        let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        // Only the map's own reference left means nobody holds or waits.
        if map
            .get(key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            map.remove(key);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

/// Reconciles system group memberships with users' roles.
pub struct MembershipSynchronizer {
    sink: Arc<dyn ActivitySink>,
    locks: UserLocks,
}

impl std::fmt::Debug for MembershipSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MembershipSynchronizer")
            .field("locks", &self.locks)
            .finish_non_exhaustive()
    }
}

enum Change {
    Add {
        group_id: Uuid,
        group_name: String,
        role_id: Uuid,
    },
    Remove {
        membership: group_membership::Model,
        group_name: String,
    },
}

impl MembershipSynchronizer {
    pub fn new(sink: Arc<dyn ActivitySink>) -> Self {
        Self {
            sink,
            locks: UserLocks::default(),
        }
    }

    /// Runs one reconciliation pass for `user` in the active partition.
    pub async fn sync_user(
        &self,
        partition: Option<&PartitionScope>,
        user: &user::Model,
    ) -> SyncOutcome {
        let outcome = match partition {
            None => {
                tracing::debug!(user_id = %user.id, "No active partition; membership sync skipped");
                SyncOutcome::Skipped
            }
            Some(scope) => match self.sync_in_scope(scope, user).await {
                Ok(report) => SyncOutcome::Synced(report),
                Err(err) => {
                    tracing::error!(
                        schema = %scope.schema(),
                        user_id = %user.id,
                        error = %err,
                        "Membership sync failed"
                    );
                    SyncOutcome::Failed(err)
                }
            },
        };

        metrics::counter!("membership_sync_total", "outcome" => outcome.label()).increment(1);
        outcome
    }

    async fn sync_in_scope(
        &self,
        scope: &PartitionScope,
        user: &user::Model,
    ) -> Result<SyncReport, SyncError> {
        if user.schema_name != scope.schema() {
            return Err(SyncError::PartitionMismatch {
                user: user.schema_name.clone(),
                active: scope.schema().to_string(),
            });
        }

        let key: LockKey = (scope.schema().to_string(), user.id);
        let _held = scopeguard::guard(self.locks.acquire(&key).await, |guard| {
            drop(guard);
            self.locks.release(&key);
        });

        let txn = scope.db().begin().await?;

        // Re-read under the lock so concurrent passes converge on the latest role.
        let current = user::Entity::find_by_id(user.id)
            .filter(user::Column::SchemaName.eq(scope.schema()))
            .one(&txn)
            .await?
            .ok_or(SyncError::UserNotFound(user.id))?;

        let repo = MembershipRepository::new(&txn, scope.schema());
        let system_groups = repo.system_groups_with_roles().await?;
        let group_ids: Vec<Uuid> = system_groups.iter().map(|(group, _)| group.id).collect();
        let mut existing: HashMap<Uuid, group_membership::Model> = repo
            .memberships_in(current.id, &group_ids)
            .await?
            .into_iter()
            .map(|membership| (membership.group_id, membership))
            .collect();

        let mut changes = Vec::new();
        for (group, role) in system_groups {
            let desired = role.code == current.role.as_str();
            match (desired, existing.remove(&group.id)) {
                (true, None) => changes.push(Change::Add {
                    group_id: group.id,
                    group_name: group.name,
                    role_id: role.id,
                }),
                (false, Some(membership)) => changes.push(Change::Remove {
                    membership,
                    group_name: group.name,
                }),
                _ => {}
            }
        }

        // Removals first, then additions.
        changes.sort_by_key(|change| matches!(change, Change::Add { .. }));

        let mut report = SyncReport::default();
        for change in &changes {
            match change {
                Change::Remove {
                    membership,
                    group_name,
                } => {
                    repo.remove_membership(membership.id).await?;
                    report.removed.push(group_name.clone());
                }
                Change::Add {
                    group_id,
                    group_name,
                    role_id,
                } => {
                    repo.add_membership(current.id, *group_id, Some(*role_id), true)
                        .await?;
                    report.added.push(group_name.clone());
                }
            }
        }

        txn.commit().await?;

        for name in &report.removed {
            self.sink
                .record(ActivityEvent::new(
                    scope.key().clone(),
                    Some(current.id),
                    ActivityType::GroupRemoved,
                    format!("Removed from group {name} via role sync"),
                ))
                .await;
        }
        for name in &report.added {
            self.sink
                .record(ActivityEvent::new(
                    scope.key().clone(),
                    Some(current.id),
                    ActivityType::GroupAdded,
                    format!("Added to group {name} via role sync"),
                ))
                .await;
        }

        if !report.is_noop() {
            tracing::info!(
                schema = %scope.schema(),
                user_id = %current.id,
                role = %current.role,
                added = ?report.added,
                removed = ?report.removed,
                "Synchronized system group memberships"
            );
        }

        Ok(report)
    }
}
