//! # User Repository
//!
//! Partition-scoped access to the `users` table. Every query is constrained
//! to the scope's schema.

use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::user::{self, Entity as User};
use crate::models::{RoleCode, UserStatus};
use crate::partition::PartitionScope;

/// Validated data for a new user row.
#[derive(Debug, Clone)]
pub struct NewUserRecord {
    pub tenant_id: Uuid,
    pub email: String,
    pub password_hash: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub role: RoleCode,
    pub status: UserStatus,
}

/// Result of recording a failed password attempt.
#[derive(Debug, Clone)]
pub struct FailedLogin {
    pub user: user::Model,
    /// True when this attempt crossed the limit and suspended the account.
    pub suspended_now: bool,
}

/// Repository for users of one partition
pub struct UserRepository<'a> {
    scope: &'a PartitionScope,
}

impl<'a> UserRepository<'a> {
    pub fn new(scope: &'a PartitionScope) -> Self {
        Self { scope }
    }

    pub async fn list(&self) -> Result<Vec<user::Model>, RepositoryError> {
        Ok(User::find()
            .filter(user::Column::SchemaName.eq(self.scope.schema()))
            .order_by_asc(user::Column::Email)
            .all(self.scope.db())
            .await?)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<user::Model>, RepositoryError> {
        Ok(User::find_by_id(id)
            .filter(user::Column::SchemaName.eq(self.scope.schema()))
            .one(self.scope.db())
            .await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<user::Model, RepositoryError> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound("User not found".to_string()))
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<user::Model>, RepositoryError> {
        Ok(User::find()
            .filter(user::Column::SchemaName.eq(self.scope.schema()))
            .filter(user::Column::Email.eq(email.trim().to_lowercase()))
            .one(self.scope.db())
            .await?)
    }

    pub async fn insert(&self, record: NewUserRecord) -> Result<user::Model, RepositoryError> {
        let now = Utc::now();
        let user = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            schema_name: Set(self.scope.schema().to_string()),
            tenant_id: Set(record.tenant_id),
            email: Set(record.email.trim().to_lowercase()),
            password_hash: Set(record.password_hash),
            first_name: Set(record.first_name),
            last_name: Set(record.last_name),
            role: Set(record.role),
            status: Set(record.status),
            is_locked: Set(false),
            login_attempts: Set(0),
            last_login_at: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        user.insert(self.scope.db()).await.map_err(|err| {
            match RepositoryError::database_error(err) {
                RepositoryError::Conflict(_) => {
                    RepositoryError::Conflict("A user with this email already exists".to_string())
                }
                other => other,
            }
        })
    }

    /// Persists changed columns of `model`, stamping `updated_at`.
    pub async fn save(&self, mut model: user::ActiveModel) -> Result<user::Model, RepositoryError> {
        model.updated_at = Set(Utc::now().into());
        Ok(model.update(self.scope.db()).await?)
    }

    /// Counts a failed password attempt; at `max_attempts` the account is
    /// suspended and locked.
    ///
    /// The increment runs in the database so concurrent attempts each get a
    /// distinct count, and only the attempt that flips the status reports
    /// `suspended_now`.
    pub async fn record_failed_login(
        &self,
        user_id: Uuid,
        max_attempts: u32,
    ) -> Result<FailedLogin, RepositoryError> {
        let db = self.scope.db();
        let limit = i32::try_from(max_attempts).unwrap_or(i32::MAX);

        let bumped = User::update_many()
            .col_expr(
                user::Column::LoginAttempts,
                Expr::col(user::Column::LoginAttempts).add(1),
            )
            .col_expr(user::Column::UpdatedAt, Expr::value(now()))
            .filter(user::Column::Id.eq(user_id))
            .filter(user::Column::SchemaName.eq(self.scope.schema()))
            .exec(db)
            .await?;
        if bumped.rows_affected == 0 {
            return Err(RepositoryError::NotFound("User not found".to_string()));
        }

        let suspended = User::update_many()
            .col_expr(
                user::Column::Status,
                Expr::value(UserStatus::Suspended.as_str()),
            )
            .col_expr(user::Column::IsLocked, Expr::value(true))
            .filter(user::Column::Id.eq(user_id))
            .filter(user::Column::SchemaName.eq(self.scope.schema()))
            .filter(user::Column::LoginAttempts.gte(limit))
            .filter(user::Column::Status.ne(UserStatus::Suspended.as_str()))
            .exec(db)
            .await?;

        Ok(FailedLogin {
            user: self.get(user_id).await?,
            suspended_now: suspended.rows_affected == 1,
        })
    }

    /// Resets the attempt counter and stamps `last_login_at`, unless the
    /// account was blocked after the password check. Returns `None` then.
    pub async fn record_successful_login(
        &self,
        user_id: Uuid,
    ) -> Result<Option<user::Model>, RepositoryError> {
        let stamp = now();
        let updated = User::update_many()
            .col_expr(user::Column::LoginAttempts, Expr::value(0))
            .col_expr(user::Column::LastLoginAt, Expr::value(stamp))
            .col_expr(user::Column::UpdatedAt, Expr::value(stamp))
            .filter(user::Column::Id.eq(user_id))
            .filter(user::Column::SchemaName.eq(self.scope.schema()))
            .filter(user::Column::Status.ne(UserStatus::Suspended.as_str()))
            .filter(user::Column::IsLocked.eq(false))
            .exec(self.scope.db())
            .await?;
        if updated.rows_affected == 0 {
            return Ok(None);
        }
        self.find_by_id(user_id).await
    }
}

fn now() -> DateTimeWithTimeZone {
    Utc::now().into()
}
