//! # Accounts
//!
//! User writes and session flows. Every user write that touches the role
//! (creation always does) is followed by a membership sync pass once the
//! user row is committed. Role touches are detected from an explicit
//! [`UserChangeSet`], so re-submitting the same role still triggers a sync.

use std::fmt;
use std::sync::Arc;

use axum::http::StatusCode;
use sea_orm::{DatabaseConnection, IntoActiveModel, Set};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ApiError, RepositoryError};
use crate::membership_sync::{MembershipSynchronizer, SyncOutcome};
use crate::models::{ActivityType, RoleCode, UserStatus, tenant, user};
use crate::partition::PartitionScope;
use crate::password::{self, PasswordError};
use crate::repositories::{ActivityEvent, ActivitySink, NewUserRecord, UserRepository};
use crate::tenancy::{DirectoryError, TenantContext, TenantDirectory, email_domain_of};
use crate::tokens::{Claims, TokenCodec, TokenError, TokenPair};

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Account is suspended")]
    AccountSuspended,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("No tenant found for this email domain")]
    UnknownEmailDomain,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Directory(DirectoryError),
    #[error(transparent)]
    Password(PasswordError),
}

impl From<DirectoryError> for AccountError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::InvalidInput(message) => AccountError::InvalidInput(message),
            other => AccountError::Directory(other),
        }
    }
}

impl From<PasswordError> for AccountError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::TooShort => AccountError::InvalidInput(err.to_string()),
            other => AccountError::Password(other),
        }
    }
}

impl From<TokenError> for AccountError {
    fn from(err: TokenError) -> Self {
        tracing::debug!(error = %err, "Token rejected");
        AccountError::InvalidToken
    }
}

impl From<AccountError> for ApiError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::InvalidInput(message) => {
                ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &message)
            }
            AccountError::InvalidCredentials | AccountError::InvalidToken => {
                crate::error::unauthorized(Some(&err.to_string()))
            }
            AccountError::AccountSuspended => crate::error::forbidden(Some(&err.to_string())),
            AccountError::UnknownEmailDomain => {
                ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &err.to_string())
            }
            AccountError::Repository(err) => err.into(),
            AccountError::Directory(err) => err.into(),
            AccountError::Password(err) => anyhow::Error::new(err).into(),
        }
    }
}

/// Input for [`AccountService::create_user`].
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewUser {
    #[schema(example = "jane@acme.example.com")]
    pub email: String,
    /// Optional; accounts without a password cannot log in with one
    pub password: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default = "RoleCode::default_role")]
    pub role: RoleCode,
}

/// Partial update for [`AccountService::update_user`]. Absent fields are untouched.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UserPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<RoleCode>,
    pub status: Option<UserStatus>,
    pub password: Option<String>,
}

/// Field named in a [`UserFieldChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UserField {
    FirstName,
    LastName,
    Role,
    Status,
    Password,
}

impl fmt::Display for UserField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UserField::FirstName => "first_name",
            UserField::LastName => "last_name",
            UserField::Role => "role",
            UserField::Status => "status",
            UserField::Password => "password",
        })
    }
}

/// One submitted field, with its value before and after the write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct UserFieldChange {
    pub field: UserField,
    pub old: String,
    pub new: String,
}

/// Fields a write touched. A field is touched when it was submitted,
/// whether or not its value changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct UserChangeSet {
    pub changes: Vec<UserFieldChange>,
}

impl UserChangeSet {
    pub fn touches(&self, field: UserField) -> bool {
        self.changes.iter().any(|change| change.field == field)
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    fn push(&mut self, field: UserField, old: impl Into<String>, new: impl Into<String>) {
        self.changes.push(UserFieldChange {
            field,
            old: old.into(),
            new: new.into(),
        });
    }

    fn summary(&self) -> String {
        let fields: Vec<String> = self.changes.iter().map(|c| c.field.to_string()).collect();
        format!("Updated fields: {}", fields.join(", "))
    }
}

/// A created user and the sync pass that followed.
#[derive(Debug)]
pub struct CreatedUser {
    pub user: user::Model,
    pub sync: SyncOutcome,
}

/// An updated user, what changed, and the sync pass if the role was touched.
#[derive(Debug)]
pub struct UpdatedUser {
    pub user: user::Model,
    pub changes: UserChangeSet,
    pub sync: Option<SyncOutcome>,
}

/// A successful login.
#[derive(Debug)]
pub struct LoginSuccess {
    pub tenant: tenant::Model,
    pub user: user::Model,
    pub tokens: TokenPair,
}

/// Orchestrates user writes and session flows.
#[derive(Clone)]
pub struct AccountService {
    db: DatabaseConnection,
    directory: TenantDirectory,
    tokens: Arc<TokenCodec>,
    synchronizer: Arc<MembershipSynchronizer>,
    sink: Arc<dyn ActivitySink>,
    max_login_attempts: u32,
}

impl AccountService {
    pub fn new(
        db: DatabaseConnection,
        tokens: Arc<TokenCodec>,
        synchronizer: Arc<MembershipSynchronizer>,
        sink: Arc<dyn ActivitySink>,
        max_login_attempts: u32,
    ) -> Self {
        Self {
            directory: TenantDirectory::new(db.clone()),
            db,
            tokens,
            synchronizer,
            sink,
            max_login_attempts,
        }
    }

    pub fn tokens(&self) -> &TokenCodec {
        &self.tokens
    }

    /// Creates a user in the active partition, then syncs its system groups.
    pub async fn create_user(
        &self,
        scope: &PartitionScope,
        tenant_id: Uuid,
        request: NewUser,
    ) -> Result<CreatedUser, AccountError> {
        email_domain_of(&request.email)?;
        let password_hash = request
            .password
            .as_deref()
            .map(password::hash_password)
            .transpose()?;

        let user = UserRepository::new(scope)
            .insert(NewUserRecord {
                tenant_id,
                email: request.email,
                password_hash,
                first_name: request.first_name.trim().to_string(),
                last_name: request.last_name.trim().to_string(),
                role: request.role,
                status: UserStatus::Active,
            })
            .await?;

        self.sink
            .record(ActivityEvent::new(
                scope.key().clone(),
                Some(user.id),
                ActivityType::UserCreated,
                format!("User created with role {}", user.role),
            ))
            .await;

        let sync = self.synchronizer.sync_user(Some(scope), &user).await;
        Ok(CreatedUser { user, sync })
    }

    /// Applies a patch; syncs system groups when the role was submitted.
    pub async fn update_user(
        &self,
        scope: &PartitionScope,
        user_id: Uuid,
        patch: UserPatch,
    ) -> Result<UpdatedUser, AccountError> {
        let repo = UserRepository::new(scope);
        let existing = repo.get(user_id).await?;

        let mut changes = UserChangeSet::default();
        let mut active = existing.clone().into_active_model();

        if let Some(first_name) = patch.first_name {
            let first_name = first_name.trim().to_string();
            changes.push(UserField::FirstName, &existing.first_name, &first_name);
            active.first_name = Set(first_name);
        }
        if let Some(last_name) = patch.last_name {
            let last_name = last_name.trim().to_string();
            changes.push(UserField::LastName, &existing.last_name, &last_name);
            active.last_name = Set(last_name);
        }
        if let Some(role) = patch.role {
            changes.push(UserField::Role, existing.role.as_str(), role.as_str());
            active.role = Set(role);
        }
        if let Some(status) = patch.status {
            changes.push(UserField::Status, existing.status.as_str(), status.as_str());
            active.status = Set(status);
            if status != UserStatus::Suspended {
                active.is_locked = Set(false);
                active.login_attempts = Set(0);
            }
        }
        if let Some(password) = patch.password {
            active.password_hash = Set(Some(password::hash_password(&password)?));
            changes.push(UserField::Password, "***", "***");
        }

        if changes.is_empty() {
            return Ok(UpdatedUser {
                user: existing,
                changes,
                sync: None,
            });
        }

        let user = repo.save(active).await?;

        self.sink
            .record(ActivityEvent::new(
                scope.key().clone(),
                Some(user.id),
                ActivityType::UserUpdated,
                changes.summary(),
            ))
            .await;

        let sync = if changes.touches(UserField::Role) {
            Some(self.synchronizer.sync_user(Some(scope), &user).await)
        } else {
            None
        };

        Ok(UpdatedUser {
            user,
            changes,
            sync,
        })
    }

    /// Password login. The tenant is chosen by the e-mail's domain.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        ip_address: Option<String>,
    ) -> Result<LoginSuccess, AccountError> {
        let domain = email_domain_of(email)?;
        let tenant = self
            .directory
            .find_tenant_by_email_domain(&domain)
            .await?
            .ok_or(AccountError::UnknownEmailDomain)?;
        let scope = self.scope_for(&tenant)?;
        let repo = UserRepository::new(&scope);

        let user = repo
            .find_by_email(email)
            .await?
            .ok_or(AccountError::InvalidCredentials)?;

        if user.is_blocked() {
            return Err(AccountError::AccountSuspended);
        }

        let verified = user
            .password_hash
            .as_deref()
            .is_some_and(|hash| password::verify_password(password, hash));

        if !verified {
            let failed = repo
                .record_failed_login(user.id, self.max_login_attempts)
                .await?;
            if failed.suspended_now {
                tracing::warn!(
                    schema = %scope.schema(),
                    user_id = %failed.user.id,
                    attempts = failed.user.login_attempts,
                    "Account suspended after repeated failed logins"
                );
                self.sink
                    .record(
                        ActivityEvent {
                            ip_address,
                            ..ActivityEvent::new(
                                scope.key().clone(),
                                Some(failed.user.id),
                                ActivityType::AccountSuspended,
                                format!(
                                    "Account suspended after {} failed login attempts",
                                    failed.user.login_attempts
                                ),
                            )
                        }
                        .failed(),
                    )
                    .await;
                return Err(AccountError::AccountSuspended);
            }

            // Suspended by a concurrent attempt.
            if failed.user.is_blocked() {
                return Err(AccountError::AccountSuspended);
            }

            self.sink
                .record(
                    ActivityEvent {
                        ip_address,
                        ..ActivityEvent::new(
                            scope.key().clone(),
                            Some(failed.user.id),
                            ActivityType::LoginFailed,
                            "Invalid password",
                        )
                    }
                    .failed(),
                )
                .await;
            return Err(AccountError::InvalidCredentials);
        }

        let user = repo
            .record_successful_login(user.id)
            .await?
            .ok_or(AccountError::AccountSuspended)?;
        let tokens = self.tokens.issue_pair(&user, &tenant)?;

        self.sink
            .record(ActivityEvent {
                ip_address,
                ..ActivityEvent::new(
                    scope.key().clone(),
                    Some(user.id),
                    ActivityType::Login,
                    "User logged in",
                )
            })
            .await;

        Ok(LoginSuccess {
            tenant,
            user,
            tokens,
        })
    }

    /// Rotates both tokens for the tenant the refresh credential resolved to.
    pub async fn refresh(
        &self,
        context: &TenantContext,
        refresh_token: &str,
    ) -> Result<(user::Model, TokenPair), AccountError> {
        let claims = self.tokens.decode_refresh(refresh_token)?;
        if claims.tenant_id != context.tenant.id {
            return Err(AccountError::InvalidToken);
        }

        let user = UserRepository::new(&context.partition)
            .find_by_id(claims.sub)
            .await?
            .ok_or(AccountError::InvalidToken)?;
        if user.is_blocked() {
            return Err(AccountError::AccountSuspended);
        }

        let tokens = self.tokens.issue_pair(&user, &context.tenant)?;
        self.sink
            .record(ActivityEvent::new(
                context.partition.key().clone(),
                Some(user.id),
                ActivityType::TokenRefreshed,
                "Session tokens rotated",
            ))
            .await;

        Ok((user, tokens))
    }

    /// Resolves an access token to its tenant and user.
    pub async fn validate(
        &self,
        access_token: &str,
    ) -> Result<(tenant::Model, user::Model, Claims), AccountError> {
        let claims = self.tokens.decode_access(access_token)?;
        let tenant = match self.directory.find_tenant_by_id(claims.tenant_id).await {
            Ok(tenant) => tenant,
            Err(DirectoryError::NotFound(_)) => return Err(AccountError::InvalidToken),
            Err(err) => return Err(err.into()),
        };
        let scope = self.scope_for(&tenant)?;

        let user = UserRepository::new(&scope)
            .find_by_id(claims.sub)
            .await?
            .ok_or(AccountError::InvalidToken)?;
        if user.is_blocked() {
            return Err(AccountError::AccountSuspended);
        }

        Ok((tenant, user, claims))
    }

    /// Records a logout for the user, if known.
    pub async fn logout(&self, context: &TenantContext, user_id: Option<Uuid>) {
        self.sink
            .record(ActivityEvent::new(
                context.partition.key().clone(),
                user_id,
                ActivityType::Logout,
                "User logged out",
            ))
            .await;
    }

    fn scope_for(&self, tenant: &tenant::Model) -> Result<PartitionScope, AccountError> {
        let key = tenant
            .partition_key()
            .map_err(|err| AccountError::Directory(DirectoryError::InvalidInput(err.to_string())))?;
        Ok(PartitionScope::new(self.db.clone(), key))
    }
}
