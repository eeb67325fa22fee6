//! # Authentication and Authorization
//!
//! Operator bearer authentication for the provisioning API, plus extractors
//! for the resolved tenant and the authenticated tenant user.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::AppConfig;
use crate::error::{ApiError, RepositoryError, forbidden, unauthorized, validation_error};
use crate::models::{RoleCode, user};
use crate::repositories::UserRepository;
use crate::server::AppState;
use crate::tenancy::TenantContext;
use crate::tokens::{ACCESS_COOKIE, Claims, TokenCodec};

/// Marker type for authenticated operator requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorAuth;

/// Authentication failures for tenant users and operators.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingCredentials,
    #[error("Authorization header must use Bearer scheme")]
    InvalidScheme,
    #[error("Invalid bearer token")]
    InvalidOperatorToken,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Token was issued for another tenant")]
    TenantMismatch,
    #[error("Account is suspended")]
    Suspended,
    #[error("Administrator role required")]
    AdminRequired,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Suspended | AuthError::AdminRequired => forbidden(Some(&err.to_string())),
            AuthError::Repository(err) => err.into(),
            other => unauthorized(Some(&other.to_string())),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.config)
    }
}

impl FromRef<AppState> for Arc<TokenCodec> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.tokens)
    }
}

/// Middleware guarding operator routes with the configured bearer tokens
pub async fn operator_auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(request.headers())?;
    validate_operator_token(&config, token)?;

    tracing::info!("Authenticated operator request");
    request.extensions_mut().insert(OperatorAuth);

    Ok(next.run(request).await)
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingCredentials)?
        .to_str()
        .map_err(|_| AuthError::InvalidScheme)?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or(AuthError::InvalidScheme)
}

fn validate_operator_token(config: &AppConfig, token: &str) -> Result<(), AuthError> {
    let is_valid = config
        .operator_tokens
        .iter()
        .any(|configured| ConstantTimeEq::ct_eq(token.as_bytes(), configured.as_bytes()).into());

    if is_valid {
        Ok(())
    } else {
        Err(AuthError::InvalidOperatorToken)
    }
}

/// Access token from the `Authorization` header, else the `access_token` cookie.
pub fn access_token_from_headers(headers: &HeaderMap) -> Option<String> {
    extract_bearer_token(headers)
        .ok()
        .map(str::to_string)
        .or_else(|| {
            CookieJar::from_headers(headers)
                .get(ACCESS_COOKIE)
                .map(|cookie| cookie.value().to_string())
        })
        .filter(|token| !token.is_empty())
}

impl<S> FromRequestParts<S> for OperatorAuth
where
    Arc<AppConfig>: FromRef<S>,
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<OperatorAuth>()
            .copied()
            .ok_or_else(|| unauthorized(Some("Operator authentication required")))
    }
}

impl<S> FromRequestParts<S> for TenantContext
where
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TenantContext>()
            .cloned()
            .ok_or_else(|| {
                validation_error(
                    "Tenant context missing",
                    serde_json::json!({ "tenant": "No tenant was resolved for this request" }),
                )
            })
    }
}

/// A user of the resolved tenant holding a valid access token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user: user::Model,
    pub claims: Claims,
    pub context: TenantContext,
}

impl AuthenticatedUser {
    pub fn ensure_admin(&self) -> Result<(), AuthError> {
        if self.user.role == RoleCode::Admin {
            Ok(())
        } else {
            Err(AuthError::AdminRequired)
        }
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<TokenCodec>: FromRef<S>,
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let context = TenantContext::from_request_parts(parts, state).await?;
        let token = access_token_from_headers(&parts.headers).ok_or(AuthError::MissingCredentials)?;

        let codec = Arc::<TokenCodec>::from_ref(state);
        let claims = codec.decode_access(&token).map_err(|err| {
            tracing::debug!(error = %err, "Access token rejected");
            AuthError::InvalidToken
        })?;

        if claims.tenant_id != context.tenant.id {
            tracing::warn!(
                schema = %context.partition.key(),
                token_tenant = %claims.tenant_id,
                "Access token presented to another tenant"
            );
            return Err(AuthError::TenantMismatch.into());
        }

        let user = UserRepository::new(&context.partition)
            .find_by_id(claims.sub)
            .await
            .map_err(AuthError::from)?
            .ok_or(AuthError::InvalidToken)?;
        if user.is_blocked() {
            return Err(AuthError::Suspended.into());
        }

        Ok(Self {
            user,
            claims,
            context,
        })
    }
}
