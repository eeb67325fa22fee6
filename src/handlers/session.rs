//! # Session Handlers
//!
//! Cookie-based login, token refresh, validation and logout.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::access_token_from_headers;
use crate::error::{ApiError, unauthorized};
use crate::handlers::types::UserResponse;
use crate::server::AppState;
use crate::tenancy::{Strategy, TenantContext};
use crate::tokens::{REFRESH_COOKIE, REFRESH_HEADER, clear_session_cookies, set_session_cookies};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "jane@acme.example.com")]
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub tenant_id: Uuid,
    #[schema(example = "acme")]
    pub tenant_schema: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RefreshResponse {
    /// Newly issued access token (also set as a cookie)
    pub access: String,
    pub tenant_id: Uuid,
    pub tenant_schema: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ValidateResponse {
    pub user: UserResponse,
    pub tenant_id: Uuid,
    pub tenant_schema: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "Logged out")]
    pub message: String,
}

/// First address in `X-Forwarded-For`, else `X-Real-IP`.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|value| value.to_str().ok())
        })
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

/// Log in with e-mail and password; the tenant is chosen by the e-mail domain
#[utoipa::path(
    post,
    path = "/api/token/",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in; session cookies set", body = LoginResponse),
        (status = 400, description = "Malformed e-mail or unknown e-mail domain", body = ApiError),
        (status = 401, description = "Invalid credentials", body = ApiError),
        (status = 403, description = "Account suspended", body = ApiError)
    ),
    tag = "session"
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    let session = state
        .accounts
        .login(&request.email, &request.password, client_ip(&headers))
        .await?;

    let jar = set_session_cookies(jar, &session.tokens, state.config.cookie_secure);
    Ok((
        jar,
        Json(LoginResponse {
            tenant_id: session.tenant.id,
            tenant_schema: session.tenant.schema_name,
            user: session.user.into(),
        }),
    ))
}

/// Rotate the session using the refresh cookie
#[utoipa::path(
    post,
    path = "/api/token/refresh/",
    responses(
        (status = 200, description = "Session rotated; cookies replaced", body = RefreshResponse),
        (status = 401, description = "Missing, invalid or foreign refresh token", body = ApiError),
        (status = 403, description = "Account suspended", body = ApiError)
    ),
    tag = "session"
)]
pub async fn refresh(
    State(state): State<AppState>,
    context: TenantContext,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(CookieJar, Json<RefreshResponse>), ApiError> {
    if context.strategy != Strategy::Refresh {
        return Err(unauthorized(Some("Refresh token missing or invalid")));
    }

    let token = jar
        .get(REFRESH_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .or_else(|| {
            headers
                .get(REFRESH_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        })
        .ok_or_else(|| unauthorized(Some("Refresh token missing or invalid")))?;

    let (_user, tokens) = state.accounts.refresh(&context, &token).await?;
    let access = tokens.access.clone();
    let jar = set_session_cookies(jar, &tokens, state.config.cookie_secure);

    Ok((
        jar,
        Json(RefreshResponse {
            access,
            tenant_id: context.tenant.id,
            tenant_schema: context.tenant.schema_name,
        }),
    ))
}

/// Check the current access token and return its user
#[utoipa::path(
    get,
    path = "/api/token/validate/",
    responses(
        (status = 200, description = "Token valid", body = ValidateResponse),
        (status = 401, description = "Missing or invalid token", body = ApiError),
        (status = 403, description = "Account suspended", body = ApiError)
    ),
    tag = "session"
)]
pub async fn validate(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ValidateResponse>, ApiError> {
    let token = access_token_from_headers(&headers)
        .ok_or_else(|| unauthorized(Some("Authentication required")))?;
    let (tenant, user, _claims) = state.accounts.validate(&token).await?;

    Ok(Json(ValidateResponse {
        user: user.into(),
        tenant_id: tenant.id,
        tenant_schema: tenant.schema_name,
    }))
}

/// Log out of the resolved tenant and clear the session cookies
#[utoipa::path(
    post,
    path = "/api/logout/",
    responses(
        (status = 200, description = "Logged out; cookies cleared", body = MessageResponse),
        (status = 404, description = "No tenant resolved for the request")
    ),
    tag = "session"
)]
pub async fn logout(
    State(state): State<AppState>,
    context: TenantContext,
    headers: HeaderMap,
    jar: CookieJar,
) -> (StatusCode, CookieJar, Json<MessageResponse>) {
    let user_id = access_token_from_headers(&headers)
        .and_then(|token| state.accounts.tokens().decode_access(&token).ok())
        .filter(|claims| claims.tenant_id == context.tenant.id)
        .map(|claims| claims.sub);

    state.accounts.logout(&context, user_id).await;

    (
        StatusCode::OK,
        clear_session_cookies(jar),
        Json(MessageResponse {
            message: "Logged out".to_string(),
        }),
    )
}
