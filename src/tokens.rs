//! # Session Tokens
//!
//! HS256 access/refresh tokens that carry the owning tenant, and the
//! `access_token` / `refresh_token` cookies they travel in.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::models::{tenant, user};

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";
/// Header alternative to the refresh cookie for non-browser clients.
pub const REFRESH_HEADER: &str = "x-refresh-token";

/// Which of the two token kinds a JWT is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT claims shared by access and refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: Uuid,
    pub tenant_id: Uuid,
    pub tenant_schema: String,
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token rejected: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
    #[error("expected a {expected:?} token")]
    WrongType { expected: TokenType },
    #[error("signing key is not configured")]
    MissingKey,
}

/// Freshly issued access/refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
    pub access_ttl_seconds: u64,
    pub refresh_ttl_seconds: u64,
}

/// Issues and validates session tokens with the service-wide key.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl_seconds: u64,
    refresh_ttl_seconds: u64,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("access_ttl_seconds", &self.access_ttl_seconds)
            .field("refresh_ttl_seconds", &self.refresh_ttl_seconds)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(secret: &[u8], access_ttl_seconds: u64, refresh_ttl_seconds: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl_seconds,
            refresh_ttl_seconds,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, TokenError> {
        let secret = config.jwt_secret.as_deref().ok_or(TokenError::MissingKey)?;
        Ok(Self::new(
            secret,
            config.access_token_ttl_seconds,
            config.refresh_token_ttl_seconds,
        ))
    }

    /// Issues an access and a refresh token for `user` in `tenant`.
    pub fn issue_pair(
        &self,
        user: &user::Model,
        tenant: &tenant::Model,
    ) -> Result<TokenPair, TokenError> {
        let access = self.issue(user, tenant, TokenType::Access, self.access_ttl_seconds)?;
        let refresh = self.issue(user, tenant, TokenType::Refresh, self.refresh_ttl_seconds)?;
        Ok(TokenPair {
            access,
            refresh,
            access_ttl_seconds: self.access_ttl_seconds,
            refresh_ttl_seconds: self.refresh_ttl_seconds,
        })
    }

    fn issue(
        &self,
        user: &user::Model,
        tenant: &tenant::Model,
        token_type: TokenType,
        ttl_seconds: u64,
    ) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.id,
            tenant_id: tenant.id,
            tenant_schema: tenant.schema_name.clone(),
            token_type,
            iat: now,
            exp: now.saturating_add(i64::try_from(ttl_seconds).unwrap_or(i64::MAX)),
            jti: Uuid::new_v4(),
        };
        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding,
        )?)
    }

    pub fn decode_access(&self, token: &str) -> Result<Claims, TokenError> {
        self.decode_as(token, TokenType::Access)
    }

    pub fn decode_refresh(&self, token: &str) -> Result<Claims, TokenError> {
        self.decode_as(token, TokenType::Refresh)
    }

    fn decode_as(&self, token: &str, expected: TokenType) -> Result<Claims, TokenError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        if data.claims.token_type != expected {
            return Err(TokenError::WrongType { expected });
        }
        Ok(data.claims)
    }
}

fn session_cookie(name: &'static str, value: String, ttl_seconds: u64, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .path("/")
        .secure(secure)
        .same_site(if secure { SameSite::None } else { SameSite::Lax })
        .max_age(time::Duration::seconds(
            i64::try_from(ttl_seconds).unwrap_or(i64::MAX),
        ))
        .build()
}

/// Adds both session cookies to the jar.
pub fn set_session_cookies(jar: CookieJar, pair: &TokenPair, secure: bool) -> CookieJar {
    jar.add(session_cookie(
        ACCESS_COOKIE,
        pair.access.clone(),
        pair.access_ttl_seconds,
        secure,
    ))
    .add(session_cookie(
        REFRESH_COOKIE,
        pair.refresh.clone(),
        pair.refresh_ttl_seconds,
        secure,
    ))
}

fn removal_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = Cookie::build((name, "")).path("/").build();
    cookie.make_removal();
    cookie
}

/// Expires both session cookies, whether or not the request carried them.
pub fn clear_session_cookies(jar: CookieJar) -> CookieJar {
    jar.add(removal_cookie(ACCESS_COOKIE))
        .add(removal_cookie(REFRESH_COOKIE))
}
