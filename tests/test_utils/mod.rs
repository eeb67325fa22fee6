//! Test utilities shared by the integration tests.
//!
//! Every test gets its own in-memory SQLite database with all migrations
//! applied. SQLite keeps an in-memory database per connection, so the pool
//! is pinned to a single connection.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
};
use lms::{
    accounts::NewUser,
    config::AppConfig,
    models::{RoleCode, UserStatus, tenant, user},
    partition::PartitionScope,
    repositories::{ActivityEvent, ActivitySink, NewUserRecord, UserRepository},
    server::{AppState, create_app},
    tenancy::{NewTenant, ProvisionedTenant, TenantDirectory},
};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use serde_json::Value;
use tower::ServiceExt;

pub const OPERATOR_TOKEN: &str = "operator-test-token";
pub const PASSWORD: &str = "correct-horse-battery";

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await?;

    Migrator::up(&db, None).await?;

    Ok(db)
}

/// Configuration with a signing key, an operator token and a dev tenant.
pub fn test_config() -> AppConfig {
    AppConfig {
        operator_tokens: vec![OPERATOR_TOKEN.to_string()],
        jwt_secret: Some(vec![7u8; 32]),
        dev_tenant_schema: Some("acme".to_string()),
        frontend_url: "http://app.example.com:5173".to_string(),
        max_login_attempts: 3,
        ..Default::default()
    }
}

pub fn build_state(db: DatabaseConnection, config: AppConfig) -> AppState {
    AppState::new(Arc::new(config), db).expect("test config has a signing key")
}

pub fn build_app(db: DatabaseConnection) -> (AppState, Router) {
    let state = build_state(db, test_config());
    (state.clone(), create_app(state))
}

/// Provisions a tenant (with seeded system groups) through the directory.
pub async fn provision_tenant(
    db: &DatabaseConnection,
    schema: &str,
    domains: &[&str],
) -> Result<ProvisionedTenant> {
    Ok(TenantDirectory::new(db.clone())
        .create_tenant(NewTenant {
            name: format!("{schema} organisation"),
            schema_name: schema.to_string(),
            domains: domains.iter().map(|d| d.to_string()).collect(),
        })
        .await?)
}

/// Provisions the public tenant plus `acme` and `globex` tenants.
pub async fn provision_standard_tenants(
    db: &DatabaseConnection,
) -> Result<(tenant::Model, tenant::Model, tenant::Model)> {
    let public = provision_tenant(db, "public", &["lms.example.com"]).await?;
    let acme = provision_tenant(db, "acme", &["acme.lms.example.com", "acme.example.com"]).await?;
    let globex =
        provision_tenant(db, "globex", &["globex.lms.example.com", "globex.example.com"]).await?;
    Ok((public.tenant, acme.tenant, globex.tenant))
}

pub fn scope_for(db: &DatabaseConnection, tenant: &tenant::Model) -> PartitionScope {
    PartitionScope::new(db.clone(), tenant.partition_key().expect("valid schema"))
}

/// Inserts a user row directly, without triggering a sync.
pub async fn insert_user(
    scope: &PartitionScope,
    tenant: &tenant::Model,
    email: &str,
    role: RoleCode,
) -> Result<user::Model> {
    Ok(UserRepository::new(scope)
        .insert(NewUserRecord {
            tenant_id: tenant.id,
            email: email.to_string(),
            password_hash: Some(lms::password::hash_password(PASSWORD)?),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            role,
            status: UserStatus::Active,
        })
        .await?)
}

/// Creates a user through the account service (sync included).
pub async fn create_user(
    state: &AppState,
    tenant: &tenant::Model,
    email: &str,
    role: RoleCode,
) -> Result<user::Model> {
    let scope = scope_for(&state.db, tenant);
    let created = state
        .accounts
        .create_user(
            &scope,
            tenant.id,
            NewUser {
                email: email.to_string(),
                password: Some(PASSWORD.to_string()),
                first_name: "Test".to_string(),
                last_name: "User".to_string(),
                role,
            },
        )
        .await?;
    Ok(created.user)
}

/// Access token for `user` in `tenant`.
pub fn access_token(state: &AppState, user: &user::Model, tenant: &tenant::Model) -> String {
    state
        .tokens
        .issue_pair(user, tenant)
        .expect("token issued")
        .access
}

/// Sends one request through the router and returns status, headers and JSON body.
pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = app.clone().oneshot(request).await.expect("router responds");
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()))
    };
    (status, headers, json)
}

pub fn get(uri: &str, host: &str) -> axum::http::request::Builder {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::HOST, host)
}

pub fn post(uri: &str, host: &str) -> axum::http::request::Builder {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::HOST, host)
        .header(header::CONTENT_TYPE, "application/json")
}

pub fn json_body(value: Value) -> Body {
    Body::from(value.to_string())
}

/// `name=value` pairs from every `Set-Cookie` header.
pub fn set_cookies(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|raw| raw.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .collect()
}

pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    set_cookies(headers)
        .into_iter()
        .find(|(cookie, _)| cookie == name)
        .map(|(_, value)| value)
}

/// Activity sink that keeps events in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ActivityEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ActivityEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

#[async_trait]
impl ActivitySink for RecordingSink {
    async fn record(&self, event: ActivityEvent) {
        self.events.lock().unwrap().push(event);
    }
}
