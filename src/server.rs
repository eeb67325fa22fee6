//! # Server Configuration
//!
//! Router assembly, shared state and the OpenAPI document for the LMS API.

use std::sync::Arc;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post},
};
use sea_orm::DatabaseConnection;
use tower_http::trace::TraceLayer;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::accounts::AccountService;
use crate::auth::operator_auth_middleware;
use crate::config::AppConfig;
use crate::handlers;
use crate::membership_sync::MembershipSynchronizer;
use crate::repositories::{ActivitySink, DbActivitySink};
use crate::telemetry::trace_context_middleware;
use crate::tenancy::{ResolverSettings, TenantDirectory, TenantResolver, tenant_resolution_middleware};
use crate::tokens::{TokenCodec, TokenError};

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub tokens: Arc<TokenCodec>,
    pub directory: TenantDirectory,
    pub resolver: TenantResolver,
    pub accounts: AccountService,
    /// Origin echoed in CORS headers on tenant responses
    pub frontend_origin: String,
}

impl AppState {
    /// Wires the services on top of one connection pool.
    pub fn new(config: Arc<AppConfig>, db: DatabaseConnection) -> Result<Self, TokenError> {
        let tokens = Arc::new(TokenCodec::from_config(&config)?);
        let sink: Arc<dyn ActivitySink> = Arc::new(DbActivitySink::new(db.clone()));
        let synchronizer = Arc::new(MembershipSynchronizer::new(Arc::clone(&sink)));

        let resolver = TenantResolver::new(
            db.clone(),
            Arc::clone(&tokens),
            ResolverSettings {
                public_schema: config.public_schema.clone(),
                dev_tenant_schema: config.dev_tenant_schema.clone(),
            },
        );
        let accounts = AccountService::new(
            db.clone(),
            Arc::clone(&tokens),
            synchronizer,
            sink,
            config.max_login_attempts,
        );

        Ok(Self {
            frontend_origin: config.frontend_origin(),
            directory: TenantDirectory::new(db.clone()),
            config,
            db,
            tokens,
            resolver,
            accounts,
        })
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let operator_routes = Router::new()
        .route(
            "/api/tenants/",
            get(handlers::tenants::list_tenants).post(handlers::tenants::create_tenant),
        )
        .route_layer(from_fn_with_state(
            Arc::clone(&state.config),
            operator_auth_middleware,
        ));

    // Everything here runs behind tenant resolution.
    let tenant_routes = Router::new()
        .route("/api/token/", post(handlers::session::login))
        .route("/api/token/refresh/", post(handlers::session::refresh))
        .route("/api/token/validate/", get(handlers::session::validate))
        .route("/api/logout/", post(handlers::session::logout))
        .route(
            "/api/users/",
            get(handlers::users::list_users).post(handlers::users::create_user),
        )
        .route("/api/users/{id}", patch(handlers::users::update_user))
        .route(
            "/api/users/{id}/activity",
            get(handlers::users::list_user_activity),
        )
        .route("/api/groups/", get(handlers::groups::list_groups))
        .route(
            "/api/groups/{id}/members",
            get(handlers::groups::list_group_members),
        )
        .merge(operator_routes)
        .fallback(handlers::fallback)
        .layer(from_fn_with_state(
            state.clone(),
            tenant_resolution_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .merge(tenant_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(from_fn(trace_context_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Starts the server with the given configuration
pub async fn run_server(config: AppConfig, db: DatabaseConnection) -> anyhow::Result<()> {
    let addr = config
        .bind_addr()
        .map_err(|e| anyhow::anyhow!("Invalid server address: {}", e))?;
    let profile = config.profile.clone();

    let state = AppState::new(Arc::new(config), db)?;
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, %profile, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("Operator token")
                    .build(),
            ),
        );
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::health,
        crate::handlers::tenants::list_tenants,
        crate::handlers::tenants::create_tenant,
        crate::handlers::session::login,
        crate::handlers::session::refresh,
        crate::handlers::session::validate,
        crate::handlers::session::logout,
        crate::handlers::users::list_users,
        crate::handlers::users::create_user,
        crate::handlers::users::update_user,
        crate::handlers::users::list_user_activity,
        crate::handlers::groups::list_groups,
        crate::handlers::groups::list_group_members,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::types::HealthResponse,
            crate::models::RoleCode,
            crate::models::UserStatus,
            crate::models::ActivityType,
            crate::error::ApiError,
            crate::accounts::NewUser,
            crate::accounts::UserPatch,
            crate::accounts::UserField,
            crate::accounts::UserFieldChange,
            crate::handlers::types::UserResponse,
            crate::handlers::types::DomainResponse,
            crate::handlers::types::TenantResponse,
            crate::handlers::types::SyncSummary,
            crate::handlers::types::CreateUserResponse,
            crate::handlers::types::UpdateUserResponse,
            crate::handlers::types::GroupResponse,
            crate::handlers::types::GroupMemberResponse,
            crate::handlers::tenants::CreateTenantRequestDto,
            crate::handlers::tenants::CreateTenantResponseDto,
            crate::handlers::session::LoginRequest,
            crate::handlers::session::LoginResponse,
            crate::handlers::session::RefreshResponse,
            crate::handlers::session::ValidateResponse,
            crate::handlers::session::MessageResponse,
            crate::handlers::users::ActivityResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "tenants", description = "Operator tenant provisioning"),
        (name = "session", description = "Login, refresh and logout"),
        (name = "users", description = "Tenant users"),
        (name = "groups", description = "Tenant groups and memberships"),
    ),
    info(
        title = "LMS API",
        description = "Multi-tenant LMS core: tenant resolution, users and role-driven groups",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_tenant_scoped_paths() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/tenants/",
            "/api/token/",
            "/api/token/refresh/",
            "/api/users/{id}",
            "/api/groups/{id}/members",
            "/health",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        assert!(
            doc.components
                .as_ref()
                .is_some_and(|c| c.security_schemes.contains_key("bearer_auth"))
        );
    }

    #[test]
    fn state_requires_signing_key() {
        let config = Arc::new(AppConfig::default());
        let result = AppState::new(config, DatabaseConnection::default());
        assert!(matches!(result, Err(TokenError::MissingKey)));
    }
}
