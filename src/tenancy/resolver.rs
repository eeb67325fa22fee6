//! # Tenant Resolver
//!
//! Decides which tenant owns a request by trying a fixed sequence of
//! strategies; the first one that matches wins:
//!
//! 1. bypass header (`X-Skip-Interceptor: true`): no tenant at all
//! 2. refresh credential on the exact refresh path
//! 3. public path prefix: the public partition
//! 4. bearer access token carrying a `tenant_id` claim
//! 5. `Host` header matched against the domain table
//! 6. `localhost` / loopback: the configured development tenant
//!
//! The refresh rule is an exact-path rule and sits ahead of the prefix
//! allowlist, since `/api/token/` would otherwise swallow it. Unusable
//! input (bad token, unknown tenant in a claim) only means "no match".
//! Missing public/dev tenants and database failures are configuration
//! errors.

use std::net::IpAddr;
use std::sync::Arc;

use axum::{
    Json,
    http::{HeaderMap, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use sea_orm::DatabaseConnection;
use serde_json::json;
use thiserror::Error;

use super::directory::{DirectoryError, TenantDirectory, normalize_hostname};
use crate::models::tenant;
use crate::partition::PartitionScope;
use crate::tokens::{ACCESS_COOKIE, REFRESH_COOKIE, REFRESH_HEADER, TokenCodec};

pub const BYPASS_HEADER: &str = "x-skip-interceptor";
pub const REFRESH_PATH: &str = "/api/token/refresh/";

/// Path prefixes served from the public partition.
pub const PUBLIC_PATH_PREFIXES: &[&str] = &[
    "/api/tenants/",
    "/api/docs/",
    "/api/schema/",
    "/api/token/",
    "/accounts/",
    "/api/social/callback/",
    "/api/admin/create/",
];

/// Resolution strategies in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    Bypass,
    Refresh,
    PublicPath,
    Bearer,
    Hostname,
    LocalDev,
}

impl Strategy {
    pub const ORDER: [Strategy; 6] = [
        Strategy::Bypass,
        Strategy::Refresh,
        Strategy::PublicPath,
        Strategy::Bearer,
        Strategy::Hostname,
        Strategy::LocalDev,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Bypass => "bypass",
            Strategy::Refresh => "refresh",
            Strategy::PublicPath => "public_path",
            Strategy::Bearer => "bearer",
            Strategy::Hostname => "hostname",
            Strategy::LocalDev => "local_dev",
        }
    }
}

/// The tenant owning the current request and its active partition.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant: tenant::Model,
    pub partition: PartitionScope,
    pub strategy: Strategy,
}

/// Outcome of a successful resolution pass.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// The bypass header was present; the request carries no tenant.
    Bypassed,
    Resolved(TenantContext),
}

/// The parts of a request the resolver looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestFacts {
    pub path: String,
    /// Hostname without port, lower-cased.
    pub hostname: Option<String>,
    /// Hostname without port, as the client sent it.
    pub host_as_sent: Option<String>,
    pub bypass: bool,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl RequestFacts {
    pub fn from_request_parts(uri: &Uri, headers: &HeaderMap) -> Self {
        let bypass = headers
            .get(BYPASS_HEADER)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value == "true");

        let host_as_sent = headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .or_else(|| uri.authority().map(|authority| authority.as_str().to_string()))
            .map(|raw| strip_port(&raw).to_string())
            .filter(|host| !host.is_empty());
        let hostname = host_as_sent
            .as_deref()
            .map(normalize_hostname)
            .filter(|host| !host.is_empty());

        let cookies = CookieJar::from_headers(headers);

        let access_token = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string())
            .or_else(|| cookies.get(ACCESS_COOKIE).map(|c| c.value().to_string()))
            .filter(|token| !token.is_empty());

        let refresh_token = cookies
            .get(REFRESH_COOKIE)
            .map(|c| c.value().to_string())
            .or_else(|| {
                headers
                    .get(REFRESH_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .map(|value| value.trim().to_string())
            })
            .filter(|token| !token.is_empty());

        Self {
            path: uri.path().to_string(),
            hostname,
            host_as_sent,
            bypass,
            access_token,
            refresh_token,
        }
    }

    fn is_api_path(&self) -> bool {
        self.path.starts_with("/api/")
    }
}

/// Removes the port from a `Host` value, honouring bracketed IPv6 literals.
pub fn strip_port(raw: &str) -> &str {
    let raw = raw.trim();
    if let Some(rest) = raw.strip_prefix('[') {
        rest.split(']').next().unwrap_or_default()
    } else {
        raw.split(':').next().unwrap_or_default()
    }
}

fn is_loopback(hostname: &str) -> bool {
    hostname == "localhost"
        || hostname
            .parse::<IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false)
}

/// Resolution failures that end the request.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("public tenant '{0}' is not configured")]
    PublicTenantMissing(String),
    #[error("development tenant is not configured")]
    DevTenantMissing,
    #[error("no tenant found for hostname: {hostname}")]
    NoTenant { hostname: String, api: bool },
    #[error("tenant directory unavailable: {0}")]
    Directory(#[source] DirectoryError),
}

fn json_error(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

impl IntoResponse for ResolutionError {
    fn into_response(self) -> Response {
        match self {
            ResolutionError::PublicTenantMissing(_) => json_error(
                StatusCode::NOT_FOUND,
                "Public tenant not configured".to_string(),
            ),
            ResolutionError::DevTenantMissing => json_error(
                StatusCode::NOT_FOUND,
                "Development tenant not configured".to_string(),
            ),
            ResolutionError::NoTenant { hostname, api: true } => json_error(
                StatusCode::NOT_FOUND,
                format!("No tenant found for hostname: {hostname}"),
            ),
            ResolutionError::NoTenant { api: false, .. } => {
                (StatusCode::NOT_FOUND, "Not Found").into_response()
            }
            ResolutionError::Directory(_) => json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        }
    }
}

/// Settings the resolver needs beyond the directory.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub public_schema: String,
    pub dev_tenant_schema: Option<String>,
}

/// Runs the strategy chain for each request.
#[derive(Debug, Clone)]
pub struct TenantResolver {
    db: DatabaseConnection,
    directory: TenantDirectory,
    tokens: Arc<TokenCodec>,
    settings: ResolverSettings,
}

impl TenantResolver {
    pub fn new(db: DatabaseConnection, tokens: Arc<TokenCodec>, settings: ResolverSettings) -> Self {
        Self {
            directory: TenantDirectory::new(db.clone()),
            db,
            tokens,
            settings,
        }
    }

    /// Resolves the tenant for one request.
    pub async fn resolve(&self, facts: &RequestFacts) -> Result<Resolution, ResolutionError> {
        for strategy in Strategy::ORDER {
            let matched = match strategy {
                Strategy::Bypass => {
                    if facts.bypass {
                        record(strategy);
                        tracing::debug!(path = %facts.path, "Tenant resolution bypassed");
                        return Ok(Resolution::Bypassed);
                    }
                    None
                }
                Strategy::Refresh => self.from_refresh_credential(facts).await?,
                Strategy::PublicPath => self.from_public_path(facts).await?,
                Strategy::Bearer => self.from_bearer(facts).await?,
                Strategy::Hostname => self.from_hostname(facts).await?,
                Strategy::LocalDev => self.from_local_dev(facts).await?,
            };

            if let Some(tenant) = matched {
                return self.activate(tenant, strategy).map(Resolution::Resolved);
            }
        }

        metrics::counter!("tenant_resolution_total", "strategy" => "none").increment(1);
        let hostname = facts.host_as_sent.clone().unwrap_or_default();
        tracing::warn!(hostname = %hostname, path = %facts.path, "No tenant found for request");
        Err(ResolutionError::NoTenant {
            hostname,
            api: facts.is_api_path(),
        })
    }

    fn activate(
        &self,
        tenant: tenant::Model,
        strategy: Strategy,
    ) -> Result<TenantContext, ResolutionError> {
        let key = tenant.partition_key().map_err(|err| {
            tracing::error!(tenant_id = %tenant.id, error = %err, "Tenant has an invalid schema name");
            ResolutionError::Directory(DirectoryError::InvalidInput(err.to_string()))
        })?;

        record(strategy);
        tracing::debug!(
            strategy = strategy.as_str(),
            schema = %key,
            tenant_id = %tenant.id,
            "Resolved tenant"
        );

        Ok(TenantContext {
            partition: PartitionScope::new(self.db.clone(), key),
            tenant,
            strategy,
        })
    }

    async fn from_refresh_credential(
        &self,
        facts: &RequestFacts,
    ) -> Result<Option<tenant::Model>, ResolutionError> {
        if facts.path != REFRESH_PATH {
            return Ok(None);
        }
        let Some(token) = facts.refresh_token.as_deref() else {
            return Ok(None);
        };

        match self.tokens.decode_refresh(token) {
            Ok(claims) => self.tenant_by_claim(claims.tenant_id).await,
            Err(err) => {
                tracing::debug!(error = %err, "Refresh credential unusable for resolution");
                Ok(None)
            }
        }
    }

    async fn from_public_path(
        &self,
        facts: &RequestFacts,
    ) -> Result<Option<tenant::Model>, ResolutionError> {
        if !PUBLIC_PATH_PREFIXES
            .iter()
            .any(|prefix| facts.path.starts_with(prefix))
        {
            return Ok(None);
        }

        match self
            .directory
            .find_tenant_by_schema(&self.settings.public_schema)
            .await
        {
            Ok(tenant) => Ok(Some(tenant)),
            Err(DirectoryError::NotFound(_)) => {
                tracing::error!(
                    schema = %self.settings.public_schema,
                    "Public tenant not configured"
                );
                Err(ResolutionError::PublicTenantMissing(
                    self.settings.public_schema.clone(),
                ))
            }
            Err(err) => Err(directory_failure(err)),
        }
    }

    async fn from_bearer(
        &self,
        facts: &RequestFacts,
    ) -> Result<Option<tenant::Model>, ResolutionError> {
        let Some(token) = facts.access_token.as_deref() else {
            return Ok(None);
        };

        match self.tokens.decode_access(token) {
            Ok(claims) => self.tenant_by_claim(claims.tenant_id).await,
            Err(err) => {
                tracing::debug!(error = %err, "Bearer credential unusable for resolution");
                Ok(None)
            }
        }
    }

    async fn from_hostname(
        &self,
        facts: &RequestFacts,
    ) -> Result<Option<tenant::Model>, ResolutionError> {
        let Some(hostname) = facts.hostname.as_deref() else {
            return Ok(None);
        };

        let domain = self
            .directory
            .find_domain_by_hostname(hostname)
            .await
            .map_err(directory_failure)?;

        match domain {
            Some(domain) => self.tenant_by_claim(domain.tenant_id).await,
            None => Ok(None),
        }
    }

    async fn from_local_dev(
        &self,
        facts: &RequestFacts,
    ) -> Result<Option<tenant::Model>, ResolutionError> {
        if !facts.hostname.as_deref().is_some_and(is_loopback) {
            return Ok(None);
        }

        let Some(schema) = self.settings.dev_tenant_schema.as_deref() else {
            tracing::error!("Development tenant not configured; set LMS_DEV_TENANT_SCHEMA");
            return Err(ResolutionError::DevTenantMissing);
        };

        match self.directory.find_tenant_by_schema(schema).await {
            Ok(tenant) => Ok(Some(tenant)),
            Err(DirectoryError::NotFound(_)) => {
                tracing::error!(schema = %schema, "Development tenant not found");
                Err(ResolutionError::DevTenantMissing)
            }
            Err(err) => Err(directory_failure(err)),
        }
    }

    /// Looks up a tenant named by a credential or domain; unknown ids do not match.
    async fn tenant_by_claim(
        &self,
        tenant_id: uuid::Uuid,
    ) -> Result<Option<tenant::Model>, ResolutionError> {
        match self.directory.find_tenant_by_id(tenant_id).await {
            Ok(tenant) => Ok(Some(tenant)),
            Err(DirectoryError::NotFound(_)) => {
                tracing::warn!(tenant_id = %tenant_id, "Credential references unknown tenant");
                Ok(None)
            }
            Err(err) => Err(directory_failure(err)),
        }
    }
}

fn directory_failure(err: DirectoryError) -> ResolutionError {
    tracing::error!(error = %err, "Tenant directory lookup failed");
    ResolutionError::Directory(err)
}

fn record(strategy: Strategy) {
    metrics::counter!("tenant_resolution_total", "strategy" => strategy.as_str()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn facts(uri: &str, headers: &[(&str, &str)]) -> RequestFacts {
        let uri: Uri = uri.parse().unwrap();
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.append(
                header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        RequestFacts::from_request_parts(&uri, &map)
    }

    #[test]
    fn strips_ports_and_ipv6_brackets() {
        assert_eq!(strip_port("Acme.Example.com:8000"), "Acme.Example.com");
        assert_eq!(strip_port("acme.example.com"), "acme.example.com");
        assert_eq!(strip_port("[::1]:8000"), "::1");
        assert_eq!(strip_port("127.0.0.1:3000"), "127.0.0.1");
    }

    #[test]
    fn loopback_detection() {
        assert!(is_loopback("localhost"));
        assert!(is_loopback("127.0.0.1"));
        assert!(is_loopback("::1"));
        assert!(!is_loopback("10.0.0.1"));
        assert!(!is_loopback("acme.example.com"));
    }

    #[test]
    fn collects_credentials_from_headers_and_cookies() {
        let f = facts(
            "/api/courses/",
            &[
                ("host", "acme.example.com:443"),
                ("authorization", "Bearer abc"),
                ("cookie", "refresh_token=def; other=1"),
            ],
        );
        assert_eq!(f.hostname.as_deref(), Some("acme.example.com"));
        assert_eq!(f.access_token.as_deref(), Some("abc"));
        assert_eq!(f.refresh_token.as_deref(), Some("def"));
        assert!(!f.bypass);
        assert!(f.is_api_path());

        let f = facts("/dashboard", &[("cookie", "access_token=xyz")]);
        assert_eq!(f.access_token.as_deref(), Some("xyz"));
        assert!(f.hostname.is_none());
        assert!(!f.is_api_path());
    }

    #[test]
    fn bypass_header_value_must_be_exactly_true() {
        assert!(facts("/api/x/", &[("X-Skip-Interceptor", "true")]).bypass);
        assert!(!facts("/api/x/", &[("X-Skip-Interceptor", "TRUE")]).bypass);
        assert!(!facts("/api/x/", &[("X-Skip-Interceptor", " true")]).bypass);
        assert!(!facts("/api/x/", &[("X-Skip-Interceptor", "yes")]).bypass);
    }

    #[test]
    fn keeps_the_host_as_sent_next_to_the_normalized_one() {
        let f = facts("/api/x/", &[("host", "Acme.Example.COM:8000")]);
        assert_eq!(f.hostname.as_deref(), Some("acme.example.com"));
        assert_eq!(f.host_as_sent.as_deref(), Some("Acme.Example.COM"));
    }

    #[test]
    fn strategy_order_is_fixed() {
        let names: Vec<_> = Strategy::ORDER.iter().map(|s| s.as_str()).collect();
        assert_eq!(
            names,
            ["bypass", "refresh", "public_path", "bearer", "hostname", "local_dev"]
        );
    }

    #[tokio::test]
    async fn unresolved_api_path_returns_json_404() {
        let response = ResolutionError::NoTenant {
            hostname: "unknown.example.com".to_string(),
            api: true,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            json,
            json!({"error": "No tenant found for hostname: unknown.example.com"})
        );
    }

    #[tokio::test]
    async fn directory_failure_hides_detail() {
        let response = ResolutionError::Directory(DirectoryError::Database(
            sea_orm::DbErr::Custom("password=hunter2".to_string()),
        ))
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], br#"{"error":"Internal server error"}"#);
    }
}
