//! # Tenant Directory
//!
//! Lookups over the shared `tenants` and `domains` tables, plus
//! operator-side provisioning. The `domains` table serves two purposes:
//! hostname routing for incoming requests and e-mail domain routing at
//! login. Each use has its own operation.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set, TransactionTrait,
};
use thiserror::Error;
use uuid::Uuid;

use crate::error::is_unique_violation;
use crate::models::{domain, tenant};
use crate::partition::PartitionKey;
use crate::seeds::{SeedReport, seed_system_groups};

/// Errors returned by directory operations.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{0} already exists")]
    Conflict(String),
    #[error("directory database error: {0}")]
    Database(#[from] DbErr),
}

/// Input for [`TenantDirectory::create_tenant`].
#[derive(Debug, Clone)]
pub struct NewTenant {
    pub name: String,
    pub schema_name: String,
    /// Hostnames to bind; the first becomes the primary domain.
    pub domains: Vec<String>,
}

/// A freshly provisioned tenant.
#[derive(Debug, Clone)]
pub struct ProvisionedTenant {
    pub tenant: tenant::Model,
    pub domains: Vec<domain::Model>,
    pub seeded: SeedReport,
}

/// Read access to the tenant directory, plus provisioning.
#[derive(Debug, Clone)]
pub struct TenantDirectory {
    db: DatabaseConnection,
}

impl TenantDirectory {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Active tenant owning the given partition.
    pub async fn find_tenant_by_schema(
        &self,
        schema_name: &str,
    ) -> Result<tenant::Model, DirectoryError> {
        tenant::Entity::find()
            .filter(tenant::Column::SchemaName.eq(schema_name))
            .filter(tenant::Column::IsActive.eq(true))
            .one(&self.db)
            .await?
            .ok_or_else(|| DirectoryError::NotFound(format!("tenant with schema '{schema_name}'")))
    }

    /// Active tenant with the given id.
    pub async fn find_tenant_by_id(&self, id: Uuid) -> Result<tenant::Model, DirectoryError> {
        tenant::Entity::find_by_id(id)
            .filter(tenant::Column::IsActive.eq(true))
            .one(&self.db)
            .await?
            .ok_or_else(|| DirectoryError::NotFound(format!("tenant {id}")))
    }

    /// Exact (case-insensitive) hostname match.
    pub async fn find_domain_by_hostname(
        &self,
        hostname: &str,
    ) -> Result<Option<domain::Model>, DirectoryError> {
        let normalized = normalize_hostname(hostname);
        if normalized.is_empty() {
            return Ok(None);
        }

        Ok(domain::Entity::find()
            .filter(domain::Column::Domain.eq(normalized))
            .one(&self.db)
            .await?)
    }

    /// Tenant whose domain equals the e-mail domain part (`user@<domain_part>`).
    pub async fn find_tenant_by_email_domain(
        &self,
        domain_part: &str,
    ) -> Result<Option<tenant::Model>, DirectoryError> {
        let normalized = normalize_hostname(domain_part);
        if normalized.is_empty() {
            return Ok(None);
        }

        let found = domain::Entity::find()
            .filter(domain::Column::Domain.eq(normalized))
            .find_also_related(tenant::Entity)
            .one(&self.db)
            .await?;

        Ok(found
            .and_then(|(_, tenant)| tenant)
            .filter(|tenant| tenant.is_active))
    }

    /// All tenants with their domains, ordered by schema name.
    pub async fn list_tenants(
        &self,
    ) -> Result<Vec<(tenant::Model, Vec<domain::Model>)>, DirectoryError> {
        Ok(tenant::Entity::find()
            .order_by_asc(tenant::Column::SchemaName)
            .find_with_related(domain::Entity)
            .all(&self.db)
            .await?)
    }

    /// Creates a tenant, binds its domains and seeds its system roles and
    /// groups in one transaction.
    pub async fn create_tenant(
        &self,
        request: NewTenant,
    ) -> Result<ProvisionedTenant, DirectoryError> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(DirectoryError::InvalidInput(
                "tenant name cannot be empty".to_string(),
            ));
        }
        if name.chars().count() > 255 {
            return Err(DirectoryError::InvalidInput(
                "tenant name cannot exceed 255 characters".to_string(),
            ));
        }

        let key = PartitionKey::parse(request.schema_name.trim())
            .map_err(|err| DirectoryError::InvalidInput(err.to_string()))?;

        let mut hostnames: Vec<String> = Vec::with_capacity(request.domains.len());
        for raw in &request.domains {
            let hostname = normalize_hostname(raw);
            if !is_valid_hostname(&hostname) {
                return Err(DirectoryError::InvalidInput(format!(
                    "invalid domain '{raw}'"
                )));
            }
            if !hostnames.contains(&hostname) {
                hostnames.push(hostname);
            }
        }

        let txn = self.db.begin().await?;
        let now = Utc::now();

        let tenant = tenant::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            schema_name: Set(key.as_str().to_string()),
            is_active: Set(true),
            created_at: Set(now.into()),
        }
        .insert(&txn)
        .await
        .map_err(|err| conflict_or_db(err, format!("tenant with schema '{key}'")))?;

        let mut domains = Vec::with_capacity(hostnames.len());
        for (index, hostname) in hostnames.into_iter().enumerate() {
            let domain = domain::ActiveModel {
                id: Set(Uuid::new_v4()),
                tenant_id: Set(tenant.id),
                domain: Set(hostname.clone()),
                is_primary: Set(index == 0),
                created_at: Set(now.into()),
            }
            .insert(&txn)
            .await
            .map_err(|err| conflict_or_db(err, format!("domain '{hostname}'")))?;
            domains.push(domain);
        }

        let seeded = seed_system_groups(&txn, &key).await?;
        txn.commit().await?;

        tracing::info!(
            tenant_id = %tenant.id,
            schema = %key,
            domains = domains.len(),
            "Provisioned tenant"
        );

        Ok(ProvisionedTenant {
            tenant,
            domains,
            seeded,
        })
    }
}

fn conflict_or_db(err: DbErr, what: String) -> DirectoryError {
    if is_unique_violation(&err) {
        DirectoryError::Conflict(what)
    } else {
        DirectoryError::Database(err)
    }
}

/// Lower-cases a hostname and drops a trailing root dot.
pub fn normalize_hostname(raw: &str) -> String {
    raw.trim().trim_end_matches('.').to_ascii_lowercase()
}

fn is_valid_hostname(hostname: &str) -> bool {
    !hostname.is_empty()
        && hostname.len() <= 253
        && hostname.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

/// Extracts the lower-cased domain part of an e-mail address.
///
/// Requires exactly one `@` with non-empty text on both sides.
pub fn email_domain_of(email: &str) -> Result<String, DirectoryError> {
    let email = email.trim();
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) if !local.is_empty() && !domain.is_empty() => {
            Ok(normalize_hostname(domain))
        }
        _ => Err(DirectoryError::InvalidInput(format!(
            "'{email}' is not a valid e-mail address"
        ))),
    }
}
