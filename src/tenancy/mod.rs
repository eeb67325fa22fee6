//! # Multi-tenancy
//!
//! Tenant directory lookups, per-request tenant resolution and the
//! middleware that wires resolution into the router.

pub mod directory;
pub mod middleware;
pub mod resolver;

pub use directory::{DirectoryError, NewTenant, ProvisionedTenant, TenantDirectory, email_domain_of};
pub use middleware::tenant_resolution_middleware;
pub use resolver::{
    RequestFacts, Resolution, ResolutionError, ResolverSettings, Strategy, TenantContext,
    TenantResolver,
};
