//! Database seeding functionality
//!
//! Seeds the per-tenant records every partition starts with: one system
//! role and one system group for each [`RoleCode`](crate::models::RoleCode).

pub mod system_groups;

pub use system_groups::{SeedReport, seed_system_groups};
