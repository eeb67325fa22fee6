//! Database migrations for the LMS backend.
//!
//! Shared tables (`tenants`, `domains`) hold the tenant directory. Every other
//! table is partitioned by its `schema_name` column.

pub use sea_orm_migration::prelude::*;

mod m2024_01_01_000001_create_tenants;
mod m2024_01_01_000002_create_domains;
mod m2024_01_02_000001_create_users;
mod m2024_01_02_000002_create_roles;
mod m2024_01_02_000003_create_groups;
mod m2024_01_02_000004_create_group_memberships;
mod m2024_01_02_000005_create_user_activities;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2024_01_01_000001_create_tenants::Migration),
            Box::new(m2024_01_01_000002_create_domains::Migration),
            Box::new(m2024_01_02_000001_create_users::Migration),
            Box::new(m2024_01_02_000002_create_roles::Migration),
            Box::new(m2024_01_02_000003_create_groups::Migration),
            Box::new(m2024_01_02_000004_create_group_memberships::Migration),
            Box::new(m2024_01_02_000005_create_user_activities::Migration),
        ]
    }
}
