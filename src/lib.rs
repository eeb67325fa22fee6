//! # LMS Core Library
//!
//! Multi-tenant LMS backend core: tenant directory and per-request tenant
//! resolution, partition-scoped data access, and role-driven system group
//! membership, exposed through an axum API.

pub mod accounts;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod membership_sync;
pub mod models;
pub mod partition;
pub mod password;
pub mod repositories;
pub mod seeds;
pub mod server;
pub mod telemetry;
pub mod tenancy;
pub mod tokens;
pub use migration;
