//! Tenant data partitions.
//!
//! Every tenant-owned table carries a `schema_name` discriminator. A
//! [`PartitionScope`] pairs a database handle with a validated
//! [`PartitionKey`] and is the only way repositories reach partitioned rows,
//! so every query is constrained to exactly one partition. Scopes are plain
//! values carried in request extensions; there is no process-wide "current
//! partition".

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected partition key.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid schema name '{0}': expected [a-z_][a-z0-9_]{{0,62}}")]
pub struct InvalidPartitionKey(pub String);

fn key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]{0,62}$").expect("static pattern compiles"))
}

/// Validated schema name identifying one tenant partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartitionKey(String);

impl PartitionKey {
    pub fn parse(raw: &str) -> Result<Self, InvalidPartitionKey> {
        if key_pattern().is_match(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(InvalidPartitionKey(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PartitionKey {
    type Error = InvalidPartitionKey;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PartitionKey> for String {
    fn from(key: PartitionKey) -> Self {
        key.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Active partition for one unit of work (usually one request).
#[derive(Debug, Clone)]
pub struct PartitionScope {
    db: DatabaseConnection,
    key: PartitionKey,
}

impl PartitionScope {
    pub fn new(db: DatabaseConnection, key: PartitionKey) -> Self {
        Self { db, key }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn key(&self) -> &PartitionKey {
        &self.key
    }

    /// Schema name used as the discriminator value in queries.
    pub fn schema(&self) -> &str {
        self.key.as_str()
    }
}
