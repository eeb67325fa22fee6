//! # Repository Layer
//!
//! Repositories encapsulate SeaORM access. Partitioned repositories are
//! built from a [`PartitionScope`](crate::partition::PartitionScope) (or a
//! schema name plus a transaction) and constrain every query to it.

pub mod activity;
pub mod membership;
pub mod user;

pub use activity::{ActivityEvent, ActivityRepository, ActivitySink, DbActivitySink};
pub use membership::{GroupSummary, MembershipRepository};
pub use user::{FailedLogin, NewUserRecord, UserRepository};
