//! Role-driven system group membership: convergence, idempotence and audit.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;
use lms::{
    membership_sync::{MembershipSynchronizer, SyncError, SyncOutcome},
    models::{ActivityType, RoleCode, user},
    partition::PartitionScope,
    repositories::{MembershipRepository, UserRepository},
};
use sea_orm::{IntoActiveModel, Set};

#[path = "test_utils/mod.rs"]
mod test_utils;
use test_utils::{RecordingSink, insert_user, provision_tenant, scope_for, setup_test_db};

/// Names of the groups `user` belongs to, split into (system, other).
async fn group_names(
    scope: &PartitionScope,
    user: &user::Model,
) -> Result<(BTreeSet<String>, BTreeSet<String>)> {
    let repo = MembershipRepository::new(scope.db(), scope.schema());
    let groups = repo.list_groups().await?;
    let mut system = BTreeSet::new();
    let mut other = BTreeSet::new();
    for membership in repo.memberships_of(user.id).await? {
        let group = groups
            .iter()
            .find(|summary| summary.group.id == membership.group_id)
            .expect("membership points at a partition group");
        if group.group.is_system {
            system.insert(group.group.name.clone());
        } else {
            other.insert(group.group.name.clone());
        }
    }
    Ok((system, other))
}

async fn set_role(scope: &PartitionScope, user: user::Model, role: RoleCode) -> Result<user::Model> {
    let mut active = user.into_active_model();
    active.role = Set(role);
    Ok(UserRepository::new(scope).save(active).await?)
}

fn report(outcome: SyncOutcome) -> lms::membership_sync::SyncReport {
    match outcome {
        SyncOutcome::Synced(report) => report,
        other => panic!("expected a completed sync, got {other:?}"),
    }
}

#[tokio::test]
async fn sync_adds_exactly_the_matching_system_group() -> Result<()> {
    let db = setup_test_db().await?;
    let acme = provision_tenant(&db, "acme", &["acme.example.com"]).await?.tenant;
    let scope = scope_for(&db, &acme);
    let user = insert_user(&scope, &acme, "carer@acme.example.com", RoleCode::Carer).await?;

    let sink = Arc::new(RecordingSink::default());
    let synchronizer = MembershipSynchronizer::new(sink.clone());

    let report = report(synchronizer.sync_user(Some(&scope), &user).await);
    assert_eq!(report.added, vec!["Carers".to_string()]);
    assert!(report.removed.is_empty());

    let (system, _) = group_names(&scope, &user).await?;
    assert_eq!(system, BTreeSet::from(["Carers".to_string()]));

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].activity_type, ActivityType::GroupAdded);
    assert_eq!(events[0].details, "Added to group Carers via role sync");
    assert_eq!(events[0].user_id, Some(user.id));
    Ok(())
}

#[tokio::test]
async fn second_pass_with_unchanged_role_is_a_noop() -> Result<()> {
    let db = setup_test_db().await?;
    let acme = provision_tenant(&db, "acme", &["acme.example.com"]).await?.tenant;
    let scope = scope_for(&db, &acme);
    let user = insert_user(&scope, &acme, "tutor@acme.example.com", RoleCode::Tutor).await?;

    let sink = Arc::new(RecordingSink::default());
    let synchronizer = MembershipSynchronizer::new(sink.clone());
    report(synchronizer.sync_user(Some(&scope), &user).await);

    let repo = MembershipRepository::new(scope.db(), scope.schema());
    let before = repo.memberships_of(user.id).await?;
    sink.clear();

    let second = report(synchronizer.sync_user(Some(&scope), &user).await);
    assert!(second.is_noop());
    assert!(sink.events().is_empty());

    let after = repo.memberships_of(user.id).await?;
    assert_eq!(before, after);
    Ok(())
}

#[tokio::test]
async fn role_change_moves_user_between_groups_with_two_audit_events() -> Result<()> {
    let db = setup_test_db().await?;
    let acme = provision_tenant(&db, "acme", &["acme.example.com"]).await?.tenant;
    let scope = scope_for(&db, &acme);
    let user = insert_user(&scope, &acme, "jo@acme.example.com", RoleCode::Carer).await?;

    let sink = Arc::new(RecordingSink::default());
    let synchronizer = MembershipSynchronizer::new(sink.clone());
    report(synchronizer.sync_user(Some(&scope), &user).await);
    sink.clear();

    let user = set_role(&scope, user, RoleCode::Tutor).await?;
    let change = report(synchronizer.sync_user(Some(&scope), &user).await);
    assert_eq!(change.removed, vec!["Carers".to_string()]);
    assert_eq!(change.added, vec!["Tutors".to_string()]);

    let (system, _) = group_names(&scope, &user).await?;
    assert_eq!(system, BTreeSet::from(["Tutors".to_string()]));

    let events = sink.events();
    let kinds: Vec<_> = events.iter().map(|e| e.activity_type).collect();
    assert_eq!(kinds, vec![ActivityType::GroupRemoved, ActivityType::GroupAdded]);
    assert_eq!(events[0].details, "Removed from group Carers via role sync");
    assert_eq!(events[1].details, "Added to group Tutors via role sync");
    assert!(events.iter().all(|e| e.schema.as_str() == "acme"));
    Ok(())
}

#[tokio::test]
async fn stale_system_memberships_are_removed_and_manual_ones_kept() -> Result<()> {
    let db = setup_test_db().await?;
    let acme = provision_tenant(&db, "acme", &["acme.example.com"]).await?.tenant;
    let scope = scope_for(&db, &acme);
    let user = insert_user(&scope, &acme, "ana@acme.example.com", RoleCode::Assessor).await?;

    let repo = MembershipRepository::new(scope.db(), scope.schema());
    let groups = repo.list_groups().await?;
    let group_id = |name: &str| {
        groups
            .iter()
            .find(|summary| summary.group.name == name)
            .map(|summary| summary.group.id)
            .expect("seeded group")
    };

    // Leftovers from earlier roles, plus a hand-managed group.
    repo.add_membership(user.id, group_id("Carers"), None, false).await?;
    repo.add_membership(user.id, group_id("Auditors"), None, false).await?;
    let manual = lms::models::group::ActiveModel {
        id: Set(uuid::Uuid::new_v4()),
        schema_name: Set("acme".to_string()),
        name: Set("Night shift".to_string()),
        description: Set(String::new()),
        role_id: Set(groups[0].group.role_id),
        is_active: Set(true),
        is_system: Set(false),
        created_at: Set(chrono::Utc::now().into()),
    };
    let manual = sea_orm::ActiveModelTrait::insert(manual, &db).await?;
    repo.add_membership(user.id, manual.id, None, false).await?;

    let synchronizer = MembershipSynchronizer::new(Arc::new(RecordingSink::default()));
    let report = report(synchronizer.sync_user(Some(&scope), &user).await);
    assert_eq!(
        report.removed.iter().cloned().collect::<BTreeSet<_>>(),
        BTreeSet::from(["Auditors".to_string(), "Carers".to_string()])
    );
    assert_eq!(report.added, vec!["Assessors".to_string()]);

    let (system, other) = group_names(&scope, &user).await?;
    assert_eq!(system, BTreeSet::from(["Assessors".to_string()]));
    assert_eq!(other, BTreeSet::from(["Night shift".to_string()]));
    Ok(())
}

#[tokio::test]
async fn concurrent_passes_for_one_user_converge() -> Result<()> {
    let db = setup_test_db().await?;
    let acme = provision_tenant(&db, "acme", &["acme.example.com"]).await?.tenant;
    let scope = scope_for(&db, &acme);
    let user = insert_user(&scope, &acme, "iqa@acme.example.com", RoleCode::Iqa).await?;

    let sink = Arc::new(RecordingSink::default());
    let synchronizer = MembershipSynchronizer::new(sink.clone());

    let (first, second) = tokio::join!(
        synchronizer.sync_user(Some(&scope), &user),
        synchronizer.sync_user(Some(&scope), &user),
    );
    let added: usize = [report(first), report(second)]
        .iter()
        .map(|r| r.added.len())
        .sum();
    assert_eq!(added, 1);
    assert_eq!(sink.events().len(), 1);

    let (system, _) = group_names(&scope, &user).await?;
    assert_eq!(system, BTreeSet::from(["IQAs".to_string()]));
    Ok(())
}

#[tokio::test]
async fn sync_without_partition_is_skipped() -> Result<()> {
    let db = setup_test_db().await?;
    let acme = provision_tenant(&db, "acme", &["acme.example.com"]).await?.tenant;
    let scope = scope_for(&db, &acme);
    let user = insert_user(&scope, &acme, "fam@acme.example.com", RoleCode::Family).await?;

    let sink = Arc::new(RecordingSink::default());
    let synchronizer = MembershipSynchronizer::new(sink.clone());

    assert!(matches!(
        synchronizer.sync_user(None, &user).await,
        SyncOutcome::Skipped
    ));
    assert!(sink.events().is_empty());
    let (system, _) = group_names(&scope, &user).await?;
    assert!(system.is_empty());
    Ok(())
}

#[tokio::test]
async fn sync_refuses_a_foreign_partition() -> Result<()> {
    let db = setup_test_db().await?;
    let acme = provision_tenant(&db, "acme", &["acme.example.com"]).await?.tenant;
    let globex = provision_tenant(&db, "globex", &["globex.example.com"]).await?.tenant;
    let acme_scope = scope_for(&db, &acme);
    let globex_scope = scope_for(&db, &globex);
    let user = insert_user(&acme_scope, &acme, "hr@acme.example.com", RoleCode::Hr).await?;

    let synchronizer = MembershipSynchronizer::new(Arc::new(RecordingSink::default()));
    let outcome = synchronizer.sync_user(Some(&globex_scope), &user).await;
    assert!(matches!(
        outcome,
        SyncOutcome::Failed(SyncError::PartitionMismatch { .. })
    ));

    let globex_repo = MembershipRepository::new(globex_scope.db(), globex_scope.schema());
    assert!(globex_repo.memberships_of(user.id).await?.is_empty());
    Ok(())
}
