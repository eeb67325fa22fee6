//! Tenant user management over HTTP, including the sync that follows writes.

use anyhow::Result;
use axum::{body::Body, http::StatusCode};
use lms::{
    models::{ActivityType, RoleCode},
    repositories::{ActivityRepository, MembershipRepository, UserRepository},
};
use serde_json::{Value, json};

#[path = "test_utils/mod.rs"]
mod test_utils;
use test_utils::{
    access_token, build_app, create_user, get, insert_user, json_body, post,
    provision_standard_tenants, scope_for, send, setup_test_db,
};

const ACME_HOST: &str = "acme.lms.example.com";

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

fn patch(uri: &str, token: &str, body: Value) -> axum::http::Request<Body> {
    axum::http::Request::builder()
        .method("PATCH")
        .uri(uri)
        .header("host", ACME_HOST)
        .header("content-type", "application/json")
        .header("authorization", bearer(token))
        .body(json_body(body))
        .unwrap()
}

#[tokio::test]
async fn admin_creates_user_and_sync_adds_role_group() -> Result<()> {
    let db = setup_test_db().await?;
    let (_, acme, _) = provision_standard_tenants(&db).await?;
    let scope = scope_for(&db, &acme);
    let (state, app) = build_app(db.clone());
    let admin = insert_user(&scope, &acme, "admin@acme.example.com", RoleCode::Admin).await?;
    let token = access_token(&state, &admin, &acme);

    let (status, _, body) = send(
        &app,
        post("/api/users/", ACME_HOST)
            .header("authorization", bearer(&token))
            .body(json_body(json!({
                "email": "New.Carer@acme.example.com",
                "password": "long-enough-password",
                "first_name": "Nia",
                "last_name": "Okafor",
                "role": "carer",
            })))
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["user"]["email"], "new.carer@acme.example.com");
    assert_eq!(body["user"]["role"], "carer");
    assert_eq!(body["sync"]["status"], "changed");
    assert_eq!(body["sync"]["added"], json!(["Carers"]));
    assert_eq!(body["sync"]["removed"], json!([]));

    let created = UserRepository::new(&scope)
        .find_by_email("new.carer@acme.example.com")
        .await?
        .expect("user stored in the acme partition");
    let kinds: Vec<_> = ActivityRepository::new(&scope)
        .list_for_user(created.id)
        .await?
        .into_iter()
        .map(|a| a.activity_type)
        .collect();
    assert_eq!(kinds, vec![ActivityType::UserCreated, ActivityType::GroupAdded]);

    // Same e-mail again conflicts.
    let (status, _, _) = send(
        &app,
        post("/api/users/", ACME_HOST)
            .header("authorization", bearer(&token))
            .body(json_body(json!({"email": "new.carer@acme.example.com", "role": "tutor"})))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn non_admin_cannot_create_users() -> Result<()> {
    let db = setup_test_db().await?;
    let (_, acme, _) = provision_standard_tenants(&db).await?;
    let (state, app) = build_app(db.clone());
    let carer = insert_user(&scope_for(&db, &acme), &acme, "c@acme.example.com", RoleCode::Carer)
        .await?;
    let token = access_token(&state, &carer, &acme);

    let (status, _, body) = send(
        &app,
        post("/api/users/", ACME_HOST)
            .header("authorization", bearer(&token))
            .body(json_body(json!({"email": "x@acme.example.com"})))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");

    // Listing is open to any authenticated member.
    let (status, _, body) = send(
        &app,
        get("/api/users/", ACME_HOST)
            .header("authorization", bearer(&token))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
    Ok(())
}

#[tokio::test]
async fn role_patch_triggers_sync_and_other_fields_do_not() -> Result<()> {
    let db = setup_test_db().await?;
    let (_, acme, _) = provision_standard_tenants(&db).await?;
    let scope = scope_for(&db, &acme);
    let (state, app) = build_app(db.clone());
    let admin = insert_user(&scope, &acme, "admin@acme.example.com", RoleCode::Admin).await?;
    let token = access_token(&state, &admin, &acme);
    let user = create_user(&state, &acme, "mo@acme.example.com", RoleCode::Carer).await?;
    let uri = format!("/api/users/{}", user.id);

    let (status, _, body) = send(&app, patch(&uri, &token, json!({"role": "tutor"}))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["user"]["role"], "tutor");
    assert_eq!(body["changes"], json!([{"field": "role", "old": "carer", "new": "tutor"}]));
    assert_eq!(body["sync"]["status"], "changed");
    assert_eq!(body["sync"]["added"], json!(["Tutors"]));
    assert_eq!(body["sync"]["removed"], json!(["Carers"]));

    let (status, _, body) =
        send(&app, patch(&uri, &token, json!({"first_name": "Maurice"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["first_name"], "Maurice");
    assert!(body["sync"].is_null());

    // Submitting the current role still runs a pass, which finds nothing to do.
    let (status, _, body) = send(&app, patch(&uri, &token, json!({"role": "tutor"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sync"]["status"], "unchanged");

    let updates = ActivityRepository::new(&scope)
        .list_for_user(user.id)
        .await?
        .into_iter()
        .filter(|a| a.activity_type == ActivityType::UserUpdated)
        .map(|a| a.details)
        .collect::<Vec<_>>();
    assert_eq!(
        updates,
        vec![
            "Updated fields: role".to_string(),
            "Updated fields: first_name".to_string(),
            "Updated fields: role".to_string(),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn patch_of_unknown_or_foreign_user_is_not_found() -> Result<()> {
    let db = setup_test_db().await?;
    let (_, acme, globex) = provision_standard_tenants(&db).await?;
    let (state, app) = build_app(db.clone());
    let admin = insert_user(&scope_for(&db, &acme), &acme, "a@acme.example.com", RoleCode::Admin)
        .await?;
    let token = access_token(&state, &admin, &acme);
    let outsider = insert_user(
        &scope_for(&db, &globex),
        &globex,
        "o@globex.example.com",
        RoleCode::Carer,
    )
    .await?;

    let (status, _, _) = send(
        &app,
        patch(
            &format!("/api/users/{}", outsider.id),
            &token,
            json!({"role": "admin"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let untouched = UserRepository::new(&scope_for(&db, &globex))
        .get(outsider.id)
        .await?;
    assert_eq!(untouched.role, RoleCode::Carer);
    Ok(())
}

#[tokio::test]
async fn group_listing_and_members_follow_role_sync() -> Result<()> {
    let db = setup_test_db().await?;
    let (_, acme, _) = provision_standard_tenants(&db).await?;
    let scope = scope_for(&db, &acme);
    let (state, app) = build_app(db.clone());
    let admin = create_user(&state, &acme, "admin@acme.example.com", RoleCode::Admin).await?;
    let token = access_token(&state, &admin, &acme);
    let carer = create_user(&state, &acme, "kim@acme.example.com", RoleCode::Carer).await?;

    let (status, _, body) = send(
        &app,
        get("/api/groups/", ACME_HOST)
            .header("authorization", bearer(&token))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let groups = body["data"].as_array().cloned().unwrap_or_default();
    assert_eq!(groups.len(), <RoleCode as sea_orm::Iterable>::iter().count());
    let carers = groups
        .iter()
        .find(|g| g["name"] == "Carers")
        .expect("Carers group listed");
    assert_eq!(carers["member_count"], 1);
    assert_eq!(carers["role_code"], "carer");
    assert_eq!(carers["is_system"], true);

    let carers_id = carers["id"].as_str().unwrap_or_default().to_string();
    let (status, _, body) = send(
        &app,
        get(&format!("/api/groups/{carers_id}/members"), ACME_HOST)
            .header("authorization", bearer(&token))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["user"]["id"], carer.id.to_string());

    let (status, _, body) = send(
        &app,
        get(
            &format!("/api/groups/{}/members", uuid::Uuid::new_v4()),
            ACME_HOST,
        )
        .header("authorization", bearer(&token))
        .body(Body::empty())
        .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Group not found");

    let repo = MembershipRepository::new(scope.db(), scope.schema());
    assert_eq!(repo.memberships_of(carer.id).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn activity_is_visible_to_self_and_admins_only() -> Result<()> {
    let db = setup_test_db().await?;
    let (_, acme, _) = provision_standard_tenants(&db).await?;
    let (state, app) = build_app(db.clone());
    let admin = create_user(&state, &acme, "admin@acme.example.com", RoleCode::Admin).await?;
    let tutor = create_user(&state, &acme, "t@acme.example.com", RoleCode::Tutor).await?;
    let family = create_user(&state, &acme, "f@acme.example.com", RoleCode::Family).await?;
    let uri = format!("/api/users/{}/activity", tutor.id);

    let fetch = |token: String| {
        get(&uri, ACME_HOST)
            .header("authorization", bearer(&token))
            .body(Body::empty())
            .unwrap()
    };

    let (status, _, body) = send(&app, fetch(access_token(&state, &tutor, &acme))).await;
    assert_eq!(status, StatusCode::OK);
    let kinds: Vec<_> = body["data"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .iter()
        .map(|entry| entry["activity_type"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(kinds, vec!["user_created", "group_added"]);

    let (status, _, _) = send(&app, fetch(access_token(&state, &admin, &acme))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = send(&app, fetch(access_token(&state, &family, &acme))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}
