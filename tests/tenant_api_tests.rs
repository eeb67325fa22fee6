//! Operator tenant endpoints.

use anyhow::Result;
use axum::{body::Body, http::StatusCode};
use lms::{models::RoleCode, repositories::MembershipRepository};
use serde_json::json;

#[path = "test_utils/mod.rs"]
mod test_utils;
use test_utils::{
    OPERATOR_TOKEN, build_app, get, json_body, post, provision_tenant, send, setup_test_db,
};

const HOST: &str = "lms.example.com";

/// Database holding only the public tenant, which operator calls resolve to.
async fn public_only_db() -> Result<sea_orm::DatabaseConnection> {
    let db = setup_test_db().await?;
    provision_tenant(&db, "public", &[HOST]).await?;
    Ok(db)
}

fn operator() -> String {
    format!("Bearer {OPERATOR_TOKEN}")
}

#[tokio::test]
async fn operator_provisions_and_lists_tenants() -> Result<()> {
    let db = public_only_db().await?;
    let (_, app) = build_app(db.clone());

    let (status, _, body) = send(
        &app,
        post("/api/tenants/", HOST)
            .header("authorization", operator())
            .body(json_body(json!({
                "name": "Acme Care",
                "schema_name": "acme",
                "domains": ["Acme.LMS.example.com", "acme.example.com"],
            })))
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED, "{body}");
    let roles = <RoleCode as sea_orm::Iterable>::iter().count();
    assert_eq!(body["roles_created"], roles);
    assert_eq!(body["groups_created"], roles);
    assert_eq!(body["tenant"]["schema_name"], "acme");
    assert_eq!(body["tenant"]["is_active"], true);
    assert_eq!(
        body["tenant"]["domains"],
        json!([
            {"domain": "acme.lms.example.com", "is_primary": true},
            {"domain": "acme.example.com", "is_primary": false},
        ])
    );

    let groups = MembershipRepository::new(&db, "acme").list_groups().await?;
    assert_eq!(groups.len(), roles);
    assert!(groups.iter().all(|g| g.group.is_system));

    let (status, _, body) = send(
        &app,
        get("/api/tenants/", HOST)
            .header("authorization", operator())
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let schemas: Vec<_> = body["data"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .iter()
        .map(|t| t["schema_name"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(schemas, vec!["acme", "public"]);
    assert_eq!(body["data"][0]["name"], "Acme Care");
    Ok(())
}

#[tokio::test]
async fn tenant_endpoints_require_operator_token() -> Result<()> {
    let db = public_only_db().await?;
    let (_, app) = build_app(db);

    let (status, _, _) = send(&app, get("/api/tenants/", HOST).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = send(
        &app,
        get("/api/tenants/", HOST)
            .header("authorization", "Bearer not-the-token")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = send(
        &app,
        post("/api/tenants/", HOST)
            .body(json_body(json!({"name": "Sneaky", "schema_name": "sneaky"})))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn duplicate_schema_or_domain_conflicts() -> Result<()> {
    let db = public_only_db().await?;
    let (_, app) = build_app(db);

    let create = |schema: &str, domain: &str| {
        post("/api/tenants/", HOST)
            .header("authorization", operator())
            .body(json_body(json!({
                "name": format!("{schema} org"),
                "schema_name": schema,
                "domains": [domain],
            })))
            .unwrap()
    };

    let (status, _, _) = send(&app, create("acme", "acme.example.com")).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _, body) = send(&app, create("acme", "other.example.com")).await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    let (status, _, body) = send(&app, create("globex", "ACME.example.com")).await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    Ok(())
}

#[tokio::test]
async fn invalid_tenant_input_is_rejected() -> Result<()> {
    let db = public_only_db().await?;
    let (_, app) = build_app(db);

    for payload in [
        json!({"name": "Bad", "schema_name": "Not Valid!"}),
        json!({"name": "", "schema_name": "empty_name"}),
        json!({"name": "Bad domain", "schema_name": "bad_domain", "domains": ["no spaces.example.com"]}),
    ] {
        let (status, _, body) = send(
            &app,
            post("/api/tenants/", HOST)
                .header("authorization", operator())
                .body(json_body(payload.clone()))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{payload} -> {body}");
        assert_eq!(body["code"], "VALIDATION_FAILED");
    }
    Ok(())
}
