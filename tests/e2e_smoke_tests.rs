//! Smoke test against a real listener on a loopback port.
//!
//! Requests arrive with a `127.0.0.1:<port>` host, so tenant-scoped paths
//! resolve to the configured development tenant.

use anyhow::Result;
use lms::{models::RoleCode, server::create_app};
use reqwest::{Client, StatusCode, header};
use serde_json::{Value, json};

#[path = "test_utils/mod.rs"]
mod test_utils;
use test_utils::{
    OPERATOR_TOKEN, PASSWORD, access_token, build_state, create_user,
    provision_standard_tenants, setup_test_db, test_config,
};

#[tokio::test]
async fn server_answers_core_endpoints_over_tcp() -> Result<()> {
    let db = setup_test_db().await?;
    let (_, acme, _) = provision_standard_tenants(&db).await?;
    let state = build_state(db, test_config());
    let admin = create_user(&state, &acme, "root@acme.example.com", RoleCode::Admin).await?;
    let token = access_token(&state, &admin, &acme);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let base = format!("http://{}", listener.local_addr()?);
    let server = tokio::spawn(axum::serve(listener, create_app(state)).into_future());

    let client = Client::new();

    let info: Value = client.get(format!("{base}/")).send().await?.json().await?;
    assert_eq!(info["service"], "lms");

    let openapi = client.get(format!("{base}/openapi.json")).send().await?;
    assert_eq!(openapi.status(), StatusCode::OK);

    // Loopback host resolves the dev tenant, but a credential is still needed.
    let anonymous = client.get(format!("{base}/api/users/")).send().await?;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        anonymous
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok()),
        Some("http://app.example.com:5173")
    );

    let users: Value = client
        .get(format!("{base}/api/users/"))
        .bearer_auth(&token)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(users["data"][0]["email"], "root@acme.example.com");

    let login = client
        .post(format!("{base}/api/token/"))
        .json(&json!({"email": "root@acme.example.com", "password": PASSWORD}))
        .send()
        .await?;
    assert_eq!(login.status(), StatusCode::OK);
    assert!(
        login
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .any(|v| v.to_str().is_ok_and(|c| c.starts_with("access_token=")))
    );

    let tenants = client
        .get(format!("{base}/api/tenants/"))
        .bearer_auth(OPERATOR_TOKEN)
        .send()
        .await?;
    assert_eq!(tenants.status(), StatusCode::OK);

    let missing = client.get(format!("{base}/api/courses/")).send().await?;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    server.abort();
    Ok(())
}
