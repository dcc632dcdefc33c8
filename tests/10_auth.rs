mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::spawn_app;
use ecohub_gateway::permissions::Role;

#[tokio::test]
async fn login_returns_tokens_and_user_info() {
    let app = spawn_app();

    let response = app
        .post(
            "/auth/login",
            None,
            json!({ "username": "admin", "password": "admin" }),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "success");
    let data = &response.body["data"];
    assert!(data["access_token"].as_str().is_some());
    assert!(data["refresh_token"].as_str().is_some());
    assert_eq!(data["token_type"], "Bearer");
    assert_eq!(data["user"]["role"], "admin");
}

#[tokio::test]
async fn login_with_wrong_password_is_unauthorized() {
    let app = spawn_app();

    let response = app
        .post(
            "/auth/login",
            None,
            json!({ "username": "admin", "password": "nope" }),
        )
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["status"], "error");
    assert_eq!(response.error_code(), Some("unauthorized"));
}

#[tokio::test]
async fn login_with_missing_fields_is_rejected() {
    let app = spawn_app();

    let response = app
        .post("/auth/login", None, json!({ "username": "admin" }))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.error_code(), Some("invalid_request"));

    let response = app
        .post(
            "/auth/login",
            None,
            json!({ "username": "", "password": "x" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn whoami_requires_a_token() {
    let app = spawn_app();

    let response = app.get("/api/auth/whoami", None).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.error_code(), Some("unauthorized"));
}

#[tokio::test]
async fn whoami_reports_the_authenticated_caller() {
    let app = spawn_app();
    let (access, _) = app.login("alice", "user-pass").await;

    let response = app.get("/api/auth/whoami", Some(&access)).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["data"]["id"], "u-alice");
    assert_eq!(response.body["data"]["role"]["code"], "user");
}

#[tokio::test]
async fn garbage_token_is_unauthorized() {
    let app = spawn_app();

    let response = app.get("/api/auth/whoami", Some("not.a.jwt")).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_token_is_reported_as_expired() {
    let app = spawn_app();
    let token = app
        .state
        .tokens
        .issue_with_ttl("u-alice", Role::User, chrono::Duration::seconds(-60))
        .unwrap();

    let response = app.get("/api/auth/whoami", Some(&token)).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["message"], "Token has expired");
}

#[tokio::test]
async fn refresh_rotates_the_refresh_token() {
    let app = spawn_app();
    let (_, refresh) = app.login("alice", "user-pass").await;

    let response = app
        .post("/auth/refresh", None, json!({ "refresh_token": refresh }))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let new_access = response.body["data"]["access_token"].as_str().unwrap();
    let new_refresh = response.body["data"]["refresh_token"].as_str().unwrap();
    assert_ne!(new_refresh, refresh);

    // The new access token works.
    let whoami = app.get("/api/auth/whoami", Some(new_access)).await;
    assert_eq!(whoami.status, StatusCode::OK);

    // The consumed refresh token does not.
    let replay = app
        .post("/auth/refresh", None, json!({ "refresh_token": refresh }))
        .await;
    assert_eq!(replay.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_refresh_token_is_unauthorized() {
    let app = spawn_app();

    let response = app
        .post(
            "/auth/refresh",
            None,
            json!({ "refresh_token": "never-issued" }),
        )
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_revokes_the_refresh_token() {
    let app = spawn_app();
    let (access, refresh) = app.login("alice", "user-pass").await;

    let response = app
        .post(
            "/auth/logout",
            Some(&access),
            json!({ "refresh_token": refresh }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let replay = app
        .post("/auth/refresh", None, json!({ "refresh_token": refresh }))
        .await;
    assert_eq!(replay.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_requires_authentication() {
    let app = spawn_app();

    let response = app
        .request(Method::POST, "/auth/logout", None, None)
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn permissions_endpoint_reflects_the_role() {
    let app = spawn_app();
    let token = app.token_for("u-visitor", Role::Guest);

    let response = app.get("/api/auth/permissions", Some(&token)).await;

    assert_eq!(response.status, StatusCode::OK);
    let permissions = &response.body["data"]["permissions"];
    assert_eq!(permissions["data"]["read"], true);
    assert_eq!(permissions["data"]["create"], false);
    assert_eq!(permissions["user"]["read"], false);
}
