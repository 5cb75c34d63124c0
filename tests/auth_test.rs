//! Authentication flow through the HTTP routes

mod common;

use common::{TestApp, ADMIN_EMAIL, PASSWORD};
use hyper::{Method, StatusCode};
use serde_json::json;

#[tokio::test]
async fn test_health_and_version_are_public() {
    let app = TestApp::new().await;

    let res = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.data()["store"]["backend"], "memory");

    let res = app.call(Method::GET, "/version", None, None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.data()["name"], "muster");
}

#[tokio::test]
async fn test_register_login_me() {
    let app = TestApp::new().await;

    let res = app
        .call(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({
                "name": "Μαρία Παπαδοπούλου",
                "email": "Maria@Example.org",
                "password": PASSWORD,
                "password_confirmation": PASSWORD,
            })),
        )
        .await;
    assert_eq!(res.status, StatusCode::CREATED, "{:?}", res.json());
    let body = res.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["user"]["email"], "maria@example.org");
    assert_eq!(body["data"]["user"]["role"], "VOLUNTEER");
    assert!(body["data"]["user"].get("password_hash").is_none());
    assert!(body["data"]["refresh_token"].is_string());

    let token = app.login("maria@example.org", PASSWORD).await;
    let res = app.get("/api/auth/me", &token).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.data()["name"], "Μαρία Παπαδοπούλου");
}

#[tokio::test]
async fn test_register_validation_lists_fields() {
    let app = TestApp::new().await;

    let res = app
        .call(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({
                "email": "not-an-email",
                "password": "short",
                "password_confirmation": "different",
            })),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    let errors = &res.json()["errors"];
    assert!(errors["name"].is_array());
    assert!(errors["email"].is_array());
    assert!(errors["password"].is_array());
}

#[tokio::test]
async fn test_duplicate_email_rejected() {
    let app = TestApp::new().await;

    let res = app
        .call(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({
                "name": "Δεύτερος διαχειριστής",
                "email": ADMIN_EMAIL.to_uppercase(),
                "password": PASSWORD,
                "password_confirmation": PASSWORD,
            })),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(res.json()["errors"]["email"].is_array());
}

#[tokio::test]
async fn test_bad_credentials_are_generic() {
    let app = TestApp::new().await;

    let wrong_password = app
        .call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": ADMIN_EMAIL, "password": "wrong-password" })),
        )
        .await;
    let unknown_user = app
        .call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "nobody@example.org", "password": "wrong-password" })),
        )
        .await;

    assert_eq!(wrong_password.status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_user.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password.json()["message"], unknown_user.json()["message"]);
}

#[tokio::test]
async fn test_missing_or_garbage_token() {
    let app = TestApp::new().await;

    let res = app.call(Method::GET, "/api/auth/me", None, None).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let res = app.get("/api/auth/me", "not-a-jwt").await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_tokens() {
    let app = TestApp::new().await;
    let (_, token) = app.user("leaving@example.org", "VOLUNTEER", None).await;

    let res = app.post("/api/auth/logout", &token, json!({})).await;
    assert_eq!(res.status, StatusCode::OK);

    let res = app.get("/api/auth/me", &token).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_issues_new_pair() {
    let app = TestApp::new().await;

    let res = app
        .call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": ADMIN_EMAIL, "password": common::ADMIN_PASSWORD })),
        )
        .await;
    let refresh = res.data()["refresh_token"].as_str().unwrap().to_string();
    let access = res.data()["access_token"].as_str().unwrap().to_string();

    // An access token is not accepted as a refresh token
    let res = app
        .call(
            Method::POST,
            "/api/auth/refresh",
            None,
            Some(json!({ "refresh_token": access })),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);

    let res = app
        .call(
            Method::POST,
            "/api/auth/refresh",
            None,
            Some(json!({ "refresh_token": refresh })),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    let new_access = res.data()["access_token"].as_str().unwrap().to_string();
    assert_eq!(app.get("/api/auth/me", &new_access).await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_change_password() {
    let app = TestApp::new().await;
    let (_, token) = app.user("changer@example.org", "VOLUNTEER", None).await;

    let res = app
        .put(
            "/api/auth/password",
            &token,
            json!({
                "current_password": "not-my-password",
                "password": "brand-new-pass",
                "password_confirmation": "brand-new-pass",
            }),
        )
        .await;
    assert_eq!(res.status, StatusCode::UNPROCESSABLE_ENTITY);

    let res = app
        .put(
            "/api/auth/password",
            &token,
            json!({
                "current_password": PASSWORD,
                "password": "brand-new-pass",
                "password_confirmation": "brand-new-pass",
            }),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK, "{:?}", res.json());

    // Old token is revoked, new password works
    assert_eq!(app.get("/api/auth/me", &token).await.status, StatusCode::UNAUTHORIZED);
    app.login("changer@example.org", "brand-new-pass").await;
}

#[tokio::test]
async fn test_deactivated_user_is_locked_out() {
    let app = TestApp::new().await;
    let (id, token) = app.user("inactive@example.org", "VOLUNTEER", None).await;

    let res = app
        .post(&format!("/api/users/{}/toggle-active", id), &app.admin, json!({}))
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.data()["is_active"], false);

    // Deactivation revokes the session
    assert_eq!(app.get("/api/auth/me", &token).await.status, StatusCode::UNAUTHORIZED);

    let res = app
        .call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "inactive@example.org", "password": PASSWORD })),
        )
        .await;
    assert_eq!(res.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_user_admin_requires_system_admin() {
    let app = TestApp::new().await;
    let (_, token) = app.user("plain@example.org", "VOLUNTEER", None).await;

    assert_eq!(app.get("/api/users", &token).await.status, StatusCode::FORBIDDEN);

    let res = app.get("/api/users?role=VOLUNTEER&per_page=1", &app.admin).await;
    assert_eq!(res.status, StatusCode::OK);
    let body = res.json();
    assert_eq!(body["meta"]["per_page"], 1);
    assert_eq!(body["meta"]["total"], 1);
    assert_eq!(body["data"][0]["email"], "plain@example.org");
}

#[tokio::test]
async fn test_unknown_route() {
    let app = TestApp::new().await;
    let res = app.get("/api/nothing-here", &app.admin).await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.json()["success"], false);
}
