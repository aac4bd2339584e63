//! Tests for the session token lifecycle over the HTTP surface.
//!
//! Tests cover:
//! - Login/registration issuing an access token + scoped refresh cookie
//! - Refresh rotation and single-use consumption
//! - Family continuity across a chain of rotations
//! - Purpose isolation between access and refresh tokens
//! - Logout, logout-all, and owner scoping of revocation

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use magpie::{
    ServerConfig, create_app,
    db::{Database, UserRole},
    jwt::JwtConfig,
    rate_limit::RateLimitConfig,
    session::MemoryRefreshStore,
};
use std::sync::Arc;
use tower::ServiceExt;

const ACCESS_SECRET: &[u8] = b"access-secret-for-testing-only!!";
const REFRESH_SECRET: &[u8] = b"refresh-secret-for-testing-only!";
const TEST_IP: &str = "127.0.0.1";

/// Create a test app and return (app, db).
async fn create_test_app() -> (axum::Router, Database) {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let config = ServerConfig {
        db: db.clone(),
        access_secret: ACCESS_SECRET.to_vec(),
        refresh_secret: REFRESH_SECRET.to_vec(),
        secure_cookies: false,
        no_signup: false,
        refresh_store: Arc::new(MemoryRefreshStore::new()),
        rate_limits: RateLimitConfig::relaxed(),
    };
    (create_app(&config), db)
}

/// The codec as the server sees it, for inspecting issued tokens in tests.
fn test_jwt() -> JwtConfig {
    JwtConfig::new(ACCESS_SECRET, REFRESH_SECRET)
}

async fn post_json(
    app: &axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> axum::http::Response<Body> {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .header("x-forwarded-for", TEST_IP)
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn post_with_cookie(
    app: &axum::Router,
    uri: &str,
    cookie: Option<&str>,
) -> axum::http::Response<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("x-forwarded-for", TEST_IP);
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", format!("refresh_token={}", cookie));
    }
    app.clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn get_with_bearer(
    app: &axum::Router,
    uri: &str,
    token: Option<&str>,
) -> axum::http::Response<Body> {
    let mut builder = Request::builder()
        .method("GET")
        .uri(uri)
        .header("x-forwarded-for", TEST_IP);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    app.clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_json(response: axum::http::Response<Body>) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Extract Set-Cookie headers from a response.
fn set_cookies(response: &axum::http::Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// Extract the refresh token value from a response's Set-Cookie headers.
fn refresh_cookie_value(response: &axum::http::Response<Body>) -> Option<String> {
    set_cookies(response)
        .into_iter()
        .find(|c| c.starts_with("refresh_token=") && !c.contains("Max-Age=0"))
        .map(|c| {
            c.split(';')
                .next()
                .unwrap()
                .trim_start_matches("refresh_token=")
                .to_string()
        })
}

/// Check if the response clears the refresh cookie (Max-Age=0).
fn clears_refresh_cookie(response: &axum::http::Response<Body>) -> bool {
    set_cookies(response)
        .iter()
        .any(|c| c.starts_with("refresh_token=") && c.contains("Max-Age=0"))
}

/// Register a user through the API and return (access_token, refresh_token).
async fn register(app: &axum::Router, email: &str) -> (String, String) {
    let response = post_json(
        app,
        "/api/users",
        serde_json::json!({ "email": email, "password": "a long enough password" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let refresh = refresh_cookie_value(&response).expect("registration should set refresh cookie");
    let body = body_json(response).await;
    let access = body["access_token"].as_str().unwrap().to_string();
    (access, refresh)
}

/// Log in through the API and return (access_token, refresh_token).
async fn login(app: &axum::Router, email: &str) -> (String, String) {
    let response = post_json(
        app,
        "/api/users/login",
        serde_json::json!({ "email": email, "password": "a long enough password" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let refresh = refresh_cookie_value(&response).expect("login should set refresh cookie");
    let body = body_json(response).await;
    let access = body["access_token"].as_str().unwrap().to_string();
    (access, refresh)
}

// =============================================================================
// Issuance
// =============================================================================

#[tokio::test]
async fn test_registration_issues_scoped_refresh_cookie() {
    let (app, _db) = create_test_app().await;

    let response = post_json(
        &app,
        "/api/users",
        serde_json::json!({ "email": "alice@example.com", "password": "a long enough password" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let cookie = set_cookies(&response)
        .into_iter()
        .find(|c| c.starts_with("refresh_token="))
        .expect("refresh cookie should be set");
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(cookie.contains("Path=/api/sessions"));
    assert!(cookie.contains("Max-Age=604800"));
    assert!(!cookie.contains("Secure"), "no Secure flag on plain http");

    let body = body_json(response).await;
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 900);
    assert!(body["access_token"].as_str().is_some());
}

#[tokio::test]
async fn test_access_token_authenticates_verify() {
    let (app, _db) = create_test_app().await;
    let (access, _refresh) = register(&app, "alice@example.com").await;

    let response = get_with_bearer(&app, "/api/sessions/verify", Some(&access)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["role"], "user");
    assert!(body["id"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn test_verify_without_token_unauthorized() {
    let (app, _db) = create_test_app().await;

    let response = get_with_bearer(&app, "/api/sessions/verify", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_access_token_rejected() {
    use jsonwebtoken::{EncodingKey, Header};
    use magpie::jwt::{AccessClaims, TokenPurpose};
    use std::time::{SystemTime, UNIX_EPOCH};

    let (app, _db) = create_test_app().await;
    register(&app, "alice@example.com").await;

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();
    let claims = AccessClaims {
        sub: "1".to_string(),
        role: UserRole::User,
        purpose: TokenPurpose::Access,
        iat: now - 100,
        exp: now - 50,
    };
    let stale = jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(ACCESS_SECRET),
    )
    .unwrap();

    let response = get_with_bearer(&app, "/api/sessions/verify", Some(&stale)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = body_json(response).await;
    assert_eq!(body["error"], "Token expired");
}

// =============================================================================
// Rotation
// =============================================================================

#[tokio::test]
async fn test_full_session_lifecycle() {
    let (app, _db) = create_test_app().await;
    register(&app, "alice@example.com").await;

    // Fresh login: access token A1 + refresh token R1.
    let (a1, r1) = login(&app, "alice@example.com").await;

    let response = get_with_bearer(&app, "/api/sessions/verify", Some(&a1)).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Rotate R1: new pair comes back, R2 != R1.
    let response = post_with_cookie(&app, "/api/sessions/refresh", Some(&r1)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let r2 = refresh_cookie_value(&response).expect("rotation should set a new refresh cookie");
    assert_ne!(r2, r1);

    let body = body_json(response).await;
    let a2 = body["access_token"].as_str().unwrap();
    let response = get_with_bearer(&app, "/api/sessions/verify", Some(a2)).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Replaying R1 fails: it was consumed by the rotation above.
    let response = post_with_cookie(&app, "/api/sessions/refresh", Some(&r1)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(clears_refresh_cookie(&response));

    // The successor R2 still works.
    let response = post_with_cookie(&app, "/api/sessions/refresh", Some(&r2)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_family_continuity_across_rotations() {
    let (app, _db) = create_test_app().await;
    let (_access, mut refresh) = register(&app, "alice@example.com").await;

    let jwt = test_jwt();
    let family = jwt.verify_refresh(&refresh).unwrap().fam;

    for _ in 0..3 {
        let response = post_with_cookie(&app, "/api/sessions/refresh", Some(&refresh)).await;
        assert_eq!(response.status(), StatusCode::OK);
        refresh = refresh_cookie_value(&response).unwrap();

        assert_eq!(jwt.verify_refresh(&refresh).unwrap().fam, family);
    }
}

#[tokio::test]
async fn test_refresh_without_cookie_unauthorized() {
    let (app, _db) = create_test_app().await;

    let response = post_with_cookie(&app, "/api/sessions/refresh", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_with_garbage_cookie_clears_it() {
    let (app, _db) = create_test_app().await;

    let response = post_with_cookie(&app, "/api/sessions/refresh", Some("not-a-token")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(clears_refresh_cookie(&response));
}

#[tokio::test]
async fn test_rotation_picks_up_role_change() {
    let (app, db) = create_test_app().await;
    let (_access, refresh) = register(&app, "alice@example.com").await;

    db.users()
        .set_role_by_email("alice@example.com", UserRole::Admin)
        .await
        .unwrap();

    let response = post_with_cookie(&app, "/api/sessions/refresh", Some(&refresh)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let access = body["access_token"].as_str().unwrap();

    let response = get_with_bearer(&app, "/api/sessions/verify", Some(access)).await;
    let body = body_json(response).await;
    assert_eq!(body["role"], "admin");
}

// =============================================================================
// Purpose isolation
// =============================================================================

#[tokio::test]
async fn test_refresh_token_rejected_as_bearer() {
    let (app, _db) = create_test_app().await;
    let (_access, refresh) = register(&app, "alice@example.com").await;

    let response = get_with_bearer(&app, "/api/sessions/verify", Some(&refresh)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_access_token_rejected_as_refresh_cookie() {
    let (app, _db) = create_test_app().await;
    let (access, _refresh) = register(&app, "alice@example.com").await;

    let response = post_with_cookie(&app, "/api/sessions/refresh", Some(&access)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// =============================================================================
// Revocation
// =============================================================================

#[tokio::test]
async fn test_logout_revokes_refresh_token() {
    let (app, _db) = create_test_app().await;
    let (_access, refresh) = register(&app, "alice@example.com").await;

    let response = post_with_cookie(&app, "/api/sessions/logout", Some(&refresh)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(clears_refresh_cookie(&response));

    let response = post_with_cookie(&app, "/api/sessions/refresh", Some(&refresh)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_without_cookie_still_succeeds() {
    let (app, _db) = create_test_app().await;

    let response = post_with_cookie(&app, "/api/sessions/logout", None).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_logout_twice_is_harmless() {
    let (app, _db) = create_test_app().await;
    let (_access, refresh) = register(&app, "alice@example.com").await;

    let first = post_with_cookie(&app, "/api/sessions/logout", Some(&refresh)).await;
    assert_eq!(first.status(), StatusCode::OK);

    // The token is already revoked; logout still reports success.
    let second = post_with_cookie(&app, "/api/sessions/logout", Some(&refresh)).await;
    assert_eq!(second.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_logout_all_is_owner_scoped() {
    let (app, _db) = create_test_app().await;

    // Alice on two devices, Bob on one.
    let (_a, alice_r1) = register(&app, "alice@example.com").await;
    let (alice_access, alice_r2) = login(&app, "alice@example.com").await;
    let (_b, bob_r) = register(&app, "bob@example.com").await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/sessions/logout-all")
                .header("authorization", format!("Bearer {}", alice_access))
                .header("x-forwarded-for", TEST_IP)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["revoked"], 2);

    // Both of Alice's refresh tokens are dead.
    let response = post_with_cookie(&app, "/api/sessions/refresh", Some(&alice_r1)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let response = post_with_cookie(&app, "/api/sessions/refresh", Some(&alice_r2)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Bob's session is untouched.
    let response = post_with_cookie(&app, "/api/sessions/refresh", Some(&bob_r)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_logout_all_requires_authentication() {
    let (app, _db) = create_test_app().await;

    let response = post_with_cookie(&app, "/api/sessions/logout-all", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
