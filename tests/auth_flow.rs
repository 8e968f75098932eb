// End-to-end auth flow over the real router: register, approval gate,
// login, bearer-protected production routes, public demo routes, logout.

#[path = "common/mod.rs"]
mod common;

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use bson::doc;
use serde_json::{Value, json};
use tower::ServiceExt; // for oneshot

use nirman::app;

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn bearer_request(method: &str, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> axum::response::Response {
    app.clone().oneshot(request).await.unwrap()
}

#[tokio::test]
async fn register_approve_login_and_protected_access() {
    let Some(ctx) = common::setup_state().await else {
        return;
    };
    let app = app(Arc::new(ctx.state.clone()));

    let register = json!({
        "email": "eng@example.com",
        "username": "eng",
        "first_name": "Site",
        "last_name": "Engineer",
        "password": "correct horse",
    });
    let response = send(&app, json_request("POST", "/api/auth/register", register)).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let registered = body_json(response).await;
    assert_eq!(registered["user"]["is_approved"], json!(false));
    let early_access = registered["access"].as_str().unwrap().to_string();

    // Tokens issued at registration do not open the production API yet.
    let response = send(&app, bearer_request("GET", "/api/grs", &early_access)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Neither does a password login before approval.
    let login = json!({ "email": "eng@example.com", "password": "correct horse" });
    let response = send(&app, json_request("POST", "/api/auth/login", login.clone())).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The approval link is pulled straight from the stored record, as an
    // operator reading the log would.
    let user = ctx
        .state
        .users
        .find_one(doc! { "email": "eng@example.com" })
        .await
        .unwrap()
        .unwrap();
    let token = user.approval_token.unwrap();
    let response = send(
        &app,
        Request::builder()
            .method("GET")
            .uri(format!("/api/admin/approve-user?token={token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, json_request("POST", "/api/auth/login", login)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let session = body_json(response).await;
    let access = session["access"].as_str().unwrap().to_string();
    let refresh = session["refresh"].as_str().unwrap().to_string();

    let response = send(&app, bearer_request("GET", "/api/grs", &access)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!([]));

    let response = send(&app, bearer_request("GET", "/api/auth/user", &access)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["email"], json!("eng@example.com"));

    // Logout revokes the refresh token.
    let response = send(
        &app,
        json_request("POST", "/api/auth/logout", json!({ "refresh": refresh })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = send(
        &app,
        json_request(
            "POST",
            "/api/auth/refresh",
            json!({ "refresh": session["refresh"] }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    common::teardown(Some(ctx)).await;
}

#[tokio::test]
async fn production_requires_auth_but_demo_is_public() {
    let Some(ctx) = common::setup_state().await else {
        return;
    };
    let app = app(Arc::new(ctx.state.clone()));

    let response = send(
        &app,
        Request::builder()
            .method("GET")
            .uri("/api/grs")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(
        &app,
        Request::builder()
            .method("GET")
            .uri("/api/demo/grs")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let grs = body_json(response).await;
    assert!(!grs.as_array().unwrap().is_empty());

    let response = send(
        &app,
        Request::builder()
            .method("GET")
            .uri("/api/demo/status")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert!(report.get("works_status").is_some());

    common::teardown(Some(ctx)).await;
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let Some(ctx) = common::setup_state().await else {
        return;
    };
    let app = app(Arc::new(ctx.state.clone()));

    let register = json!({
        "email": "dup@example.com",
        "username": "dup",
        "password": "long enough",
    });
    let response = send(&app, json_request("POST", "/api/auth/register", register.clone())).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let response = send(&app, json_request("POST", "/api/auth/register", register)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    common::teardown(Some(ctx)).await;
}
