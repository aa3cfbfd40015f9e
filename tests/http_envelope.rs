mod common;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::Value;
use storefront_api::{
    app::build_router, models::Role, services::auth_service::issue_token, state::AppState,
};
use tower::ServiceExt;
use uuid::Uuid;

fn app() -> (Router, AppState) {
    let state = common::offline_state();
    (build_router(state.clone()), state)
}

fn token_for(state: &AppState, role: Role) -> String {
    issue_token(&state.config, Uuid::new_v4(), "someone@example.test", role).expect("token")
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value, Option<String>) {
    let response = app.oneshot(request).await.expect("response");
    let status = response.status();
    let request_id = response
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body, request_id)
}

#[tokio::test]
async fn unknown_route_uses_error_envelope() {
    let (app, _) = app();
    let (status, body, request_id) = send(
        app,
        Request::get("/api/nowhere").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["message"], "Route not found");
    assert!(request_id.is_some(), "x-request-id is propagated");
}

#[tokio::test]
async fn protected_route_without_token_is_unauthorized() {
    let (app, _) = app();
    let (status, body, _) = send(app, Request::get("/api/cart").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["message"], "No token provided");
}

#[tokio::test]
async fn garbage_token_is_unauthorized() {
    let (app, _) = app();
    let request = Request::get("/api/orders")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn customer_token_on_admin_route_is_forbidden() {
    let (app, state) = app();
    let request = Request::get("/api/admin/stats")
        .header(
            header::AUTHORIZATION,
            format!("Bearer {}", token_for(&state, Role::User)),
        )
        .body(Body::empty())
        .unwrap();
    let (status, body, _) = send(app, request).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["message"], "Access denied. Admin only.");
}

#[tokio::test]
async fn customer_cannot_create_products() {
    let (app, state) = app();
    let request = Request::post("/api/products")
        .header(
            header::AUTHORIZATION,
            format!("Bearer {}", token_for(&state, Role::User)),
        )
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"name":"Tee","price":1000}"#))
        .unwrap();
    let (status, _, _) = send(app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn malformed_path_id_is_bad_request() {
    let (app, _) = app();
    let (status, body, _) = send(
        app,
        Request::get("/api/products/not-a-uuid").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let (app, _) = app();
    let request = Request::post("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body, _) = send(app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn registration_is_validated_before_touching_the_database() {
    let (app, _) = app();
    let request = Request::post("/api/auth/register")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            r#"{"email":"not-an-email","password":"short","first_name":"A","last_name":"B"}"#,
        ))
        .unwrap();
    let (status, body, _) = send(app, request).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
    assert!(body["error"]["details"].is_object());
}

#[tokio::test]
async fn health_endpoint_answers_without_a_database() {
    let (app, _) = app();
    let (status, body, _) = send(app, Request::get("/health").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["database"], "down");
}

#[tokio::test]
async fn huge_page_number_does_not_crash_the_listing() {
    let (app, _) = app();
    let (status, body, _) = send(
        app,
        Request::get("/api/products?page=9223372036854775807")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    // No database behind the offline state, so the listing fails cleanly.
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn unknown_order_status_is_unprocessable() {
    let (app, state) = app();
    let request = Request::put(format!("/api/orders/{}/status", Uuid::new_v4()))
        .header(
            header::AUTHORIZATION,
            format!("Bearer {}", token_for(&state, Role::Admin)),
        )
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"status":"teleported"}"#))
        .unwrap();
    let (status, body, _) = send(app, request).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
    assert!(body["error"]["details"]["body"].is_array());
}
