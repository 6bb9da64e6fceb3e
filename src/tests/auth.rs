use axum::http::StatusCode;
use tower::ServiceExt;

use crate::{
    create_service,
    models::ApiResponse,
    state::AppState,
    tests::{build_request, parse_resp},
};

#[tokio::test]
async fn test_health() {
    let state = AppState::test().await;
    let service = create_service(state);

    let req = build_request::<()>("GET", "/health", None, None);
    let resp = service.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_register_rejects_bad_username() {
    let state = AppState::test().await;
    let service = create_service(state);

    let payload = serde_json::json!({ "username": "ab", "password": "long-enough-pass" });
    let req = build_request("POST", "/auth/register", None, Some(&payload));
    let resp = service.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: ApiResponse<serde_json::Value> = parse_resp(resp).await;
    assert!(!body.success);
    assert_eq!(body.error.unwrap().kind, "Validation");
}

#[tokio::test]
async fn test_register_rejects_short_password() {
    let state = AppState::test().await;
    let service = create_service(state);

    let payload = serde_json::json!({ "username": "valid_user", "password": "short" });
    let req = build_request("POST", "/auth/register", None, Some(&payload));
    let resp = service.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_protected_route_requires_token() {
    let state = AppState::test().await;
    let service = create_service(state);

    let req = build_request::<()>("GET", "/auth/me", None, None);
    let resp = service.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: ApiResponse<serde_json::Value> = parse_resp(resp).await;
    assert_eq!(body.error.unwrap().kind, "Unauthenticated");
}

#[tokio::test]
async fn test_garbage_token_is_rejected() {
    let state = AppState::test().await;
    let service = create_service(state);

    let req = build_request::<()>("GET", "/auth/me", Some("not-a-jwt"), None);
    let resp = service.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}
