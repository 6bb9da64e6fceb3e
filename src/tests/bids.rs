use axum::http::StatusCode;
use tower::ServiceExt;

use crate::{
    create_service,
    models::user::Role,
    models::ApiResponse,
    state::AppState,
    tests::{build_request, parse_resp, sign_test_token},
};

#[tokio::test]
async fn test_place_bid_requires_positive_amount() {
    let state = AppState::test().await;
    let token = sign_test_token(&state, Role::Bidder);
    let service = create_service(state);

    let payload = serde_json::json!({
        "auctionId": ulid::Ulid::new(),
        "amount": "-5"
    });
    let req = build_request("POST", "/bids", Some(&token), Some(&payload));
    let resp = service.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: ApiResponse<serde_json::Value> = parse_resp(resp).await;
    assert!(!body.success);
    assert_eq!(body.error.unwrap().kind, "Validation");
}

#[tokio::test]
async fn test_bid_routes_require_auth() {
    let state = AppState::test().await;
    let service = create_service(state);

    let payload = serde_json::json!({ "auctionId": ulid::Ulid::new(), "amount": "100" });
    let req = build_request("POST", "/bids", None, Some(&payload));
    let resp = service.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}
