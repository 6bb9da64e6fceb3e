use axum::http::StatusCode;
use tower::ServiceExt;

use crate::{
    create_service,
    models::user::Role,
    models::ApiResponse,
    state::AppState,
    tests::{build_request, parse_resp, sign_test_token},
};

fn auction_payload(round_duration: u64, anti_snipe_window: u64) -> serde_json::Value {
    serde_json::json!({
        "name": "Genesis drop",
        "totalItems": 200,
        "itemsPerRound": 50,
        "startTime": 4_000_000_000_000i64,
        "roundDuration": round_duration,
        "antiSnipeWindow": anti_snipe_window,
        "antiSnipeExtension": 60,
        "maxExtensions": 3,
        "minBid": "100",
        "minBidStep": 5
    })
}

#[tokio::test]
async fn test_create_auction_requires_admin() {
    let state = AppState::test().await;
    let token = sign_test_token(&state, Role::Bidder);
    let service = create_service(state);

    let req = build_request(
        "POST",
        "/auctions",
        Some(&token),
        Some(&auction_payload(3600, 60)),
    );
    let resp = service.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body: ApiResponse<serde_json::Value> = parse_resp(resp).await;
    assert_eq!(body.error.unwrap().kind, "Forbidden");
}

#[tokio::test]
async fn test_create_auction_validates_round_duration() {
    let state = AppState::test().await;
    let token = sign_test_token(&state, Role::Admin);
    let service = create_service(state);

    let req = build_request(
        "POST",
        "/auctions",
        Some(&token),
        Some(&auction_payload(10, 60)),
    );
    let resp = service.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: ApiResponse<serde_json::Value> = parse_resp(resp).await;
    assert_eq!(body.error.unwrap().kind, "Validation");
}

#[tokio::test]
async fn test_anti_snipe_window_must_fit_the_round() {
    let state = AppState::test().await;
    let token = sign_test_token(&state, Role::Admin);
    let service = create_service(state);

    // Window of 120s against a 60s round is rejected.
    let req = build_request(
        "POST",
        "/auctions",
        Some(&token),
        Some(&auction_payload(60, 120)),
    );
    let resp = service.oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
