mod auctions;
mod auth;
mod bids;

use axum::{
    body::{Body, HttpBody},
    extract::Request,
    response::Response,
};
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    constants::JWT_AUDIENCE,
    models::auth::ClaimOwned,
    models::user::Role,
    state::AppState,
};

async fn parse_resp<T: DeserializeOwned>(resp: Response<Body>) -> T {
    let body = resp.into_body();
    let limit = body.size_hint().upper().unwrap_or(u64::MAX) as usize;
    let data = axum::body::to_bytes(body, limit).await.unwrap();
    serde_json::from_slice(&data).unwrap()
}

fn build_request<T: Serialize>(
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<&T>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    match body {
        Some(value) => builder
            .header("Content-Type", "application/json")
            .body(Body::new(serde_json::to_string(value).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn sign_test_token(state: &AppState, role: Role) -> String {
    let now = Utc::now().timestamp();
    let claim = ClaimOwned {
        sub: ulid::Ulid::new(),
        username: "tester".to_string(),
        role,
        aud: JWT_AUDIENCE.to_string(),
        iat: now,
        exp: now + 3600,
    };
    jsonwebtoken::encode(&state.jwt.2, &claim, &state.jwt.0).unwrap()
}
