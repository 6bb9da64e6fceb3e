use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use ulid::Ulid;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::{
    errors::HandlerError,
    models::{
        auth::ClaimOwned,
        bid::{Bid, IncreaseBidRequest, PlaceBidRequest},
        ApiResponse,
    },
    services::bids,
    state::AppState,
};

pub fn router() -> OpenApiRouter<Arc<AppState>> {
    OpenApiRouter::new()
        .routes(routes!(place_bid))
        .routes(routes!(increase_bid, cancel_bid))
}

/// Place the caller's bid on an auction
#[utoipa::path(
    post,
    path = "/",
    tag = "Bid",
    request_body = PlaceBidRequest,
    responses(
        (status = OK, description = "Bid placed", body = ApiResponse<Bid>),
        (status = BAD_REQUEST, description = "Below minimum or insufficient funds", body = HandlerError),
        (status = CONFLICT, description = "Already bidding", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn place_bid(
    Extension(claim): Extension<ClaimOwned>,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PlaceBidRequest>,
) -> Result<Json<ApiResponse<Bid>>, HandlerError> {
    let bid = bids::place_bid(&state, claim.sub, &payload).await?;
    Ok(Json(ApiResponse::ok(bid)))
}

/// Raise an active bid by at least the configured step
#[utoipa::path(
    put,
    path = "/{id}",
    tag = "Bid",
    params(("id" = String, Path, description = "Bid ID")),
    request_body = IncreaseBidRequest,
    responses(
        (status = OK, description = "Bid increased", body = ApiResponse<Bid>),
        (status = BAD_REQUEST, description = "Below minimum step", body = HandlerError),
        (status = CONFLICT, description = "Concurrent modification", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn increase_bid(
    Extension(claim): Extension<ClaimOwned>,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Ulid>,
    Json(payload): Json<IncreaseBidRequest>,
) -> Result<Json<ApiResponse<Bid>>, HandlerError> {
    let bid = bids::increase_bid(&state, claim.sub, id, payload.new_amount).await?;
    Ok(Json(ApiResponse::ok(bid)))
}

/// Cancel a bid whose round has not started
#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Bid",
    params(("id" = String, Path, description = "Bid ID")),
    responses(
        (status = OK, description = "Bid refunded", body = ApiResponse<Bid>),
        (status = CONFLICT, description = "Round already started", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn cancel_bid(
    Extension(claim): Extension<ClaimOwned>,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Ulid>,
) -> Result<Json<ApiResponse<Bid>>, HandlerError> {
    let bid = bids::cancel_bid(&state, claim.sub, id).await?;
    Ok(Json(ApiResponse::ok(bid)))
}
