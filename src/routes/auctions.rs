use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use ulid::Ulid;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::{
    errors::HandlerError,
    models::{
        auction::{Auction, AuctionDetail, CreateAuctionRequest, ListAuctionsQuery},
        auth::ClaimOwned,
        bid::{LeaderboardResponse, MyPositionResponse},
        round::Round,
        won_item::WonItem,
        ApiResponse, Pagination,
    },
    routes::check_admin,
    services::{auctions, bids, store},
    state::AppState,
};

pub fn router() -> OpenApiRouter<Arc<AppState>> {
    OpenApiRouter::new()
        .routes(routes!(create_auction, list_auctions))
        .routes(routes!(get_auction, cancel_auction))
        .routes(routes!(start_auction))
        .routes(routes!(pause_auction))
        .routes(routes!(resume_auction))
        .routes(routes!(current_round))
        .routes(routes!(list_rounds))
        .routes(routes!(won_items))
        .routes(routes!(leaderboard))
        .routes(routes!(my_position))
}

/// Create an auction with its precomputed rounds
#[utoipa::path(
    post,
    path = "/",
    tag = "Auction",
    request_body = CreateAuctionRequest,
    responses(
        (status = OK, description = "Auction created", body = ApiResponse<AuctionDetail>),
        (status = BAD_REQUEST, description = "Invalid parameters", body = HandlerError),
        (status = FORBIDDEN, description = "Not an admin", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn create_auction(
    Extension(claim): Extension<ClaimOwned>,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateAuctionRequest>,
) -> Result<Json<ApiResponse<AuctionDetail>>, HandlerError> {
    check_admin(&claim)?;
    let detail = auctions::create_auction(&state, &payload).await?;
    Ok(Json(ApiResponse::ok(detail)))
}

/// List auctions
#[utoipa::path(
    get,
    path = "/",
    tag = "Auction",
    params(ListAuctionsQuery),
    responses(
        (status = OK, description = "Paginated auctions", body = ApiResponse<Vec<Auction>>),
    ),
    security(("http-jwt" = [])),
)]
async fn list_auctions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListAuctionsQuery>,
) -> Result<Json<ApiResponse<Vec<Auction>>>, HandlerError> {
    let (entries, total) = auctions::list_auctions(&state, &query).await?;
    let pagination = Pagination {
        page: query.page.unwrap_or(1).max(1),
        limit: query.limit.unwrap_or(20).clamp(1, 100),
        total,
    };
    Ok(Json(ApiResponse::page(entries, pagination)))
}

/// Auction detail with rounds and counters
#[utoipa::path(
    get,
    path = "/{id}",
    tag = "Auction",
    params(("id" = String, Path, description = "Auction ID")),
    responses(
        (status = OK, description = "Auction detail", body = ApiResponse<AuctionDetail>),
        (status = NOT_FOUND, description = "Auction not found", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn get_auction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Ulid>,
) -> Result<Json<ApiResponse<AuctionDetail>>, HandlerError> {
    let detail = auctions::get_detail(&state, id).await?;
    Ok(Json(ApiResponse::ok(detail)))
}

/// Cancel a scheduled or paused auction, refunding every reservation
#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Auction",
    params(("id" = String, Path, description = "Auction ID")),
    responses(
        (status = OK, description = "Auction cancelled", body = ApiResponse<Auction>),
        (status = CONFLICT, description = "Wrong state", body = HandlerError),
        (status = FORBIDDEN, description = "Not an admin", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn cancel_auction(
    Extension(claim): Extension<ClaimOwned>,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Ulid>,
) -> Result<Json<ApiResponse<Auction>>, HandlerError> {
    check_admin(&claim)?;
    let auction = auctions::cancel_auction(&state, id).await?;
    Ok(Json(ApiResponse::ok(auction)))
}

/// Manually start a scheduled auction
#[utoipa::path(
    post,
    path = "/{id}/start",
    tag = "Auction",
    params(("id" = String, Path, description = "Auction ID")),
    responses(
        (status = OK, description = "Auction started", body = ApiResponse<AuctionDetail>),
        (status = CONFLICT, description = "Wrong state", body = HandlerError),
        (status = FORBIDDEN, description = "Not an admin", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn start_auction(
    Extension(claim): Extension<ClaimOwned>,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Ulid>,
) -> Result<Json<ApiResponse<AuctionDetail>>, HandlerError> {
    check_admin(&claim)?;
    let detail = auctions::start_auction(&state, id).await?;
    Ok(Json(ApiResponse::ok(detail)))
}

/// Pause an active auction between rounds
#[utoipa::path(
    post,
    path = "/{id}/pause",
    tag = "Auction",
    params(("id" = String, Path, description = "Auction ID")),
    responses(
        (status = OK, description = "Auction paused", body = ApiResponse<Auction>),
        (status = CONFLICT, description = "Wrong state", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn pause_auction(
    Extension(claim): Extension<ClaimOwned>,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Ulid>,
) -> Result<Json<ApiResponse<Auction>>, HandlerError> {
    check_admin(&claim)?;
    let auction = auctions::pause_auction(&state, id).await?;
    Ok(Json(ApiResponse::ok(auction)))
}

/// Resume a paused auction
#[utoipa::path(
    post,
    path = "/{id}/resume",
    tag = "Auction",
    params(("id" = String, Path, description = "Auction ID")),
    responses(
        (status = OK, description = "Auction resumed", body = ApiResponse<Auction>),
        (status = CONFLICT, description = "Wrong state", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn resume_auction(
    Extension(claim): Extension<ClaimOwned>,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Ulid>,
) -> Result<Json<ApiResponse<Auction>>, HandlerError> {
    check_admin(&claim)?;
    let auction = auctions::resume_auction(&state, id).await?;
    Ok(Json(ApiResponse::ok(auction)))
}

/// The currently active round
#[utoipa::path(
    get,
    path = "/{id}/current-round",
    tag = "Auction",
    params(("id" = String, Path, description = "Auction ID")),
    responses(
        (status = OK, description = "Active round", body = ApiResponse<Round>),
        (status = NOT_FOUND, description = "No active round", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn current_round(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Ulid>,
) -> Result<Json<ApiResponse<Round>>, HandlerError> {
    let round = auctions::current_round(&state, id).await?;
    Ok(Json(ApiResponse::ok(round)))
}

/// All rounds of an auction
#[utoipa::path(
    get,
    path = "/{id}/rounds",
    tag = "Auction",
    params(("id" = String, Path, description = "Auction ID")),
    responses(
        (status = OK, description = "Rounds in order", body = ApiResponse<Vec<Round>>),
    ),
    security(("http-jwt" = [])),
)]
async fn list_rounds(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Ulid>,
) -> Result<Json<ApiResponse<Vec<Round>>>, HandlerError> {
    store::get_auction(&state.db, id).await?;
    let rounds = store::list_rounds(&state.db, id).await?;
    Ok(Json(ApiResponse::ok(rounds)))
}

/// Allocation results, ordered by item number
#[utoipa::path(
    get,
    path = "/{id}/won-items",
    tag = "Auction",
    params(("id" = String, Path, description = "Auction ID")),
    responses(
        (status = OK, description = "Awarded items", body = ApiResponse<Vec<WonItem>>),
    ),
    security(("http-jwt" = [])),
)]
async fn won_items(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Ulid>,
) -> Result<Json<ApiResponse<Vec<WonItem>>>, HandlerError> {
    store::get_auction(&state.db, id).await?;
    let items = store::list_won_items(&state.db, id).await?;
    Ok(Json(ApiResponse::ok(items)))
}

/// Ranked bids for a round
#[utoipa::path(
    get,
    path = "/{auctionId}/rounds/{roundNumber}/leaderboard",
    tag = "Auction",
    params(
        ("auctionId" = String, Path, description = "Auction ID"),
        ("roundNumber" = u32, Path, description = "1-based round number"),
    ),
    responses(
        (status = OK, description = "Ranked bids", body = ApiResponse<LeaderboardResponse>),
        (status = NOT_FOUND, description = "Round not found", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn leaderboard(
    Extension(claim): Extension<ClaimOwned>,
    State(state): State<Arc<AppState>>,
    Path((auction_id, round_number)): Path<(Ulid, u32)>,
) -> Result<Json<ApiResponse<LeaderboardResponse>>, HandlerError> {
    let board = bids::leaderboard(&state, auction_id, round_number, Some(claim.sub)).await?;
    Ok(Json(ApiResponse::ok(board)))
}

/// The caller's rank in the current round
#[utoipa::path(
    get,
    path = "/{auctionId}/my-position",
    tag = "Auction",
    params(("auctionId" = String, Path, description = "Auction ID")),
    responses(
        (status = OK, description = "Caller's position", body = ApiResponse<MyPositionResponse>),
        (status = NOT_FOUND, description = "No bid in the current round", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn my_position(
    Extension(claim): Extension<ClaimOwned>,
    State(state): State<Arc<AppState>>,
    Path(auction_id): Path<Ulid>,
) -> Result<Json<ApiResponse<MyPositionResponse>>, HandlerError> {
    let position = bids::my_position(&state, auction_id, claim.sub).await?;
    Ok(Json(ApiResponse::ok(position)))
}
