use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::{
    errors::HandlerError,
    models::{
        auth::ClaimOwned,
        transaction::Transaction,
        user::{AdjustBalanceRequest, BalanceResponse, UserProfile},
        ApiResponse, PageQuery, Pagination,
    },
    services::{ledger, store},
    state::AppState,
};

pub fn router() -> OpenApiRouter<Arc<AppState>> {
    OpenApiRouter::new()
        .routes(routes!(balance))
        .routes(routes!(deposit))
        .routes(routes!(withdraw))
        .routes(routes!(transactions))
}

/// The caller's balance breakdown
#[utoipa::path(
    get,
    path = "/me/balance",
    tag = "User",
    responses(
        (status = OK, description = "Balance", body = ApiResponse<BalanceResponse>),
    ),
    security(("http-jwt" = [])),
)]
async fn balance(
    Extension(claim): Extension<ClaimOwned>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<BalanceResponse>>, HandlerError> {
    let user = store::get_user(&state.db, claim.sub).await?;
    Ok(Json(ApiResponse::ok(BalanceResponse {
        balance: user.balance,
        reserved: user.reserved,
        available: user.available(),
    })))
}

/// Deposit funds
#[utoipa::path(
    post,
    path = "/me/deposit",
    tag = "User",
    request_body = AdjustBalanceRequest,
    responses(
        (status = OK, description = "Deposit applied", body = ApiResponse<UserProfile>),
        (status = BAD_REQUEST, description = "Invalid amount", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn deposit(
    Extension(claim): Extension<ClaimOwned>,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AdjustBalanceRequest>,
) -> Result<Json<ApiResponse<UserProfile>>, HandlerError> {
    let user = ledger::deposit(&state.db, claim.sub, payload.amount).await?;
    Ok(Json(ApiResponse::ok(UserProfile::from(&user))))
}

/// Withdraw available funds
#[utoipa::path(
    post,
    path = "/me/withdraw",
    tag = "User",
    request_body = AdjustBalanceRequest,
    responses(
        (status = OK, description = "Withdrawal applied", body = ApiResponse<UserProfile>),
        (status = BAD_REQUEST, description = "Insufficient available funds", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn withdraw(
    Extension(claim): Extension<ClaimOwned>,
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AdjustBalanceRequest>,
) -> Result<Json<ApiResponse<UserProfile>>, HandlerError> {
    let user = ledger::withdraw(&state.db, claim.sub, payload.amount).await?;
    Ok(Json(ApiResponse::ok(UserProfile::from(&user))))
}

/// The caller's ledger log, newest first
#[utoipa::path(
    get,
    path = "/me/transactions",
    tag = "User",
    params(PageQuery),
    responses(
        (status = OK, description = "Transaction log", body = ApiResponse<Vec<Transaction>>),
    ),
    security(("http-jwt" = [])),
)]
async fn transactions(
    Extension(claim): Extension<ClaimOwned>,
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ApiResponse<Vec<Transaction>>>, HandlerError> {
    let (page, limit) = query.resolve();
    let (entries, total) = ledger::list_transactions(&state.db, claim.sub, page, limit).await?;
    Ok(Json(ApiResponse::page(
        entries,
        Pagination { page, limit, total },
    )))
}
