use std::sync::Arc;

use axum::{extract::State, Extension, Json};
use chrono::Utc;
use rust_decimal::Decimal;
use scrypt::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Scrypt,
};
use serde_dynamo::to_item;
use ulid::Ulid;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::{
    constants::{JWT_AUDIENCE, USER_TABLE},
    errors::HandlerError,
    models::{
        auth::{AuthResponse, Claim, ClaimOwned, LoginPayload, RegisterPayload},
        user::{Role, User, UserProfile},
        ApiResponse,
    },
    services::store,
    state::AppState,
    utils::{now_ms, round_money, valid_username},
};

pub fn public_router() -> OpenApiRouter<Arc<AppState>> {
    OpenApiRouter::new()
        .routes(routes!(register))
        .routes(routes!(login))
}

pub fn protected_router() -> OpenApiRouter<Arc<AppState>> {
    OpenApiRouter::new().routes(routes!(me))
}

pub fn sign_token(state: &AppState, user: &User) -> Result<String, HandlerError> {
    let now = Utc::now().timestamp();
    let claim = Claim {
        sub: user.id,
        username: &user.username,
        role: user.role,
        aud: JWT_AUDIENCE,
        iat: now,
        exp: now + state.config.token_ttl_secs as i64,
    };
    Ok(jsonwebtoken::encode(&state.jwt.2, &claim, &state.jwt.0)?)
}

/// Register a new user
#[utoipa::path(
    post,
    path = "/register",
    tag = "Auth",
    request_body = RegisterPayload,
    responses(
        (status = OK, description = "Register success", body = ApiResponse<AuthResponse>),
        (status = BAD_REQUEST, description = "Invalid input", body = HandlerError),
        (status = CONFLICT, description = "Username or email taken", body = HandlerError),
    ),
)]
async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterPayload>,
) -> Result<Json<ApiResponse<AuthResponse>>, HandlerError> {
    if !valid_username(&payload.username) {
        return Err(HandlerError::Validation(
            "username must be 3-50 characters of [A-Za-z0-9_-]".to_string(),
        ));
    }
    if let Some(password) = &payload.password {
        if password.len() < 8 {
            return Err(HandlerError::Validation(
                "password must be at least 8 characters".to_string(),
            ));
        }
    }
    if let Some(email) = &payload.email {
        if !email.contains('@') {
            return Err(HandlerError::Validation("invalid email".to_string()));
        }
    }

    if store::find_user_by_username(&state.db, &payload.username)
        .await?
        .is_some()
    {
        return Err(HandlerError::Conflict("Username already taken".to_string()));
    }
    if let Some(email) = &payload.email {
        if store::find_user_by_email(&state.db, email).await?.is_some() {
            return Err(HandlerError::Conflict("Email already taken".to_string()));
        }
    }

    let password = match &payload.password {
        Some(password) => {
            let salt = SaltString::generate(&mut OsRng);
            Scrypt
                .hash_password(password.as_bytes(), &salt)?
                .to_string()
        }
        None => String::new(),
    };

    let cap = state.config.initial_balance;
    let balance = round_money(payload.initial_balance.unwrap_or(cap))
        .min(cap)
        .max(Decimal::ZERO);
    let role = if payload.username == state.config.admin_username {
        Role::Admin
    } else {
        Role::Bidder
    };

    let user = User {
        id: Ulid::new(),
        username: payload.username,
        email: payload.email,
        role,
        password,
        balance,
        reserved: Decimal::ZERO,
        total_bids: 0,
        total_wins: 0,
        total_spent: Decimal::ZERO,
        created_at: now_ms(),
        version: 1,
    };

    state
        .db
        .put_item()
        .table_name(USER_TABLE)
        .set_item(Some(to_item(user.clone())?))
        .condition_expression("attribute_not_exists(id)")
        .send()
        .await?;

    let token = sign_token(&state, &user)?;
    Ok(Json(ApiResponse::ok(AuthResponse {
        user: UserProfile::from(&user),
        token,
    })))
}

/// Login with username and password
#[utoipa::path(
    post,
    path = "/login",
    tag = "Auth",
    request_body = LoginPayload,
    responses(
        (status = OK, description = "Login success", body = ApiResponse<AuthResponse>),
        (status = UNAUTHORIZED, description = "Invalid credentials", body = HandlerError),
    ),
)]
async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginPayload>,
) -> Result<Json<ApiResponse<AuthResponse>>, HandlerError> {
    let invalid = || HandlerError::Unauthenticated("Invalid credentials".to_string());

    let user = store::find_user_by_username(&state.db, &payload.username)
        .await?
        .ok_or_else(invalid)?;
    if user.password.is_empty() {
        // Passwordless demo account; only its registration token works.
        return Err(invalid());
    }
    let parsed = PasswordHash::new(&user.password).map_err(|_| invalid())?;
    Scrypt
        .verify_password(payload.password.as_bytes(), &parsed)
        .map_err(|_| invalid())?;

    let token = sign_token(&state, &user)?;
    Ok(Json(ApiResponse::ok(AuthResponse {
        user: UserProfile::from(&user),
        token,
    })))
}

/// Current user profile
#[utoipa::path(
    get,
    path = "/me",
    tag = "Auth",
    responses(
        (status = OK, description = "Current profile", body = ApiResponse<UserProfile>),
        (status = UNAUTHORIZED, description = "Not authenticated", body = HandlerError),
    ),
    security(("http-jwt" = [])),
)]
async fn me(
    Extension(claim): Extension<ClaimOwned>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<UserProfile>>, HandlerError> {
    let user = store::get_user(&state.db, claim.sub).await?;
    Ok(Json(ApiResponse::ok(UserProfile::from(&user))))
}
