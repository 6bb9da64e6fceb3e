use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;
use utoipa::ToSchema;

use super::user::{Role, UserProfile};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    pub username: String,
    /// Optional for throwaway demo accounts; such accounts cannot log in
    /// again once the registration token expires.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Demo convenience; capped by server configuration.
    #[serde(default)]
    pub initial_balance: Option<Decimal>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginPayload {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: UserProfile,
    /// Signed JWT bearer token.
    pub token: String,
}

/// Borrowing claim, used at signing time.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Claim<'a> {
    pub sub: Ulid,
    pub username: &'a str,
    pub role: Role,
    pub aud: &'a str,
    /// Unix seconds.
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ClaimOwned {
    pub sub: Ulid,
    pub username: String,
    pub role: Role,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}
