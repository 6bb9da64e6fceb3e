use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Bidder,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Role::Admin => write!(f, "admin"),
            Role::Bidder => write!(f, "bidder"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Hash key.
    pub id: Ulid,
    /// Unique, case-sensitive.
    pub username: String,
    /// Unique when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub role: Role,
    /// Scrypt PHC string.
    pub password: String,
    pub balance: Decimal,
    /// Portion of `balance` held by active and carried-over bids.
    /// Invariant: `0 <= reserved <= balance`.
    pub reserved: Decimal,
    pub total_bids: u32,
    pub total_wins: u32,
    pub total_spent: Decimal,
    /// Create time, unix millis.
    pub created_at: i64,
    /// Bumped by one on every successful mutation; conditional writes
    /// guard on the loaded value.
    pub version: u64,
}

impl User {
    pub fn available(&self) -> Decimal {
        self.balance - self.reserved
    }
}

/// Client-visible profile, without credentials.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Ulid,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub role: Role,
    pub balance: Decimal,
    pub reserved: Decimal,
    pub available: Decimal,
    pub total_bids: u32,
    pub total_wins: u32,
    pub total_spent: Decimal,
    pub created_at: i64,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
            balance: user.balance,
            reserved: user.reserved,
            available: user.available(),
            total_bids: user.total_bids,
            total_wins: user.total_wins,
            total_spent: user.total_spent,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub balance: Decimal,
    pub reserved: Decimal,
    pub available: Decimal,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdjustBalanceRequest {
    /// Amount to deposit or withdraw, positive.
    pub amount: Decimal,
}
