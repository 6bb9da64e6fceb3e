use core::fmt;

use aws_sdk_dynamodb::types::AttributeValue;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BidStatus {
    /// Eligible to win in the auction's current round.
    Active,
    /// Demoted from a completed round into the next one, reservation kept.
    CarriedOver,
    Won,
    Refunded,
    Outbid,
}

impl From<BidStatus> for AttributeValue {
    fn from(value: BidStatus) -> Self {
        AttributeValue::S(value.to_string())
    }
}

impl fmt::Display for BidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let out = match *self {
            BidStatus::Active => "active",
            BidStatus::CarriedOver => "carried_over",
            BidStatus::Won => "won",
            BidStatus::Refunded => "refunded",
            BidStatus::Outbid => "outbid",
        };
        write!(f, "{}", out)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BidAction {
    Created,
    Increased,
    CarriedOver,
    Won,
    Refunded,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BidHistoryEntry {
    pub action: BidAction,
    pub amount: Decimal,
    pub round: u32,
    /// Unix millis.
    pub ts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_amount: Option<Decimal>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    /// `auctionId` is the hash key, `id` the range key.
    pub auction_id: Ulid,
    pub id: Ulid,
    pub user_id: Ulid,
    /// Denormalized for leaderboards and events.
    pub username: String,
    pub amount: Decimal,
    pub original_amount: Decimal,
    pub created_in_round: u32,
    /// The round this bid competes in; historical once the bid settles.
    pub current_round: u32,
    pub status: BidStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub won_item_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub won_in_round: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub won_position: Option<u32>,
    /// Append-only; first entry is always `created`.
    pub history: Vec<BidHistoryEntry>,
    /// Create time, unix millis. Tie-break key: earliest wins.
    pub created_at: i64,
    pub version: u64,
}

/// Fingerprint guard item, keyed `auctionId#userId`. Its existence means the
/// user holds an active or carried-over bid in that auction; it is created
/// inside the place-bid transaction and deleted exactly once when the bid
/// settles.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BidLock {
    pub fingerprint: String,
    pub auction_id: Ulid,
    pub user_id: Ulid,
    pub bid_id: Ulid,
}

impl BidLock {
    pub fn fingerprint_of(auction_id: Ulid, user_id: Ulid) -> String {
        format!("{auction_id}#{user_id}")
    }

    pub fn new(auction_id: Ulid, user_id: Ulid, bid_id: Ulid) -> Self {
        Self {
            fingerprint: Self::fingerprint_of(auction_id, user_id),
            auction_id,
            user_id,
            bid_id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlaceBidRequest {
    pub auction_id: Ulid,
    pub amount: Decimal,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IncreaseBidRequest {
    pub new_amount: Decimal,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// 1-based rank under `(amount DESC, createdAt ASC)`.
    pub position: u32,
    pub user_id: Ulid,
    pub username: String,
    pub amount: Decimal,
    pub is_current_user: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardResponse {
    pub round_number: u32,
    /// Positions at or above the cutoff are currently winning.
    pub cutoff_position: u32,
    pub entries: Vec<LeaderboardEntry>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MyPositionResponse {
    pub position: u32,
    pub total_bids: u32,
    pub is_winning: bool,
}
