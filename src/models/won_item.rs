use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;
use utoipa::ToSchema;

/// One awarded slot. `bidId` is the hash key, so a bid can win at most one
/// item; `(auctionId, itemNumber)` is unique via the allocation order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WonItem {
    pub bid_id: Ulid,
    pub auction_id: Ulid,
    pub user_id: Ulid,
    /// `1..=totalItems`, unique within the auction.
    pub item_number: u32,
    pub round_number: u32,
    /// 1-based rank inside the winning round.
    pub position_in_round: u32,
    pub winning_bid_amount: Decimal,
    /// Unix millis.
    pub created_at: i64,
}
