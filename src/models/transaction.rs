use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    BidPlaced,
    BidIncreased,
    BidWon,
    BidRefunded,
    AdminAdjustment,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let out = match *self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::BidPlaced => "bid_placed",
            TransactionType::BidIncreased => "bid_increased",
            TransactionType::BidWon => "bid_won",
            TransactionType::BidRefunded => "bid_refunded",
            TransactionType::AdminAdjustment => "admin_adjustment",
        };
        write!(f, "{}", out)
    }
}

/// Append-only ledger log entry. Never updated.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Hash key; `id` is the range key (Ulid, creation-ordered).
    pub user_id: Ulid,
    pub id: Ulid,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    /// Magnitude of the movement; reservation entries record the reserved
    /// delta while the balance stays unchanged.
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auction_id: Option<Ulid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bid_id: Option<Ulid>,
    pub description: String,
    /// Unix millis.
    pub created_at: i64,
}
