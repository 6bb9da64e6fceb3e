use core::fmt;

use aws_sdk_dynamodb::types::AttributeValue;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;
use utoipa::{IntoParams, ToSchema};

use crate::{config::Config, errors::HandlerError, models::round::Round};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AuctionStatus {
    Scheduled,
    Active,
    Paused,
    Cancelling,
    Completed,
    Cancelled,
}

impl From<AuctionStatus> for AttributeValue {
    fn from(value: AuctionStatus) -> Self {
        AttributeValue::S(value.to_string())
    }
}

impl fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let out = match *self {
            AuctionStatus::Scheduled => "scheduled",
            AuctionStatus::Active => "active",
            AuctionStatus::Paused => "paused",
            AuctionStatus::Cancelling => "cancelling",
            AuctionStatus::Completed => "completed",
            AuctionStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", out)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Auction {
    /// Hash key.
    pub id: Ulid,
    pub name: String,
    pub total_items: u32,
    pub items_per_round: u32,
    /// `ceil(totalItems / itemsPerRound)`, immutable after creation.
    pub total_rounds: u32,
    /// Unix millis.
    pub start_time: i64,
    /// Seconds.
    pub round_duration: u64,
    /// Seconds; trailing interval during which a bid extends the round.
    pub anti_snipe_window: u64,
    /// Seconds added per extension.
    pub anti_snipe_extension: u64,
    pub max_extensions: u32,
    pub min_bid: Decimal,
    /// Percent, 1-100.
    pub min_bid_step: u32,
    pub currency: String,
    pub status: AuctionStatus,
    /// 0 until the first round starts.
    pub current_round: u32,
    /// Create time, unix millis.
    pub created_at: i64,
    pub version: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateAuctionRequest {
    pub name: String,
    pub total_items: u32,
    pub items_per_round: u32,
    /// Unix millis.
    pub start_time: i64,
    /// Seconds.
    pub round_duration: u64,
    /// Seconds, defaulted from configuration when omitted.
    pub anti_snipe_window: Option<u64>,
    pub anti_snipe_extension: Option<u64>,
    pub max_extensions: Option<u32>,
    pub min_bid: Decimal,
    /// Percent, defaulted to 5 when omitted.
    pub min_bid_step: Option<u32>,
    pub currency: Option<String>,
}

impl CreateAuctionRequest {
    /// Parameter bounds of the public surface.
    pub fn validate(&self, config: &Config) -> Result<(), HandlerError> {
        let fail = |msg: &str| Err(HandlerError::Validation(msg.to_string()));

        if self.name.trim().is_empty() || self.name.len() > 200 {
            return fail("name must be 1-200 characters");
        }
        if !(1..=10_000).contains(&self.total_items) {
            return fail("totalItems must be between 1 and 10000");
        }
        if !(1..=1_000).contains(&self.items_per_round) {
            return fail("itemsPerRound must be between 1 and 1000");
        }
        if !(60..=604_800).contains(&self.round_duration) {
            return fail("roundDuration must be between 60 and 604800 seconds");
        }
        let window = self
            .anti_snipe_window
            .unwrap_or(config.default_anti_snipe_window);
        if !(30..=300).contains(&window) {
            return fail("antiSnipeWindow must be between 30 and 300 seconds");
        }
        if window >= self.round_duration {
            return fail("antiSnipeWindow must be less than roundDuration");
        }
        let extension = self
            .anti_snipe_extension
            .unwrap_or(config.default_anti_snipe_extension);
        if !(30..=300).contains(&extension) {
            return fail("antiSnipeExtension must be between 30 and 300 seconds");
        }
        if self.max_extensions.unwrap_or(config.default_max_extensions) > 100 {
            return fail("maxExtensions must be between 0 and 100");
        }
        if self.min_bid <= Decimal::ZERO {
            return fail("minBid must be positive");
        }
        if let Some(step) = self.min_bid_step {
            if !(1..=100).contains(&step) {
                return fail("minBidStep must be between 1 and 100 percent");
            }
        }
        Ok(())
    }
}

/// Auction with its precomputed rounds and aggregate counters.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuctionDetail {
    #[serde(flatten)]
    pub auction: Auction,
    pub rounds: Vec<Round>,
    pub stats: AuctionStats,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuctionStats {
    pub total_bids: u64,
    pub active_bids: u64,
    pub items_awarded: u64,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListAuctionsQuery {
    pub status: Option<AuctionStatus>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}
