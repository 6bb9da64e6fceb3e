use core::fmt;

use aws_sdk_dynamodb::types::AttributeValue;
use serde::{Deserialize, Serialize};
use ulid::Ulid;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    Scheduled,
    Active,
    Completed,
}

impl From<RoundStatus> for AttributeValue {
    fn from(value: RoundStatus) -> Self {
        AttributeValue::S(value.to_string())
    }
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let out = match *self {
            RoundStatus::Scheduled => "scheduled",
            RoundStatus::Active => "active",
            RoundStatus::Completed => "completed",
        };
        write!(f, "{}", out)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub id: Ulid,
    /// Hash key; `roundNumber` is the range key.
    pub auction_id: Ulid,
    /// 1-based.
    pub round_number: u32,
    /// The last round may carry fewer items.
    pub items_in_round: u32,
    /// Unix millis. Advisory once any earlier round has extended.
    pub scheduled_start_time: i64,
    pub scheduled_end_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_start_time: Option<i64>,
    /// Moves forward on anti-snipe extension, tightens at completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_end_time: Option<i64>,
    pub extensions_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_extension_at: Option<i64>,
    pub status: RoundStatus,
    /// Set only after every winner and loser of the round has settled.
    pub winners_processed: bool,
    pub version: u64,
}

impl Round {
    /// Configured duration in millis, preserved even when the round starts
    /// late.
    pub fn configured_duration_ms(&self) -> i64 {
        self.scheduled_end_time - self.scheduled_start_time
    }
}
