/// DynamoDB table names.
pub const USER_TABLE: &str = "ah-users";
pub const AUCTION_TABLE: &str = "ah-auctions";
pub const ROUND_TABLE: &str = "ah-rounds";
pub const BID_TABLE: &str = "ah-bids";
pub const BID_LOCK_TABLE: &str = "ah-bid-locks";
pub const TRANSACTION_TABLE: &str = "ah-transactions";
pub const WON_ITEM_TABLE: &str = "ah-won-items";
pub const TIMER_TABLE: &str = "ah-timers";

/// GSI on `ah-users` for username uniqueness lookups.
pub const USERNAME_INDEX: &str = "username-index";
/// GSI on `ah-users` for email uniqueness lookups.
pub const EMAIL_INDEX: &str = "email-index";
/// GSI on `ah-bids` for lookups by bid id alone.
pub const BID_ID_INDEX: &str = "id-index";
/// GSI on `ah-won-items` keyed `(auctionId, itemNumber)`.
pub const WON_ITEM_AUCTION_INDEX: &str = "auction-item-index";

pub const JWT_AUDIENCE: &str = "slotdrop";

/// Retry policy for optimistic-lock conflicts: up to 3 attempts with
/// 100 ms * attempt backoff.
pub const VERSION_RETRY_ATTEMPTS: u32 = 3;
pub const VERSION_RETRY_BASE_MS: u64 = 100;

/// Recovery sweeper cadence.
pub const SWEEP_INTERVAL_SECS: u64 = 60;

/// Timer keys. Consumers are idempotent against the payload, so a key may
/// fire more than once.
pub fn start_round_key(round_id: ulid::Ulid) -> String {
    format!("start-round:{round_id}")
}

pub fn end_round_key(round_id: ulid::Ulid) -> String {
    format!("end-round:{round_id}")
}
