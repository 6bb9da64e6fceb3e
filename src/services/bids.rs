//! Place / increase / cancel, each a single `TransactWriteItems` call that
//! couples the bid row, the fingerprint lock, the ledger reservation and the
//! transaction log. Condition failures are decoded back into domain errors
//! by item position; version races retry with backoff.

use std::time::Duration;

use aws_sdk_dynamodb::types::{
    AttributeValue, ConditionCheck, Delete, Put, TransactWriteItem, Update,
};
use rust_decimal::Decimal;
use serde_dynamo::{to_attribute_value, to_item};
use ulid::Ulid;

use crate::{
    constants::{
        AUCTION_TABLE, BID_LOCK_TABLE, BID_TABLE, ROUND_TABLE, VERSION_RETRY_ATTEMPTS,
        VERSION_RETRY_BASE_MS,
    },
    errors::{conditional_failures, is_transact_conflict, HandlerError},
    models::{
        auction::{Auction, AuctionStatus},
        bid::{
            Bid, BidAction, BidHistoryEntry, BidLock, BidStatus, LeaderboardEntry,
            LeaderboardResponse, MyPositionResponse, PlaceBidRequest,
        },
        events::ServerEvent,
        round::{Round, RoundStatus},
        transaction::TransactionType,
    },
    services::{ledger, rounds, store},
    state::AppState,
    utils::{min_increase, now_ms, round_money},
};

/// The authoritative ranking: highest amount first, earliest bid wins a tie.
/// Bid ids are creation-ordered, which keeps the order total when two bids
/// land on the same millisecond.
pub fn sort_ranked(bids: &mut [Bid]) {
    bids.sort_by(|a, b| {
        b.amount
            .cmp(&a.amount)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Bids competing in a round, ranked. Between rounds the contenders are the
/// carried-over bids; during a round the active ones.
pub async fn ranked_contenders(
    state: &AppState,
    auction_id: Ulid,
    round_number: u32,
) -> Result<Vec<Bid>, HandlerError> {
    let mut bids = store::list_round_bids(&state.db, auction_id, round_number, BidStatus::Active).await?;
    bids.extend(
        store::list_round_bids(&state.db, auction_id, round_number, BidStatus::CarriedOver).await?,
    );
    sort_ranked(&mut bids);
    Ok(bids)
}

pub async fn place_bid(
    state: &AppState,
    user_id: Ulid,
    req: &PlaceBidRequest,
) -> Result<Bid, HandlerError> {
    let amount = round_money(req.amount);
    if amount <= Decimal::ZERO {
        return Err(HandlerError::Validation("amount must be positive".into()));
    }

    let auction = store::get_auction(&state.db, req.auction_id).await?;
    if auction.status != AuctionStatus::Active || auction.current_round == 0 {
        return Err(HandlerError::AuctionNotActive(format!(
            "Auction is {}",
            auction.status
        )));
    }
    if amount < auction.min_bid {
        return Err(HandlerError::BidTooLow {
            minimum: auction.min_bid,
        });
    }
    let round = store::get_round(&state.db, auction.id, auction.current_round).await?;
    if round.status != RoundStatus::Active {
        return Err(HandlerError::RoundNotActive(format!(
            "Round {} is {}",
            round.round_number, round.status
        )));
    }

    for attempt in 1..=VERSION_RETRY_ATTEMPTS {
        let user = store::get_user(&state.db, user_id).await?;
        let now = now_ms();
        let bid = Bid {
            auction_id: auction.id,
            id: Ulid::new(),
            user_id,
            username: user.username.clone(),
            amount,
            original_amount: amount,
            created_in_round: round.round_number,
            current_round: round.round_number,
            status: BidStatus::Active,
            won_item_number: None,
            won_in_round: None,
            won_position: None,
            history: vec![BidHistoryEntry {
                action: BidAction::Created,
                amount,
                round: round.round_number,
                ts: now,
                prev_amount: None,
            }],
            created_at: now,
            version: 1,
        };

        let reserve = ledger::reserve(
            &user,
            amount,
            TransactionType::BidPlaced,
            auction.id,
            bid.id,
            format!("Bid placed on auction {}", auction.name),
        )?;

        // Item order matters for decoding condition failures below:
        // 0 auction check, 1 round check, 2 lock, 3 bid, 4 user, 5 log.
        let mut items = vec![
            auction_active_check(&auction)?,
            round_active_check(&round)?,
            lock_put(&bid)?,
            bid_put(&bid)?,
        ];
        items.extend(reserve.items);

        match state
            .db
            .transact_write_items()
            .set_transact_items(Some(items))
            .send()
            .await
        {
            Ok(_) => {
                state
                    .events
                    .publish_auction(
                        auction.id,
                        ServerEvent::BidPlaced {
                            auction_id: auction.id,
                            bid_id: bid.id,
                            user_id,
                            username: bid.username.clone(),
                            amount,
                            round_number: round.round_number,
                            ts: now,
                        },
                    )
                    .await;
                state
                    .events
                    .publish_auction(
                        auction.id,
                        ServerEvent::LeaderboardUpdated {
                            auction_id: auction.id,
                            round_number: round.round_number,
                            ts: now,
                        },
                    )
                    .await;
                if let Err(err) = rounds::maybe_extend(state, &auction, round.round_number).await {
                    tracing::warn!(auction_id = %auction.id, error = %err, "anti-snipe check failed");
                }
                return Ok(bid);
            }
            Err(err) => {
                let failed = conditional_failures(&err);
                if failed.contains(&0) {
                    return Err(HandlerError::AuctionNotActive(
                        "Auction is no longer accepting bids".into(),
                    ));
                }
                if failed.contains(&1) {
                    return Err(HandlerError::RoundNotActive(
                        "Round is no longer accepting bids".into(),
                    ));
                }
                if failed.contains(&2) {
                    return Err(HandlerError::Conflict(
                        "Already bidding in this auction".into(),
                    ));
                }
                if failed.contains(&4) || is_transact_conflict(&err) {
                    tokio::time::sleep(Duration::from_millis(
                        VERSION_RETRY_BASE_MS * attempt as u64,
                    ))
                    .await;
                    continue;
                }
                return Err(err.into());
            }
        }
    }
    Err(HandlerError::Transient(
        "balance is being updated concurrently, please retry".into(),
    ))
}

pub async fn increase_bid(
    state: &AppState,
    user_id: Ulid,
    bid_id: Ulid,
    new_amount: Decimal,
) -> Result<Bid, HandlerError> {
    let new_amount = round_money(new_amount);

    for attempt in 1..=VERSION_RETRY_ATTEMPTS {
        let bid = store::get_bid(&state.db, bid_id).await?;
        if bid.user_id != user_id {
            return Err(HandlerError::Forbidden("Bid belongs to another user".into()));
        }
        if bid.status != BidStatus::Active {
            return Err(HandlerError::Conflict(format!("Bid is {}", bid.status)));
        }
        let auction = store::get_auction(&state.db, bid.auction_id).await?;
        let minimum = min_increase(bid.amount, auction.min_bid_step);
        if new_amount < minimum {
            return Err(HandlerError::BidTooLow { minimum });
        }
        let round = store::get_round(&state.db, bid.auction_id, bid.current_round).await?;
        if round.status != RoundStatus::Active {
            return Err(HandlerError::RoundNotActive(format!(
                "Round {} is {}",
                round.round_number, round.status
            )));
        }
        let user = store::get_user(&state.db, user_id).await?;
        let delta = new_amount - bid.amount;
        let reserve = ledger::reserve(
            &user,
            delta,
            TransactionType::BidIncreased,
            auction.id,
            bid.id,
            format!("Bid increased on auction {}", auction.name),
        )?;

        let now = now_ms();
        let entry = BidHistoryEntry {
            action: BidAction::Increased,
            amount: new_amount,
            round: round.round_number,
            ts: now,
            prev_amount: Some(bid.amount),
        };

        // 0 round check, 1 bid, 2 user, 3 log.
        let mut items = vec![round_active_check(&round)?, increase_update(&bid, new_amount, &entry)?];
        items.extend(reserve.items);

        match state
            .db
            .transact_write_items()
            .set_transact_items(Some(items))
            .send()
            .await
        {
            Ok(_) => {
                let mut updated = bid;
                let previous = updated.amount;
                updated.amount = new_amount;
                updated.history.push(entry);
                updated.version += 1;
                state
                    .events
                    .publish_auction(
                        auction.id,
                        ServerEvent::BidIncreased {
                            auction_id: auction.id,
                            bid_id: updated.id,
                            user_id,
                            username: updated.username.clone(),
                            previous_amount: previous,
                            new_amount,
                            round_number: round.round_number,
                            ts: now,
                        },
                    )
                    .await;
                state
                    .events
                    .publish_auction(
                        auction.id,
                        ServerEvent::LeaderboardUpdated {
                            auction_id: auction.id,
                            round_number: round.round_number,
                            ts: now,
                        },
                    )
                    .await;
                if let Err(err) = rounds::maybe_extend(state, &auction, round.round_number).await {
                    tracing::warn!(auction_id = %auction.id, error = %err, "anti-snipe check failed");
                }
                return Ok(updated);
            }
            Err(err) => {
                let failed = conditional_failures(&err);
                if failed.contains(&0) {
                    return Err(HandlerError::RoundNotActive(
                        "Round is no longer accepting bids".into(),
                    ));
                }
                if failed.contains(&1) || failed.contains(&2) || is_transact_conflict(&err) {
                    tokio::time::sleep(Duration::from_millis(
                        VERSION_RETRY_BASE_MS * attempt as u64,
                    ))
                    .await;
                    continue;
                }
                return Err(err.into());
            }
        }
    }
    Err(HandlerError::Conflict(
        "Bid was modified concurrently, please retry".into(),
    ))
}

/// Cancellation is only open while the bid's round has not started.
pub async fn cancel_bid(state: &AppState, user_id: Ulid, bid_id: Ulid) -> Result<Bid, HandlerError> {
    for attempt in 1..=VERSION_RETRY_ATTEMPTS {
        let bid = store::get_bid(&state.db, bid_id).await?;
        if bid.user_id != user_id {
            return Err(HandlerError::Forbidden("Bid belongs to another user".into()));
        }
        if !matches!(bid.status, BidStatus::Active | BidStatus::CarriedOver) {
            return Err(HandlerError::Conflict(format!("Bid is {}", bid.status)));
        }
        let round = store::get_round(&state.db, bid.auction_id, bid.current_round).await?;
        if round.status != RoundStatus::Scheduled {
            return Err(HandlerError::Conflict(
                "Bids can no longer be cancelled once their round has started".into(),
            ));
        }
        let user = store::get_user(&state.db, user_id).await?;
        let release = ledger::release(
            &user,
            bid.amount,
            bid.auction_id,
            bid.id,
            "Bid cancelled before round start".into(),
        )?;

        let now = now_ms();
        let entry = BidHistoryEntry {
            action: BidAction::Refunded,
            amount: bid.amount,
            round: bid.current_round,
            ts: now,
            prev_amount: None,
        };

        // 0 round check, 1 bid, 2 lock, 3 user, 4 log.
        let mut items = vec![
            round_scheduled_check(&round)?,
            settle_update(&bid, BidStatus::Refunded, &entry)?,
            lock_delete(bid.auction_id, bid.user_id)?,
        ];
        items.extend(release.items);

        match state
            .db
            .transact_write_items()
            .set_transact_items(Some(items))
            .send()
            .await
        {
            Ok(_) => {
                let mut updated = bid;
                updated.status = BidStatus::Refunded;
                updated.history.push(entry);
                updated.version += 1;
                state
                    .events
                    .publish_user(
                        user_id,
                        ServerEvent::BidRefunded {
                            auction_id: updated.auction_id,
                            amount: updated.amount,
                        },
                    )
                    .await;
                return Ok(updated);
            }
            Err(err) => {
                let failed = conditional_failures(&err);
                if failed.contains(&0) {
                    return Err(HandlerError::Conflict(
                        "Bids can no longer be cancelled once their round has started".into(),
                    ));
                }
                if failed.contains(&1) || failed.contains(&3) || is_transact_conflict(&err) {
                    tokio::time::sleep(Duration::from_millis(
                        VERSION_RETRY_BASE_MS * attempt as u64,
                    ))
                    .await;
                    continue;
                }
                return Err(err.into());
            }
        }
    }
    Err(HandlerError::Conflict(
        "Bid was modified concurrently, please retry".into(),
    ))
}

pub async fn leaderboard(
    state: &AppState,
    auction_id: Ulid,
    round_number: u32,
    current_user: Option<Ulid>,
) -> Result<LeaderboardResponse, HandlerError> {
    let round = store::get_round(&state.db, auction_id, round_number).await?;
    let ranked = ranked_contenders(state, auction_id, round_number).await?;
    let entries = ranked
        .iter()
        .enumerate()
        .map(|(i, bid)| LeaderboardEntry {
            position: i as u32 + 1,
            user_id: bid.user_id,
            username: bid.username.clone(),
            amount: bid.amount,
            is_current_user: current_user == Some(bid.user_id),
        })
        .collect();
    Ok(LeaderboardResponse {
        round_number,
        cutoff_position: round.items_in_round,
        entries,
    })
}

pub async fn my_position(
    state: &AppState,
    auction_id: Ulid,
    user_id: Ulid,
) -> Result<MyPositionResponse, HandlerError> {
    let auction = store::get_auction(&state.db, auction_id).await?;
    if auction.current_round == 0 {
        return Err(HandlerError::NotFound("Bid"));
    }
    let round = store::get_round(&state.db, auction_id, auction.current_round).await?;
    let ranked = ranked_contenders(state, auction_id, auction.current_round).await?;
    let position = ranked
        .iter()
        .position(|bid| bid.user_id == user_id)
        .ok_or(HandlerError::NotFound("Bid"))? as u32
        + 1;
    Ok(MyPositionResponse {
        position,
        total_bids: ranked.len() as u32,
        is_winning: position <= round.items_in_round,
    })
}

fn auction_active_check(auction: &Auction) -> Result<TransactWriteItem, HandlerError> {
    Ok(TransactWriteItem::builder()
        .condition_check(
            ConditionCheck::builder()
                .table_name(AUCTION_TABLE)
                .key("id", AttributeValue::S(auction.id.to_string()))
                .condition_expression("#status = :active AND currentRound = :round")
                .expression_attribute_names("#status", "status")
                .expression_attribute_values(":active", AuctionStatus::Active.into())
                .expression_attribute_values(
                    ":round",
                    AttributeValue::N(auction.current_round.to_string()),
                )
                .build()?,
        )
        .build())
}

fn round_active_check(round: &Round) -> Result<TransactWriteItem, HandlerError> {
    round_status_check(round, RoundStatus::Active)
}

fn round_scheduled_check(round: &Round) -> Result<TransactWriteItem, HandlerError> {
    round_status_check(round, RoundStatus::Scheduled)
}

fn round_status_check(round: &Round, status: RoundStatus) -> Result<TransactWriteItem, HandlerError> {
    Ok(TransactWriteItem::builder()
        .condition_check(
            ConditionCheck::builder()
                .table_name(ROUND_TABLE)
                .key("auctionId", AttributeValue::S(round.auction_id.to_string()))
                .key("roundNumber", AttributeValue::N(round.round_number.to_string()))
                .condition_expression("#status = :status")
                .expression_attribute_names("#status", "status")
                .expression_attribute_values(":status", status.into())
                .build()?,
        )
        .build())
}

fn lock_put(bid: &Bid) -> Result<TransactWriteItem, HandlerError> {
    let lock = BidLock::new(bid.auction_id, bid.user_id, bid.id);
    Ok(TransactWriteItem::builder()
        .put(
            Put::builder()
                .table_name(BID_LOCK_TABLE)
                .set_item(Some(to_item(lock)?))
                .condition_expression("attribute_not_exists(fingerprint)")
                .build()?,
        )
        .build())
}

pub(crate) fn lock_delete(auction_id: Ulid, user_id: Ulid) -> Result<TransactWriteItem, HandlerError> {
    Ok(TransactWriteItem::builder()
        .delete(
            Delete::builder()
                .table_name(BID_LOCK_TABLE)
                .key(
                    "fingerprint",
                    AttributeValue::S(BidLock::fingerprint_of(auction_id, user_id)),
                )
                .build()?,
        )
        .build())
}

fn bid_put(bid: &Bid) -> Result<TransactWriteItem, HandlerError> {
    Ok(TransactWriteItem::builder()
        .put(
            Put::builder()
                .table_name(BID_TABLE)
                .set_item(Some(to_item(bid.clone())?))
                .condition_expression("attribute_not_exists(id)")
                .build()?,
        )
        .build())
}

fn increase_update(
    bid: &Bid,
    new_amount: Decimal,
    entry: &BidHistoryEntry,
) -> Result<TransactWriteItem, HandlerError> {
    Ok(TransactWriteItem::builder()
        .update(
            Update::builder()
                .table_name(BID_TABLE)
                .key("auctionId", AttributeValue::S(bid.auction_id.to_string()))
                .key("id", AttributeValue::S(bid.id.to_string()))
                .update_expression(
                    "SET amount = :amount, history = list_append(history, :entry), \
                     version = :newVersion",
                )
                .condition_expression("version = :version AND #status = :active")
                .expression_attribute_names("#status", "status")
                .expression_attribute_values(":amount", to_attribute_value(new_amount)?)
                .expression_attribute_values(":entry", to_attribute_value(vec![entry.clone()])?)
                .expression_attribute_values(
                    ":newVersion",
                    AttributeValue::N((bid.version + 1).to_string()),
                )
                .expression_attribute_values(":version", AttributeValue::N(bid.version.to_string()))
                .expression_attribute_values(":active", BidStatus::Active.into())
                .build()?,
        )
        .build())
}

/// Move a bid out of the active set: refund on cancel or terminal loss.
pub(crate) fn settle_update(
    bid: &Bid,
    status: BidStatus,
    entry: &BidHistoryEntry,
) -> Result<TransactWriteItem, HandlerError> {
    Ok(TransactWriteItem::builder()
        .update(
            Update::builder()
                .table_name(BID_TABLE)
                .key("auctionId", AttributeValue::S(bid.auction_id.to_string()))
                .key("id", AttributeValue::S(bid.id.to_string()))
                .update_expression(
                    "SET #status = :newStatus, history = list_append(history, :entry), \
                     version = :newVersion",
                )
                .condition_expression(
                    "version = :version AND (#status = :active OR #status = :carried)",
                )
                .expression_attribute_names("#status", "status")
                .expression_attribute_values(":newStatus", status.into())
                .expression_attribute_values(":entry", to_attribute_value(vec![entry.clone()])?)
                .expression_attribute_values(
                    ":newVersion",
                    AttributeValue::N((bid.version + 1).to_string()),
                )
                .expression_attribute_values(":version", AttributeValue::N(bid.version.to_string()))
                .expression_attribute_values(":active", BidStatus::Active.into())
                .expression_attribute_values(":carried", BidStatus::CarriedOver.into())
                .build()?,
        )
        .build())
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn bid(amount: Decimal, created_at: i64) -> Bid {
        Bid {
            auction_id: Ulid::nil(),
            id: Ulid::new(),
            user_id: Ulid::new(),
            username: "u".into(),
            amount,
            original_amount: amount,
            created_in_round: 1,
            current_round: 1,
            status: BidStatus::Active,
            won_item_number: None,
            won_in_round: None,
            won_position: None,
            history: Vec::new(),
            created_at,
            version: 1,
        }
    }

    #[test]
    fn ranking_is_amount_desc_then_created_asc() {
        let mut bids = vec![bid(dec!(100), 30), bid(dec!(500), 20), bid(dec!(500), 10)];
        let earliest_high = bids[2].id;
        sort_ranked(&mut bids);
        assert_eq!(bids[0].id, earliest_high);
        assert_eq!(bids[0].amount, dec!(500));
        assert_eq!(bids[1].amount, dec!(500));
        assert_eq!(bids[2].amount, dec!(100));
    }

    #[test]
    fn equal_timestamp_ties_break_by_bid_id() {
        let mut bids = vec![bid(dec!(500), 10), bid(dec!(500), 10)];
        let first_created = bids[0].id.min(bids[1].id);
        sort_ranked(&mut bids);
        assert_eq!(bids[0].id, first_created);
    }

    #[test]
    fn increase_step_minimums() {
        // 100 at a 5% step: 104 is too low, 105 is the exact minimum.
        let minimum = min_increase(dec!(100), 5);
        assert!(dec!(104) < minimum);
        assert_eq!(minimum, dec!(105.00));
    }

    #[test]
    fn same_user_same_auction_contend_on_one_lock() {
        let auction = Ulid::new();
        let user = Ulid::new();
        // Two concurrent placements write the same fingerprint; the second
        // put fails its attribute_not_exists condition.
        assert_eq!(
            BidLock::fingerprint_of(auction, user),
            BidLock::fingerprint_of(auction, user)
        );
        assert_ne!(
            BidLock::fingerprint_of(auction, user),
            BidLock::fingerprint_of(auction, Ulid::new())
        );
    }
}
