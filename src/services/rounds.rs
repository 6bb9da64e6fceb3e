//! Round lifecycle: open, anti-snipe extension, completion. Timer callbacks
//! and the sweeper both land here, so every transition tolerates duplicate
//! delivery: the open is a status CAS, the extension is a compare-and-set on
//! `(status, extensionsCount, actualEndTime)`, and completion settles each
//! bid under its own condition with `winnersProcessed` committing last.

use std::{sync::Arc, time::Duration};

use aws_sdk_dynamodb::types::{AttributeValue, Put, TransactWriteItem, Update};
use serde_dynamo::{to_attribute_value, to_item};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use ulid::Ulid;

use crate::{
    constants::{
        end_round_key, BID_TABLE, ROUND_TABLE, VERSION_RETRY_ATTEMPTS, VERSION_RETRY_BASE_MS,
        WON_ITEM_TABLE,
    },
    errors::{conditional_failures, is_conditional_check_failed, is_transact_conflict, HandlerError},
    models::{
        auction::{Auction, AuctionStatus},
        bid::{Bid, BidAction, BidHistoryEntry, BidStatus},
        events::ServerEvent,
        round::RoundStatus,
        won_item::WonItem,
    },
    services::{
        auctions,
        bids::{lock_delete, settle_update, sort_ranked},
        ledger,
        scheduler::TimerPayload,
        store,
    },
    state::AppState,
    utils::now_ms,
};

/// Items allocated per round; the terminal round takes the remainder.
pub fn plan_round_items(total_items: u32, items_per_round: u32) -> Vec<u32> {
    let full_rounds = total_items / items_per_round;
    let remainder = total_items % items_per_round;
    let mut plan = vec![items_per_round; full_rounds as usize];
    if remainder > 0 {
        plan.push(remainder);
    }
    plan
}

/// One anti-snipe check: the new end time, or `None` when the bid landed
/// outside the window, the round is over, or the extension cap is reached.
pub fn extension_decision(
    now: i64,
    actual_end_time: i64,
    window_ms: i64,
    extension_ms: i64,
    extensions_count: u32,
    max_extensions: u32,
) -> Option<i64> {
    let remaining = actual_end_time - now;
    if remaining <= 0 || remaining > window_ms {
        return None;
    }
    if extensions_count >= max_extensions {
        return None;
    }
    Some(actual_end_time + extension_ms)
}

#[derive(Debug, Clone)]
pub struct WinnerAssignment {
    pub bid: Bid,
    pub item_number: u32,
    pub position: u32,
}

/// Split the ranked contenders at the round cutoff and number the winners'
/// items. Deterministic given the committed bid set.
pub fn select_winners(
    ranked: Vec<Bid>,
    items_in_round: u32,
    items_per_round: u32,
    round_number: u32,
) -> (Vec<WinnerAssignment>, Vec<Bid>) {
    let winners_count = (items_in_round as usize).min(ranked.len());
    let start_item = (round_number - 1) * items_per_round + 1;
    let mut iter = ranked.into_iter();
    let winners = iter
        .by_ref()
        .take(winners_count)
        .enumerate()
        .map(|(i, bid)| WinnerAssignment {
            bid,
            item_number: start_item + i as u32,
            position: i as u32 + 1,
        })
        .collect();
    (winners, iter.collect())
}

/// Consume fired timer payloads and run the matching transition. Processes
/// one callback at a time and finishes the in-flight one before honoring
/// shutdown.
pub fn spawn_dispatcher(
    state: Arc<AppState>,
    mut fire_rx: mpsc::UnboundedReceiver<TimerPayload>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                payload = fire_rx.recv() => match payload {
                    Some(TimerPayload::StartRound { auction_id, round_number }) => {
                        if let Err(err) = start_round(&state, auction_id, round_number).await {
                            tracing::error!(%auction_id, round_number, error = %err, "start-round callback failed");
                        }
                    }
                    Some(TimerPayload::EndRound { auction_id, round_number }) => {
                        if let Err(err) = complete_round(&state, auction_id, round_number).await {
                            tracing::error!(%auction_id, round_number, error = %err, "end-round callback failed");
                        }
                    }
                    None => break,
                },
                _ = shutdown.changed() => break,
            }
        }
        tracing::info!("round dispatcher stopped");
    })
}

/// Open a scheduled round. Duplicate deliveries lose the status CAS and
/// return without effect.
pub async fn start_round(
    state: &AppState,
    auction_id: Ulid,
    round_number: u32,
) -> Result<(), HandlerError> {
    let round = store::get_round(&state.db, auction_id, round_number).await?;
    if round.status != RoundStatus::Scheduled {
        return Ok(());
    }
    let auction = store::get_auction(&state.db, auction_id).await?;
    if !matches!(
        auction.status,
        AuctionStatus::Scheduled | AuctionStatus::Active
    ) {
        tracing::info!(%auction_id, round_number, status = %auction.status, "skipping round start");
        return Ok(());
    }

    let now = now_ms();
    let actual_end = now + round.configured_duration_ms();

    let result = state
        .db
        .update_item()
        .table_name(ROUND_TABLE)
        .key("auctionId", AttributeValue::S(auction_id.to_string()))
        .key("roundNumber", AttributeValue::N(round_number.to_string()))
        .update_expression(
            "SET #status = :active, actualStartTime = :start, actualEndTime = :end, \
             version = version + :one",
        )
        .condition_expression("#status = :scheduled")
        .expression_attribute_names("#status", "status")
        .expression_attribute_values(":active", RoundStatus::Active.into())
        .expression_attribute_values(":scheduled", RoundStatus::Scheduled.into())
        .expression_attribute_values(":start", AttributeValue::N(now.to_string()))
        .expression_attribute_values(":end", AttributeValue::N(actual_end.to_string()))
        .expression_attribute_values(":one", AttributeValue::N("1".to_string()))
        .send()
        .await;
    match result {
        Ok(_) => {}
        Err(err) if is_conditional_check_failed(&err) => return Ok(()),
        Err(err) => return Err(err.into()),
    }

    // Wake the bids demoted out of the previous round. Their reservations
    // persist unchanged.
    if round_number > 1 {
        let carried =
            store::list_round_bids(&state.db, auction_id, round_number, BidStatus::CarriedOver)
                .await?;
        for bid in carried {
            activate_carried(state, &bid, round_number).await?;
        }
    }

    let result = state
        .db
        .update_item()
        .table_name(crate::constants::AUCTION_TABLE)
        .key("id", AttributeValue::S(auction_id.to_string()))
        .update_expression("SET currentRound = :round, #status = :active, version = version + :one")
        .condition_expression("#status IN (:scheduled, :active)")
        .expression_attribute_names("#status", "status")
        .expression_attribute_values(":round", AttributeValue::N(round_number.to_string()))
        .expression_attribute_values(":active", AuctionStatus::Active.into())
        .expression_attribute_values(":scheduled", AuctionStatus::Scheduled.into())
        .expression_attribute_values(":one", AttributeValue::N("1".to_string()))
        .send()
        .await;
    if let Err(err) = result {
        if is_conditional_check_failed(&err) {
            tracing::warn!(%auction_id, round_number, "auction left the startable states mid-open");
        } else {
            return Err(err.into());
        }
    }

    if round_number == 1 {
        state
            .events
            .publish_auction(
                auction_id,
                ServerEvent::AuctionStarted {
                    auction_id,
                    name: auction.name.clone(),
                    current_round: 1,
                    start_time: auction.start_time,
                },
            )
            .await;
    }
    state
        .events
        .publish_auction(
            auction_id,
            ServerEvent::RoundStarted {
                auction_id,
                round_number,
                items_in_round: round.items_in_round,
                scheduled_end_time: actual_end,
            },
        )
        .await;

    state
        .scheduler
        .schedule(
            &end_round_key(round.id),
            actual_end,
            TimerPayload::EndRound {
                auction_id,
                round_number,
            },
        )
        .await?;
    Ok(())
}

async fn activate_carried(
    state: &AppState,
    bid: &Bid,
    round_number: u32,
) -> Result<(), HandlerError> {
    let entry = BidHistoryEntry {
        action: BidAction::CarriedOver,
        amount: bid.amount,
        round: round_number,
        ts: now_ms(),
        prev_amount: None,
    };
    let result = state
        .db
        .update_item()
        .table_name(BID_TABLE)
        .key("auctionId", AttributeValue::S(bid.auction_id.to_string()))
        .key("id", AttributeValue::S(bid.id.to_string()))
        .update_expression(
            "SET #status = :active, history = list_append(history, :entry), \
             version = version + :one",
        )
        .condition_expression("#status = :carried")
        .expression_attribute_names("#status", "status")
        .expression_attribute_values(":active", BidStatus::Active.into())
        .expression_attribute_values(":carried", BidStatus::CarriedOver.into())
        .expression_attribute_values(":entry", to_attribute_value(vec![entry])?)
        .expression_attribute_values(":one", AttributeValue::N("1".to_string()))
        .send()
        .await;
    match result {
        Ok(_) => Ok(()),
        // Another worker of the same start already flipped it.
        Err(err) if is_conditional_check_failed(&err) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

const EXTEND_CAS_ATTEMPTS: u32 = 4;

/// Anti-snipe check after each accepted bid. Read-then-CAS: losers reload
/// and recompute, and usually find the winner's extension already covers
/// them.
pub async fn maybe_extend(
    state: &AppState,
    auction: &Auction,
    round_number: u32,
) -> Result<(), HandlerError> {
    let window_ms = auction.anti_snipe_window as i64 * 1000;
    let extension_ms = auction.anti_snipe_extension as i64 * 1000;

    for _ in 0..EXTEND_CAS_ATTEMPTS {
        let round = store::get_round(&state.db, auction.id, round_number).await?;
        if round.status != RoundStatus::Active {
            return Ok(());
        }
        let Some(end) = round.actual_end_time else {
            return Ok(());
        };
        let now = now_ms();
        let Some(new_end) = extension_decision(
            now,
            end,
            window_ms,
            extension_ms,
            round.extensions_count,
            auction.max_extensions,
        ) else {
            return Ok(());
        };

        let result = state
            .db
            .update_item()
            .table_name(ROUND_TABLE)
            .key("auctionId", AttributeValue::S(auction.id.to_string()))
            .key("roundNumber", AttributeValue::N(round_number.to_string()))
            .update_expression(
                "SET actualEndTime = :newEnd, extensionsCount = :newCount, \
                 lastExtensionAt = :now, version = version + :one",
            )
            .condition_expression("#status = :active AND extensionsCount = :count AND actualEndTime = :end")
            .expression_attribute_names("#status", "status")
            .expression_attribute_values(":newEnd", AttributeValue::N(new_end.to_string()))
            .expression_attribute_values(
                ":newCount",
                AttributeValue::N((round.extensions_count + 1).to_string()),
            )
            .expression_attribute_values(":now", AttributeValue::N(now.to_string()))
            .expression_attribute_values(":active", RoundStatus::Active.into())
            .expression_attribute_values(
                ":count",
                AttributeValue::N(round.extensions_count.to_string()),
            )
            .expression_attribute_values(":end", AttributeValue::N(end.to_string()))
            .expression_attribute_values(":one", AttributeValue::N("1".to_string()))
            .send()
            .await;
        match result {
            Ok(_) => {
                state
                    .events
                    .publish_auction(
                        auction.id,
                        ServerEvent::RoundExtended {
                            auction_id: auction.id,
                            round_number,
                            new_end_time: new_end,
                            extensions_count: round.extensions_count + 1,
                        },
                    )
                    .await;
                state
                    .scheduler
                    .reschedule(&end_round_key(round.id), new_end)
                    .await?;
                return Ok(());
            }
            Err(err) if is_conditional_check_failed(&err) => continue,
            Err(err) => return Err(err.into()),
        }
    }
    // Lost every CAS; the winner's extension is already in place.
    Ok(())
}

/// Close an active round: freeze the bid set, settle winners and losers,
/// then mark `winnersProcessed`. Idempotent against duplicate timers and
/// safe to re-run after a partial failure.
pub async fn complete_round(
    state: &AppState,
    auction_id: Ulid,
    round_number: u32,
) -> Result<(), HandlerError> {
    let mut round = store::get_round(&state.db, auction_id, round_number).await?;
    if round.winners_processed {
        return Ok(());
    }
    if round.status == RoundStatus::Scheduled {
        return Err(HandlerError::RoundNotActive(
            "Round has not started".into(),
        ));
    }
    let auction = store::get_auction(&state.db, auction_id).await?;

    if round.status == RoundStatus::Active {
        let now = now_ms();
        let end = round.actual_end_time.unwrap_or(now);
        if end > now {
            // An extension moved the deadline; the rescheduled timer comes
            // back for us.
            return Ok(());
        }
        // Freeze the bid set. Place and increase both condition on the
        // round being active, so nothing joins after this flip.
        let result = state
            .db
            .update_item()
            .table_name(ROUND_TABLE)
            .key("auctionId", AttributeValue::S(auction_id.to_string()))
            .key("roundNumber", AttributeValue::N(round_number.to_string()))
            .update_expression(
                "SET #status = :completed, actualEndTime = :end, version = version + :one",
            )
            .condition_expression("#status = :active AND actualEndTime = :currentEnd")
            .expression_attribute_names("#status", "status")
            .expression_attribute_values(":completed", RoundStatus::Completed.into())
            .expression_attribute_values(":active", RoundStatus::Active.into())
            .expression_attribute_values(":end", AttributeValue::N(end.min(now).to_string()))
            .expression_attribute_values(":currentEnd", AttributeValue::N(end.to_string()))
            .expression_attribute_values(":one", AttributeValue::N("1".to_string()))
            .send()
            .await;
        match result {
            Ok(_) => {}
            Err(err) if is_conditional_check_failed(&err) => {
                round = store::get_round(&state.db, auction_id, round_number).await?;
                if round.winners_processed {
                    return Ok(());
                }
                if round.status == RoundStatus::Active {
                    // Lost to an extension; not due anymore.
                    return Ok(());
                }
                // Lost to another completion worker; settle jointly below.
            }
            Err(err) => return Err(err.into()),
        }
    }

    // Rank the frozen set. Already-settled winners stay in the ranking so a
    // recovery pass assigns the same item numbers to the remaining bids.
    let mut contenders =
        store::list_round_bids(&state.db, auction_id, round_number, BidStatus::Active).await?;
    contenders
        .extend(store::list_round_bids(&state.db, auction_id, round_number, BidStatus::Won).await?);
    sort_ranked(&mut contenders);
    let (winners, losers) = select_winners(
        contenders,
        round.items_in_round,
        auction.items_per_round,
        round_number,
    );
    let winners_count = winners.len() as u32;

    let mut won_events = Vec::new();
    for assignment in &winners {
        if let Some(event) = settle_winner(state, &auction, round_number, assignment).await? {
            won_events.push((assignment.bid.user_id, event));
        }
    }
    for bid in &losers {
        if round_number < auction.total_rounds {
            carry_over(state, bid, round_number).await?;
        } else {
            refund_bid(state, bid, "Refund for losing bid").await?;
        }
    }

    // The idempotence guard commits last: a crash before this point re-runs
    // the whole pass, and every per-bid condition above makes that a no-op.
    state
        .db
        .update_item()
        .table_name(ROUND_TABLE)
        .key("auctionId", AttributeValue::S(auction_id.to_string()))
        .key("roundNumber", AttributeValue::N(round_number.to_string()))
        .update_expression("SET winnersProcessed = :yes, version = version + :one")
        .expression_attribute_values(":yes", AttributeValue::Bool(true))
        .expression_attribute_values(":one", AttributeValue::N("1".to_string()))
        .send()
        .await?;

    state
        .events
        .publish_auction(
            auction_id,
            ServerEvent::RoundCompleted {
                auction_id,
                round_number,
                winners_count,
            },
        )
        .await;
    for (user_id, event) in won_events {
        state.events.publish_user(user_id, event).await;
    }

    auctions::after_round_completed(state, &auction, round_number).await
}

/// Settle one winner in its own transaction: bid row, won item, lock,
/// balance and log move together. Returns the `user:won` event when this
/// call did the settling, `None` when a previous pass already had.
async fn settle_winner(
    state: &AppState,
    auction: &Auction,
    round_number: u32,
    assignment: &WinnerAssignment,
) -> Result<Option<ServerEvent>, HandlerError> {
    for attempt in 1..=VERSION_RETRY_ATTEMPTS {
        let bid = store::get_bid(&state.db, assignment.bid.id).await?;
        if bid.status == BidStatus::Won {
            return Ok(None);
        }
        if bid.status != BidStatus::Active {
            return Err(HandlerError::Internal(format!(
                "bid {} is {} during settlement",
                bid.id, bid.status
            )));
        }
        let user = store::get_user(&state.db, bid.user_id).await?;
        let commit = ledger::commit_win(&user, bid.amount, auction.id, bid.id)?;
        let now = now_ms();
        let won_item = WonItem {
            bid_id: bid.id,
            auction_id: auction.id,
            user_id: bid.user_id,
            item_number: assignment.item_number,
            round_number,
            position_in_round: assignment.position,
            winning_bid_amount: bid.amount,
            created_at: now,
        };
        let entry = BidHistoryEntry {
            action: BidAction::Won,
            amount: bid.amount,
            round: round_number,
            ts: now,
            prev_amount: None,
        };

        // 0 bid, 1 won item, 2 lock, 3 user, 4 log.
        let mut items = vec![
            won_update(&bid, assignment, &entry)?,
            won_item_put(&won_item)?,
            lock_delete(bid.auction_id, bid.user_id)?,
        ];
        items.extend(commit.items);

        match state
            .db
            .transact_write_items()
            .set_transact_items(Some(items))
            .send()
            .await
        {
            Ok(_) => {
                return Ok(Some(ServerEvent::UserWon {
                    auction_id: auction.id,
                    item_number: assignment.item_number,
                    amount: bid.amount,
                    round_number,
                }))
            }
            Err(err) => {
                let failed = conditional_failures(&err);
                if failed.contains(&0) || failed.contains(&1) {
                    // Another completion worker settled this bid.
                    return Ok(None);
                }
                if failed.contains(&3) || is_transact_conflict(&err) {
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
        "winner settlement lost repeated balance races".into(),
    ))
}

/// Demote a losing bid into the next round. The reservation stays put.
async fn carry_over(state: &AppState, bid: &Bid, round_number: u32) -> Result<(), HandlerError> {
    let entry = BidHistoryEntry {
        action: BidAction::CarriedOver,
        amount: bid.amount,
        round: round_number + 1,
        ts: now_ms(),
        prev_amount: None,
    };
    let result = state
        .db
        .update_item()
        .table_name(BID_TABLE)
        .key("auctionId", AttributeValue::S(bid.auction_id.to_string()))
        .key("id", AttributeValue::S(bid.id.to_string()))
        .update_expression(
            "SET #status = :carried, currentRound = :next, \
             history = list_append(history, :entry), version = version + :one",
        )
        .condition_expression("#status = :active AND version = :version")
        .expression_attribute_names("#status", "status")
        .expression_attribute_values(":carried", BidStatus::CarriedOver.into())
        .expression_attribute_values(":active", BidStatus::Active.into())
        .expression_attribute_values(":next", AttributeValue::N((round_number + 1).to_string()))
        .expression_attribute_values(":entry", to_attribute_value(vec![entry])?)
        .expression_attribute_values(":version", AttributeValue::N(bid.version.to_string()))
        .expression_attribute_values(":one", AttributeValue::N("1".to_string()))
        .send()
        .await;
    match result {
        Ok(_) => Ok(()),
        Err(err) if is_conditional_check_failed(&err) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Release a bid's reservation and mark it refunded. Shared by terminal-round
/// losses and auction cancellation; duplicate calls no-op on the bid's
/// status condition.
pub(crate) async fn refund_bid(
    state: &AppState,
    bid: &Bid,
    description: &str,
) -> Result<(), HandlerError> {
    for attempt in 1..=VERSION_RETRY_ATTEMPTS {
        let fresh = store::get_bid(&state.db, bid.id).await?;
        if !matches!(fresh.status, BidStatus::Active | BidStatus::CarriedOver) {
            return Ok(());
        }
        let user = store::get_user(&state.db, fresh.user_id).await?;
        let release = ledger::release(
            &user,
            fresh.amount,
            fresh.auction_id,
            fresh.id,
            description.to_string(),
        )?;
        let entry = BidHistoryEntry {
            action: BidAction::Refunded,
            amount: fresh.amount,
            round: fresh.current_round,
            ts: now_ms(),
            prev_amount: None,
        };

        // 0 bid, 1 lock, 2 user, 3 log.
        let mut items = vec![
            settle_update(&fresh, BidStatus::Refunded, &entry)?,
            lock_delete(fresh.auction_id, fresh.user_id)?,
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
                state
                    .events
                    .publish_user(
                        fresh.user_id,
                        ServerEvent::BidRefunded {
                            auction_id: fresh.auction_id,
                            amount: fresh.amount,
                        },
                    )
                    .await;
                return Ok(());
            }
            Err(err) => {
                let failed = conditional_failures(&err);
                if failed.contains(&0) || failed.contains(&2) || is_transact_conflict(&err) {
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
        "refund lost repeated balance races".into(),
    ))
}

fn won_update(
    bid: &Bid,
    assignment: &WinnerAssignment,
    entry: &BidHistoryEntry,
) -> Result<TransactWriteItem, HandlerError> {
    Ok(TransactWriteItem::builder()
        .update(
            Update::builder()
                .table_name(BID_TABLE)
                .key("auctionId", AttributeValue::S(bid.auction_id.to_string()))
                .key("id", AttributeValue::S(bid.id.to_string()))
                .update_expression(
                    "SET #status = :won, wonItemNumber = :item, wonInRound = :round, \
                     wonPosition = :position, history = list_append(history, :entry), \
                     version = :newVersion",
                )
                .condition_expression("version = :version AND #status = :active")
                .expression_attribute_names("#status", "status")
                .expression_attribute_values(":won", BidStatus::Won.into())
                .expression_attribute_values(":active", BidStatus::Active.into())
                .expression_attribute_values(
                    ":item",
                    AttributeValue::N(assignment.item_number.to_string()),
                )
                .expression_attribute_values(":round", AttributeValue::N(entry.round.to_string()))
                .expression_attribute_values(
                    ":position",
                    AttributeValue::N(assignment.position.to_string()),
                )
                .expression_attribute_values(":entry", to_attribute_value(vec![entry.clone()])?)
                .expression_attribute_values(
                    ":newVersion",
                    AttributeValue::N((bid.version + 1).to_string()),
                )
                .expression_attribute_values(":version", AttributeValue::N(bid.version.to_string()))
                .build()?,
        )
        .build())
}

fn won_item_put(won_item: &WonItem) -> Result<TransactWriteItem, HandlerError> {
    Ok(TransactWriteItem::builder()
        .put(
            Put::builder()
                .table_name(WON_ITEM_TABLE)
                .set_item(Some(to_item(won_item.clone())?))
                .condition_expression("attribute_not_exists(bidId)")
                .build()?,
        )
        .build())
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn round_plan_even_split() {
        assert_eq!(plan_round_items(200, 50), vec![50, 50, 50, 50]);
        assert_eq!(plan_round_items(1, 1000), vec![1]);
    }

    #[test]
    fn round_plan_remainder_goes_last() {
        assert_eq!(plan_round_items(10, 3), vec![3, 3, 3, 1]);
        assert_eq!(plan_round_items(7, 7), vec![7]);
    }

    // Window 60s, extension 60s, cap 3, end at T.
    #[test]
    fn extension_sequence_respects_the_cap() {
        let t = 1_000_000i64;
        let (window, extension) = (60_000i64, 60_000i64);

        // Bid 30s before the end lands inside the window.
        let end1 = extension_decision(t - 30_000, t, window, extension, 0, 3).unwrap();
        assert_eq!(end1, t + 60_000);
        let end2 = extension_decision(end1 - 55_000, end1, window, extension, 1, 3).unwrap();
        assert_eq!(end2, end1 + 60_000);
        let end3 = extension_decision(end2 - 50_000, end2, window, extension, 2, 3).unwrap();
        assert_eq!(end3, end2 + 60_000);
        // Cap reached: a fourth in-window bid does not extend.
        assert_eq!(
            extension_decision(end3 - 10_000, end3, window, extension, 3, 3),
            None
        );
    }

    #[test]
    fn no_extension_outside_window_or_after_end() {
        let t = 1_000_000i64;
        // 90s early is outside a 60s window.
        assert_eq!(extension_decision(t - 90_000, t, 60_000, 60_000, 0, 3), None);
        // The round is already over.
        assert_eq!(extension_decision(t + 1, t, 60_000, 60_000, 0, 3), None);
        // Cap of zero disables extension entirely.
        assert_eq!(extension_decision(t - 30_000, t, 60_000, 60_000, 0, 0), None);
    }

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
    fn winners_take_the_round_cutoff_and_numbered_items() {
        // 100 equal bids, 50 items, round 1 of a 50-per-round auction.
        let mut bids: Vec<Bid> = (0..100).map(|i| bid(dec!(100), i as i64)).collect();
        sort_ranked(&mut bids);
        let (winners, losers) = select_winners(bids, 50, 50, 1);
        assert_eq!(winners.len(), 50);
        assert_eq!(losers.len(), 50);
        assert_eq!(winners.first().unwrap().item_number, 1);
        assert_eq!(winners.last().unwrap().item_number, 50);
        assert_eq!(winners.last().unwrap().position, 50);
        // Equal amounts: earliest bids win.
        assert!(winners.iter().all(|w| w.bid.created_at < 50));
        assert!(losers.iter().all(|l| l.created_at >= 50));
    }

    #[test]
    fn later_rounds_continue_the_item_numbering() {
        let mut bids: Vec<Bid> = (0..50).map(|i| bid(dec!(100), i as i64)).collect();
        sort_ranked(&mut bids);
        let (round2, _) = select_winners(bids.clone(), 50, 50, 2);
        assert_eq!(round2.first().unwrap().item_number, 51);
        assert_eq!(round2.last().unwrap().item_number, 100);
        let (round4, _) = select_winners(bids, 50, 50, 4);
        assert_eq!(round4.last().unwrap().item_number, 200);
    }

    #[test]
    fn short_field_awards_fewer_items() {
        let mut bids = vec![bid(dec!(300), 1), bid(dec!(200), 2)];
        sort_ranked(&mut bids);
        let (winners, losers) = select_winners(bids, 50, 50, 1);
        assert_eq!(winners.len(), 2);
        assert!(losers.is_empty());
    }

    #[test]
    fn one_item_tie_breaks_to_the_earlier_bid() {
        let early = bid(dec!(500), 10);
        let late = bid(dec!(500), 20);
        let early_id = early.id;
        let mut bids = vec![late, early];
        sort_ranked(&mut bids);
        let (winners, losers) = select_winners(bids, 1, 1, 1);
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].bid.id, early_id);
        assert_eq!(losers.len(), 1);
    }
}
