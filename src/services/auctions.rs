//! Auction lifecycle: creation precomputes every round, transitions chain
//! through the scheduler, completion and cancellation reconcile the bids.

use std::cmp;

use aws_sdk_dynamodb::types::{AttributeValue, Put, TransactWriteItem};
use serde_dynamo::{from_items, to_item};
use ulid::Ulid;

use crate::{
    constants::{end_round_key, start_round_key, AUCTION_TABLE, ROUND_TABLE},
    errors::{is_conditional_check_failed, HandlerError},
    models::{
        auction::{
            Auction, AuctionDetail, AuctionStats, AuctionStatus, CreateAuctionRequest,
            ListAuctionsQuery,
        },
        bid::BidStatus,
        events::ServerEvent,
        round::{Round, RoundStatus},
    },
    services::{
        rounds::{self, plan_round_items},
        scheduler::TimerPayload,
        store,
    },
    state::AppState,
    utils::{now_ms, round_money},
};

/// One store transaction holds at most 100 items; round puts are chunked
/// and the auction commits last as the visibility anchor.
const PUT_CHUNK: usize = 100;

pub async fn create_auction(
    state: &AppState,
    req: &CreateAuctionRequest,
) -> Result<AuctionDetail, HandlerError> {
    req.validate(&state.config)?;

    let now = now_ms();
    let plan = plan_round_items(req.total_items, req.items_per_round);
    let auction = Auction {
        id: Ulid::new(),
        name: req.name.trim().to_string(),
        total_items: req.total_items,
        items_per_round: req.items_per_round,
        total_rounds: plan.len() as u32,
        start_time: req.start_time,
        round_duration: req.round_duration,
        anti_snipe_window: req
            .anti_snipe_window
            .unwrap_or(state.config.default_anti_snipe_window),
        anti_snipe_extension: req
            .anti_snipe_extension
            .unwrap_or(state.config.default_anti_snipe_extension),
        max_extensions: req
            .max_extensions
            .unwrap_or(state.config.default_max_extensions),
        min_bid: round_money(req.min_bid),
        min_bid_step: req.min_bid_step.unwrap_or(5),
        currency: req.currency.clone().unwrap_or_else(|| "CREDITS".to_string()),
        status: AuctionStatus::Scheduled,
        current_round: 0,
        created_at: now,
        version: 1,
    };

    let duration_ms = auction.round_duration as i64 * 1000;
    let rounds: Vec<Round> = plan
        .iter()
        .enumerate()
        .map(|(k, items_in_round)| {
            let scheduled_start = auction.start_time + k as i64 * duration_ms;
            Round {
                id: Ulid::new(),
                auction_id: auction.id,
                round_number: k as u32 + 1,
                items_in_round: *items_in_round,
                scheduled_start_time: scheduled_start,
                scheduled_end_time: scheduled_start + duration_ms,
                actual_start_time: None,
                actual_end_time: None,
                extensions_count: 0,
                last_extension_at: None,
                status: RoundStatus::Scheduled,
                winners_processed: false,
                version: 1,
            }
        })
        .collect();

    // Rounds first, the auction last: an auction is never readable without
    // its full round set.
    for chunk in rounds.chunks(PUT_CHUNK) {
        let items = chunk
            .iter()
            .map(round_put)
            .collect::<Result<Vec<_>, _>>()?;
        state
            .db
            .transact_write_items()
            .set_transact_items(Some(items))
            .send()
            .await?;
    }
    state
        .db
        .put_item()
        .table_name(AUCTION_TABLE)
        .set_item(Some(to_item(auction.clone())?))
        .condition_expression("attribute_not_exists(id)")
        .send()
        .await?;

    // Advisory timers; the authoritative chaining happens at each round's
    // completion.
    for round in &rounds {
        state
            .scheduler
            .schedule(
                &start_round_key(round.id),
                round.scheduled_start_time,
                TimerPayload::StartRound {
                    auction_id: auction.id,
                    round_number: round.round_number,
                },
            )
            .await?;
    }

    tracing::info!(auction_id = %auction.id, rounds = rounds.len(), "auction created");
    Ok(AuctionDetail {
        auction,
        rounds,
        stats: AuctionStats::default(),
    })
}

fn round_put(round: &Round) -> Result<TransactWriteItem, HandlerError> {
    Ok(TransactWriteItem::builder()
        .put(
            Put::builder()
                .table_name(ROUND_TABLE)
                .set_item(Some(to_item(round.clone())?))
                .condition_expression("attribute_not_exists(auctionId)")
                .build()?,
        )
        .build())
}

pub async fn list_auctions(
    state: &AppState,
    query: &ListAuctionsQuery,
) -> Result<(Vec<Auction>, u64), HandlerError> {
    let mut scan = state.db.scan().table_name(AUCTION_TABLE);
    if let Some(status) = query.status {
        scan = scan
            .filter_expression("#status = :status")
            .expression_attribute_names("#status", "status")
            .expression_attribute_values(":status", status.into());
    }
    let resp = scan.send().await?;
    let mut auctions: Vec<Auction> = from_items(resp.items().to_vec())?;
    auctions.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let total = auctions.len() as u64;
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let start = (page - 1) as usize * limit as usize;
    let entries = auctions
        .into_iter()
        .skip(start)
        .take(limit as usize)
        .collect();
    Ok((entries, total))
}

pub async fn get_detail(state: &AppState, auction_id: Ulid) -> Result<AuctionDetail, HandlerError> {
    let auction = store::get_auction(&state.db, auction_id).await?;
    let rounds = store::list_rounds(&state.db, auction_id).await?;
    let bids = store::list_auction_bids(&state.db, auction_id).await?;
    let won_items = store::list_won_items(&state.db, auction_id).await?;
    let stats = AuctionStats {
        total_bids: bids.len() as u64,
        active_bids: bids
            .iter()
            .filter(|b| matches!(b.status, BidStatus::Active | BidStatus::CarriedOver))
            .count() as u64,
        items_awarded: won_items.len() as u64,
    };
    Ok(AuctionDetail {
        auction,
        rounds,
        stats,
    })
}

/// The current active round, or NotFound.
pub async fn current_round(state: &AppState, auction_id: Ulid) -> Result<Round, HandlerError> {
    let auction = store::get_auction(&state.db, auction_id).await?;
    if auction.current_round == 0 {
        return Err(HandlerError::NotFound("Round"));
    }
    let round = store::get_round(&state.db, auction_id, auction.current_round).await?;
    if round.status != RoundStatus::Active {
        return Err(HandlerError::NotFound("Round"));
    }
    Ok(round)
}

/// Manual fast-start of a scheduled auction: round 1 opens now, later
/// rounds keep chaining through completion.
pub async fn start_auction(state: &AppState, auction_id: Ulid) -> Result<AuctionDetail, HandlerError> {
    let auction = store::get_auction(&state.db, auction_id).await?;
    if auction.status != AuctionStatus::Scheduled {
        return Err(HandlerError::Conflict(format!(
            "Auction is {}",
            auction.status
        )));
    }
    let first = store::get_round(&state.db, auction_id, 1).await?;
    // The pre-scheduled timer would no-op against the already-open round,
    // but drop it rather than let it fire for nothing.
    state.scheduler.cancel(&start_round_key(first.id)).await?;
    rounds::start_round(state, auction_id, 1).await?;
    get_detail(state, auction_id).await
}

/// Pause between rounds: the pending next-round start is disarmed. Not
/// available while a round is live.
pub async fn pause_auction(state: &AppState, auction_id: Ulid) -> Result<Auction, HandlerError> {
    let auction = store::get_auction(&state.db, auction_id).await?;
    if auction.status != AuctionStatus::Active {
        return Err(HandlerError::Conflict(format!(
            "Auction is {}",
            auction.status
        )));
    }
    if auction.current_round > 0 {
        let round = store::get_round(&state.db, auction_id, auction.current_round).await?;
        if round.status == RoundStatus::Active {
            return Err(HandlerError::Conflict(
                "Cannot pause while a round is active".into(),
            ));
        }
    }

    set_status(
        state,
        auction_id,
        AuctionStatus::Paused,
        &[AuctionStatus::Active],
    )
    .await?;
    for round in store::list_rounds(&state.db, auction_id).await? {
        if round.status == RoundStatus::Scheduled {
            state.scheduler.cancel(&start_round_key(round.id)).await?;
        }
    }
    store::get_auction(&state.db, auction_id).await
}

pub async fn resume_auction(state: &AppState, auction_id: Ulid) -> Result<Auction, HandlerError> {
    let auction = store::get_auction(&state.db, auction_id).await?;
    if auction.status != AuctionStatus::Paused {
        return Err(HandlerError::Conflict(format!(
            "Auction is {}",
            auction.status
        )));
    }

    set_status(
        state,
        auction_id,
        AuctionStatus::Active,
        &[AuctionStatus::Paused],
    )
    .await?;
    let rounds = store::list_rounds(&state.db, auction_id).await?;
    match rounds.iter().find(|r| r.status == RoundStatus::Scheduled) {
        Some(next) => {
            let start_at = cmp::max(now_ms(), next.scheduled_start_time);
            state
                .scheduler
                .schedule(
                    &start_round_key(next.id),
                    start_at,
                    TimerPayload::StartRound {
                        auction_id,
                        round_number: next.round_number,
                    },
                )
                .await?;
        }
        None => check_completion(state, auction_id).await?,
    }
    store::get_auction(&state.db, auction_id).await
}

/// Cancellation, only before the auction runs or from pause. Every live
/// reservation is released; a failed refund leaves the auction in
/// `cancelling` for operator reconciliation.
pub async fn cancel_auction(state: &AppState, auction_id: Ulid) -> Result<Auction, HandlerError> {
    let auction = store::get_auction(&state.db, auction_id).await?;
    if !matches!(
        auction.status,
        AuctionStatus::Scheduled | AuctionStatus::Paused
    ) {
        return Err(HandlerError::Conflict(format!(
            "Auction is {}",
            auction.status
        )));
    }

    set_status(
        state,
        auction_id,
        AuctionStatus::Cancelling,
        &[AuctionStatus::Scheduled, AuctionStatus::Paused],
    )
    .await?;

    for round in store::list_rounds(&state.db, auction_id).await? {
        state.scheduler.cancel(&start_round_key(round.id)).await?;
        state.scheduler.cancel(&end_round_key(round.id)).await?;
    }

    let bids = store::list_auction_bids(&state.db, auction_id).await?;
    for bid in bids
        .iter()
        .filter(|b| matches!(b.status, BidStatus::Active | BidStatus::CarriedOver))
    {
        rounds::refund_bid(state, bid, "Auction cancelled").await?;
    }

    set_status(
        state,
        auction_id,
        AuctionStatus::Cancelled,
        &[AuctionStatus::Cancelling],
    )
    .await?;
    tracing::info!(%auction_id, "auction cancelled");
    store::get_auction(&state.db, auction_id).await
}

/// Once every round is completed the auction is done. Idempotent.
pub async fn check_completion(state: &AppState, auction_id: Ulid) -> Result<(), HandlerError> {
    let rounds = store::list_rounds(&state.db, auction_id).await?;
    if rounds.is_empty() || rounds.iter().any(|r| r.status != RoundStatus::Completed) {
        return Ok(());
    }
    let auction = store::get_auction(&state.db, auction_id).await?;
    if auction.status == AuctionStatus::Completed {
        return Ok(());
    }

    let result = state
        .db
        .update_item()
        .table_name(AUCTION_TABLE)
        .key("id", AttributeValue::S(auction_id.to_string()))
        .update_expression("SET #status = :completed, version = version + :one")
        .condition_expression("#status = :active")
        .expression_attribute_names("#status", "status")
        .expression_attribute_values(":completed", AuctionStatus::Completed.into())
        .expression_attribute_values(":active", AuctionStatus::Active.into())
        .expression_attribute_values(":one", AttributeValue::N("1".to_string()))
        .send()
        .await;
    match result {
        Ok(_) => {}
        Err(err) if is_conditional_check_failed(&err) => return Ok(()),
        Err(err) => return Err(err.into()),
    }

    let won_items = store::list_won_items(&state.db, auction_id).await?;
    state
        .events
        .publish_auction(
            auction_id,
            ServerEvent::AuctionCompleted {
                auction_id,
                total_rounds: auction.total_rounds,
                total_winners: won_items.len() as u32,
            },
        )
        .await;
    tracing::info!(%auction_id, winners = won_items.len(), "auction completed");
    Ok(())
}

/// The authoritative chaining rule: completion of round k schedules round
/// k+1 at `max(now, scheduledStartTime)`; the precomputed timestamps are
/// advisory once any round has extended.
pub async fn after_round_completed(
    state: &AppState,
    auction: &Auction,
    round_number: u32,
) -> Result<(), HandlerError> {
    if round_number < auction.total_rounds {
        let next = store::get_round(&state.db, auction.id, round_number + 1).await?;
        let start_at = cmp::max(now_ms(), next.scheduled_start_time);
        state
            .scheduler
            .schedule(
                &start_round_key(next.id),
                start_at,
                TimerPayload::StartRound {
                    auction_id: auction.id,
                    round_number: next.round_number,
                },
            )
            .await
    } else {
        check_completion(state, auction.id).await
    }
}

async fn set_status(
    state: &AppState,
    auction_id: Ulid,
    to: AuctionStatus,
    from: &[AuctionStatus],
) -> Result<(), HandlerError> {
    let mut update = state
        .db
        .update_item()
        .table_name(AUCTION_TABLE)
        .key("id", AttributeValue::S(auction_id.to_string()))
        .update_expression("SET #status = :to, version = version + :one")
        .expression_attribute_names("#status", "status")
        .expression_attribute_values(":to", to.into())
        .expression_attribute_values(":one", AttributeValue::N("1".to_string()));
    let placeholders: Vec<String> = (0..from.len()).map(|i| format!(":from{i}")).collect();
    update = update.condition_expression(format!("#status IN ({})", placeholders.join(", ")));
    for (i, status) in from.iter().enumerate() {
        update = update.expression_attribute_values(format!(":from{i}"), (*status).into());
    }
    match update.send().await {
        Ok(_) => Ok(()),
        Err(err) if is_conditional_check_failed(&err) => Err(HandlerError::Conflict(
            "Auction changed state concurrently".into(),
        )),
        Err(err) => Err(err.into()),
    }
}
