//! Balance reservation and settlement. Every operation computes the new
//! counters in process and writes them back guarded by the user document's
//! version, together with an append-only transaction log entry, inside the
//! caller's `TransactWriteItems` call.
//!
//! Invariant enforced before every write: `0 <= reserved <= balance`.

use std::time::Duration;

use aws_sdk_dynamodb::{
    types::{AttributeValue, Put, TransactWriteItem, Update},
    Client,
};
use rust_decimal::Decimal;
use serde_dynamo::{from_items, to_attribute_value, to_item};
use ulid::Ulid;

use crate::{
    constants::{TRANSACTION_TABLE, USER_TABLE, VERSION_RETRY_ATTEMPTS, VERSION_RETRY_BASE_MS},
    errors::{conditional_failures, is_transact_conflict, HandlerError},
    models::{
        transaction::{Transaction, TransactionType},
        user::User,
    },
    services::store,
    utils::{now_ms, round_money},
};

/// The user document after an operation's in-process arithmetic, plus the
/// transact items that persist it.
#[derive(Debug)]
pub struct LedgerOp {
    pub user: User,
    pub items: Vec<TransactWriteItem>,
}

/// Reserve `amount` against the user's available balance. The balance does
/// not move; only `reserved` grows.
pub fn reserve(
    user: &User,
    amount: Decimal,
    tx_type: TransactionType,
    auction_id: Ulid,
    bid_id: Ulid,
    description: String,
) -> Result<LedgerOp, HandlerError> {
    if user.available() < amount {
        return Err(HandlerError::InsufficientFunds {
            available: user.available(),
        });
    }
    let mut updated = user.clone();
    updated.reserved += amount;
    if tx_type == TransactionType::BidPlaced {
        updated.total_bids += 1;
    }
    finish(user, updated, tx_type, amount, Some(auction_id), Some(bid_id), description)
}

/// Settle a winning bid: the reservation converts into spend.
pub fn commit_win(
    user: &User,
    amount: Decimal,
    auction_id: Ulid,
    bid_id: Ulid,
) -> Result<LedgerOp, HandlerError> {
    let mut updated = user.clone();
    updated.balance -= amount;
    updated.reserved -= amount;
    updated.total_wins += 1;
    updated.total_spent += amount;
    finish(
        user,
        updated,
        TransactionType::BidWon,
        amount,
        Some(auction_id),
        Some(bid_id),
        format!("Won auction {auction_id} with bid of {amount}"),
    )
}

/// Release a reservation without spending (losing bid, cancel, auction
/// cancellation). The balance never moved, so only `reserved` shrinks.
pub fn release(
    user: &User,
    amount: Decimal,
    auction_id: Ulid,
    bid_id: Ulid,
    description: String,
) -> Result<LedgerOp, HandlerError> {
    let mut updated = user.clone();
    updated.reserved -= amount;
    finish(
        user,
        updated,
        TransactionType::BidRefunded,
        amount,
        Some(auction_id),
        Some(bid_id),
        description,
    )
}

fn finish(
    before: &User,
    mut updated: User,
    tx_type: TransactionType,
    amount: Decimal,
    auction_id: Option<Ulid>,
    bid_id: Option<Ulid>,
    description: String,
) -> Result<LedgerOp, HandlerError> {
    if updated.reserved < Decimal::ZERO || updated.reserved > updated.balance {
        return Err(HandlerError::Internal(format!(
            "ledger invariant violated for user {}: reserved {} balance {}",
            updated.id, updated.reserved, updated.balance
        )));
    }
    updated.version += 1;

    let log = Transaction {
        user_id: updated.id,
        id: Ulid::new(),
        tx_type,
        amount,
        balance_before: before.balance,
        balance_after: updated.balance,
        auction_id,
        bid_id,
        description,
        created_at: now_ms(),
    };

    let items = vec![user_write(before, &updated)?, log_write(&log)?];
    Ok(LedgerOp {
        user: updated,
        items,
    })
}

/// Conditional write of the recomputed user counters; loses to any
/// concurrent mutation of the same document.
fn user_write(before: &User, updated: &User) -> Result<TransactWriteItem, HandlerError> {
    Ok(TransactWriteItem::builder()
        .update(
            Update::builder()
                .table_name(USER_TABLE)
                .key("id", AttributeValue::S(updated.id.to_string()))
                .update_expression(
                    "SET balance = :balance, reserved = :reserved, totalBids = :totalBids, \
                     totalWins = :totalWins, totalSpent = :totalSpent, version = :newVersion",
                )
                .condition_expression("version = :version")
                .expression_attribute_values(":balance", to_attribute_value(updated.balance)?)
                .expression_attribute_values(":reserved", to_attribute_value(updated.reserved)?)
                .expression_attribute_values(":totalBids", AttributeValue::N(updated.total_bids.to_string()))
                .expression_attribute_values(":totalWins", AttributeValue::N(updated.total_wins.to_string()))
                .expression_attribute_values(":totalSpent", to_attribute_value(updated.total_spent)?)
                .expression_attribute_values(":newVersion", AttributeValue::N(updated.version.to_string()))
                .expression_attribute_values(":version", AttributeValue::N(before.version.to_string()))
                .build()?,
        )
        .build())
}

fn log_write(log: &Transaction) -> Result<TransactWriteItem, HandlerError> {
    Ok(TransactWriteItem::builder()
        .put(
            Put::builder()
                .table_name(TRANSACTION_TABLE)
                .set_item(Some(to_item(log.clone())?))
                .build()?,
        )
        .build())
}

/// Manual balance adjustment.
pub async fn deposit(db: &Client, user_id: Ulid, amount: Decimal) -> Result<User, HandlerError> {
    adjust(db, user_id, amount, TransactionType::Deposit).await
}

pub async fn withdraw(db: &Client, user_id: Ulid, amount: Decimal) -> Result<User, HandlerError> {
    adjust(db, user_id, amount, TransactionType::Withdrawal).await
}

async fn adjust(
    db: &Client,
    user_id: Ulid,
    amount: Decimal,
    tx_type: TransactionType,
) -> Result<User, HandlerError> {
    let amount = round_money(amount);
    if amount <= Decimal::ZERO {
        return Err(HandlerError::Validation("amount must be positive".into()));
    }

    for attempt in 1..=VERSION_RETRY_ATTEMPTS {
        let user = store::get_user(db, user_id).await?;
        let mut updated = user.clone();
        match tx_type {
            TransactionType::Deposit => updated.balance += amount,
            TransactionType::Withdrawal => {
                if user.available() < amount {
                    return Err(HandlerError::InsufficientFunds {
                        available: user.available(),
                    });
                }
                updated.balance -= amount;
            }
            _ => unreachable!("adjust only handles deposit and withdrawal"),
        }
        let op = finish(
            &user,
            updated,
            tx_type,
            amount,
            None,
            None,
            format!("Manual {tx_type}"),
        )?;

        match db
            .transact_write_items()
            .set_transact_items(Some(op.items))
            .send()
            .await
        {
            Ok(_) => return Ok(op.user),
            Err(err) if !conditional_failures(&err).is_empty() || is_transact_conflict(&err) => {
                tokio::time::sleep(Duration::from_millis(VERSION_RETRY_BASE_MS * attempt as u64))
                    .await;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Err(HandlerError::Transient(
        "balance is being updated concurrently, please retry".into(),
    ))
}

/// The caller's ledger log, newest first, paginated in memory.
pub async fn list_transactions(
    db: &Client,
    user_id: Ulid,
    page: u32,
    limit: u32,
) -> Result<(Vec<Transaction>, u64), HandlerError> {
    let resp = db
        .query()
        .table_name(TRANSACTION_TABLE)
        .key_condition_expression("userId = :userId")
        .expression_attribute_values(":userId", AttributeValue::S(user_id.to_string()))
        .scan_index_forward(false)
        .send()
        .await?;
    let all: Vec<Transaction> = from_items(resp.items().to_vec())?;
    let total = all.len() as u64;
    let start = (page.saturating_sub(1) as usize) * limit as usize;
    let entries = all.into_iter().skip(start).take(limit as usize).collect();
    Ok((entries, total))
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::models::user::Role;

    fn user(balance: Decimal, reserved: Decimal) -> User {
        User {
            id: Ulid::new(),
            username: "alice".into(),
            email: None,
            role: Role::Bidder,
            password: String::new(),
            balance,
            reserved,
            total_bids: 0,
            total_wins: 0,
            total_spent: Decimal::ZERO,
            created_at: 0,
            version: 1,
        }
    }

    #[test]
    fn reserve_respects_available() {
        let u = user(dec!(500), dec!(0));
        let err = reserve(
            &u,
            dec!(600),
            TransactionType::BidPlaced,
            Ulid::new(),
            Ulid::new(),
            "bid".into(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            HandlerError::InsufficientFunds { available } if available == dec!(500)
        ));
    }

    #[test]
    fn reserve_counts_against_existing_reservations() {
        let u = user(dec!(500), dec!(400));
        assert!(reserve(
            &u,
            dec!(200),
            TransactionType::BidIncreased,
            Ulid::new(),
            Ulid::new(),
            "raise".into(),
        )
        .is_err());
        let op = reserve(
            &u,
            dec!(100),
            TransactionType::BidIncreased,
            Ulid::new(),
            Ulid::new(),
            "raise".into(),
        )
        .unwrap();
        assert_eq!(op.user.reserved, dec!(500));
        assert_eq!(op.user.balance, dec!(500));
        assert_eq!(op.user.version, 2);
    }

    #[test]
    fn commit_win_moves_reservation_into_spend() {
        let u = user(dec!(500), dec!(300));
        let op = commit_win(&u, dec!(300), Ulid::new(), Ulid::new()).unwrap();
        assert_eq!(op.user.balance, dec!(200));
        assert_eq!(op.user.reserved, dec!(0));
        assert_eq!(op.user.total_wins, 1);
        assert_eq!(op.user.total_spent, dec!(300));
    }

    #[test]
    fn release_keeps_balance() {
        let u = user(dec!(500), dec!(300));
        let op = release(&u, dec!(300), Ulid::new(), Ulid::new(), "refund".into()).unwrap();
        assert_eq!(op.user.balance, dec!(500));
        assert_eq!(op.user.reserved, dec!(0));
    }

    #[test]
    fn invariant_breach_fails_the_operation() {
        let u = user(dec!(100), dec!(0));
        // Releasing more than is reserved would drive reserved negative.
        assert!(release(&u, dec!(50), Ulid::new(), Ulid::new(), "bad".into()).is_err());
    }
}
