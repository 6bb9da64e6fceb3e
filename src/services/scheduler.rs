//! Delayed-task queue keyed by wall-clock deadlines. Entries persist in the
//! timer table so a restart re-arms every pending deadline; an in-process
//! wheel fires them. Firing is at-least-once and consumers are idempotent
//! against their payload, so the 60 s sweeper may re-emit work the wheel
//! already delivered.

use std::{
    collections::{BTreeSet, HashMap},
    time::Duration,
};

use aws_sdk_dynamodb::{types::AttributeValue, Client};
use serde::{Deserialize, Serialize};
use serde_dynamo::{from_item, from_items, to_item};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use ulid::Ulid;

use crate::{
    constants::{ROUND_TABLE, SWEEP_INTERVAL_SECS, TIMER_TABLE},
    errors::HandlerError,
    models::round::{Round, RoundStatus},
    utils::now_ms,
};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimerPayload {
    StartRound { auction_id: Ulid, round_number: u32 },
    EndRound { auction_id: Ulid, round_number: u32 },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct TimerEntry {
    /// Hash key.
    key: String,
    /// Unix millis.
    deadline: i64,
    payload: TimerPayload,
}

enum Command {
    Arm { key: String, deadline: i64 },
    Disarm { key: String },
}

#[derive(Clone)]
pub struct SchedulerHandle {
    db: Client,
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl SchedulerHandle {
    /// Register a delayed callback. Re-scheduling an existing key replaces
    /// its deadline and payload.
    pub async fn schedule(
        &self,
        key: &str,
        deadline: i64,
        payload: TimerPayload,
    ) -> Result<(), HandlerError> {
        let entry = TimerEntry {
            key: key.to_string(),
            deadline,
            payload,
        };
        self.db
            .put_item()
            .table_name(TIMER_TABLE)
            .set_item(Some(to_item(entry)?))
            .send()
            .await?;
        let _ = self.cmd_tx.send(Command::Arm {
            key: key.to_string(),
            deadline,
        });
        Ok(())
    }

    /// Atomically move an existing entry to a new deadline. A missing entry
    /// is left for the sweeper rather than recreated without a payload.
    pub async fn reschedule(&self, key: &str, new_deadline: i64) -> Result<(), HandlerError> {
        let result = self
            .db
            .update_item()
            .table_name(TIMER_TABLE)
            .key("key", AttributeValue::S(key.to_string()))
            .update_expression("SET deadline = :deadline")
            .condition_expression("attribute_exists(#k)")
            .expression_attribute_names("#k", "key")
            .expression_attribute_values(":deadline", AttributeValue::N(new_deadline.to_string()))
            .send()
            .await;
        match result {
            Ok(_) => {
                let _ = self.cmd_tx.send(Command::Arm {
                    key: key.to_string(),
                    deadline: new_deadline,
                });
                Ok(())
            }
            Err(err)
                if err
                    .as_service_error()
                    .map(|e| e.is_conditional_check_failed_exception())
                    .unwrap_or(false) =>
            {
                tracing::warn!(key, "reschedule of unknown timer ignored");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn cancel(&self, key: &str) -> Result<(), HandlerError> {
        self.db
            .delete_item()
            .table_name(TIMER_TABLE)
            .key("key", AttributeValue::S(key.to_string()))
            .send()
            .await?;
        let _ = self.cmd_tx.send(Command::Disarm {
            key: key.to_string(),
        });
        Ok(())
    }
}

/// Spawn the timer wheel. Persisted entries are re-armed before the first
/// tick; fired payloads go out through `fire_tx`.
pub fn spawn(
    db: Client,
    fire_tx: mpsc::UnboundedSender<TimerPayload>,
    mut shutdown: watch::Receiver<bool>,
) -> (SchedulerHandle, JoinHandle<()>) {
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
    let handle = SchedulerHandle {
        db: db.clone(),
        cmd_tx,
    };

    let task = tokio::spawn(async move {
        let mut queue: BTreeSet<(i64, String)> = BTreeSet::new();
        let mut deadlines: HashMap<String, i64> = HashMap::new();

        match rehydrate(&db).await {
            Ok(entries) => {
                tracing::info!(count = entries.len(), "re-armed persisted timers");
                for entry in entries {
                    arm(&mut queue, &mut deadlines, entry.key, entry.deadline);
                }
            }
            Err(err) => tracing::error!(error = %err, "timer rehydration failed"),
        }

        loop {
            let next = queue.first().map(|(deadline, _)| *deadline);
            let wake = next.map(|deadline| {
                Instant::now() + Duration::from_millis((deadline - now_ms()).max(0) as u64)
            });

            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(Command::Arm { key, deadline }) => {
                        arm(&mut queue, &mut deadlines, key, deadline);
                    }
                    Some(Command::Disarm { key }) => {
                        if let Some(deadline) = deadlines.remove(&key) {
                            queue.remove(&(deadline, key));
                        }
                    }
                    None => break,
                },
                _ = sleep_until(wake.unwrap_or_else(Instant::now)), if wake.is_some() => {
                    fire_due(&db, &fire_tx, &mut queue, &mut deadlines).await;
                }
                _ = shutdown.changed() => break,
            }
        }
        tracing::info!("timer wheel stopped");
    });

    (handle, task)
}

fn arm(
    queue: &mut BTreeSet<(i64, String)>,
    deadlines: &mut HashMap<String, i64>,
    key: String,
    deadline: i64,
) {
    if let Some(previous) = deadlines.insert(key.clone(), deadline) {
        queue.remove(&(previous, key.clone()));
    }
    queue.insert((deadline, key));
}

async fn fire_due(
    db: &Client,
    fire_tx: &mpsc::UnboundedSender<TimerPayload>,
    queue: &mut BTreeSet<(i64, String)>,
    deadlines: &mut HashMap<String, i64>,
) {
    let now = now_ms();
    while let Some((deadline, key)) = queue.first().cloned() {
        if deadline > now {
            break;
        }
        queue.remove(&(deadline, key.clone()));
        deadlines.remove(&key);

        // The persisted entry is authoritative: it may have been cancelled
        // or pushed out by a reschedule we lost the race against.
        match load_entry(db, &key).await {
            Ok(Some(entry)) if entry.deadline <= now => {
                if let Err(err) = delete_entry(db, &key).await {
                    tracing::warn!(key, error = %err, "failed to clear fired timer");
                }
                let _ = fire_tx.send(entry.payload);
            }
            Ok(Some(entry)) => arm(queue, deadlines, key, entry.deadline),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(key, error = %err, "failed to load due timer, sweeper will recover");
            }
        }
    }
}

async fn load_entry(db: &Client, key: &str) -> Result<Option<TimerEntry>, HandlerError> {
    let resp = db
        .get_item()
        .table_name(TIMER_TABLE)
        .key("key", AttributeValue::S(key.to_string()))
        .send()
        .await?;
    match resp.item {
        Some(item) => Ok(Some(from_item(item)?)),
        None => Ok(None),
    }
}

async fn delete_entry(db: &Client, key: &str) -> Result<(), HandlerError> {
    db.delete_item()
        .table_name(TIMER_TABLE)
        .key("key", AttributeValue::S(key.to_string()))
        .send()
        .await?;
    Ok(())
}

async fn rehydrate(db: &Client) -> Result<Vec<TimerEntry>, HandlerError> {
    let items = db
        .scan()
        .table_name(TIMER_TABLE)
        .into_paginator()
        .items()
        .send()
        .try_collect()
        .await?;
    Ok(from_items(items)?)
}

/// Recovery path for lost timer callbacks: every 60 s, emit any overdue
/// round transition that has not settled yet. Runs once immediately so a
/// restart catches up before the first interval elapses.
pub fn spawn_sweeper(
    db: Client,
    fire_tx: mpsc::UnboundedSender<TimerPayload>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = sweep(&db, &fire_tx).await {
                        tracing::error!(error = %err, "sweep failed");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        tracing::info!("sweeper stopped");
    })
}

async fn sweep(
    db: &Client,
    fire_tx: &mpsc::UnboundedSender<TimerPayload>,
) -> Result<(), HandlerError> {
    let items = db
        .scan()
        .table_name(ROUND_TABLE)
        .filter_expression("winnersProcessed = :no")
        .expression_attribute_values(":no", AttributeValue::Bool(false))
        .into_paginator()
        .items()
        .send()
        .try_collect()
        .await?;
    let rounds: Vec<Round> = from_items(items)?;

    let now = now_ms();
    for round in rounds {
        let payload = match round.status {
            RoundStatus::Scheduled if round.scheduled_start_time <= now => {
                Some(TimerPayload::StartRound {
                    auction_id: round.auction_id,
                    round_number: round.round_number,
                })
            }
            RoundStatus::Active if round.actual_end_time.is_some_and(|end| end <= now) => {
                Some(TimerPayload::EndRound {
                    auction_id: round.auction_id,
                    round_number: round.round_number,
                })
            }
            // Completion began but the winner pass did not finish.
            RoundStatus::Completed => Some(TimerPayload::EndRound {
                auction_id: round.auction_id,
                round_number: round.round_number,
            }),
            _ => None,
        };
        if let Some(payload) = payload {
            tracing::warn!(
                auction_id = %round.auction_id,
                round_number = round.round_number,
                "sweeper re-emitting overdue round transition"
            );
            let _ = fire_tx.send(payload);
        }
    }
    Ok(())
}
