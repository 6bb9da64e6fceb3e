//! In-process fan-out: per-auction rooms and per-user direct channels over
//! tokio broadcast. Publication always follows commit of the producing
//! write and never gates it; delivery is best-effort.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{broadcast, RwLock};
use ulid::Ulid;

use crate::models::events::ServerEvent;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    rooms: RwLock<HashMap<Ulid, broadcast::Sender<ServerEvent>>>,
    users: RwLock<HashMap<Ulid, broadcast::Sender<ServerEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join an auction room. Membership lasts as long as the receiver.
    pub async fn subscribe_auction(&self, auction_id: Ulid) -> broadcast::Receiver<ServerEvent> {
        let mut rooms = self.inner.rooms.write().await;
        rooms
            .entry(auction_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Direct channel carrying events addressed to a single user.
    pub async fn subscribe_user(&self, user_id: Ulid) -> broadcast::Receiver<ServerEvent> {
        let mut users = self.inner.users.write().await;
        users
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    pub async fn publish_auction(&self, auction_id: Ulid, event: ServerEvent) {
        let mut rooms = self.inner.rooms.write().await;
        if let Some(sender) = rooms.get(&auction_id) {
            if sender.send(event).is_err() {
                // Last subscriber left; drop the empty room.
                rooms.remove(&auction_id);
            }
        }
    }

    pub async fn publish_user(&self, user_id: Ulid, event: ServerEvent) {
        let mut users = self.inner.users.write().await;
        if let Some(sender) = users.get(&user_id) {
            if sender.send(event).is_err() {
                users.remove(&user_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn room_delivery_and_isolation() {
        let bus = EventBus::new();
        let a = Ulid::new();
        let b = Ulid::new();
        let mut sub_a = bus.subscribe_auction(a).await;
        let mut sub_b = bus.subscribe_auction(b).await;

        bus.publish_auction(
            a,
            ServerEvent::LeaderboardUpdated {
                auction_id: a,
                round_number: 1,
                ts: 1,
            },
        )
        .await;

        let got = sub_a.recv().await.unwrap();
        assert!(matches!(got, ServerEvent::LeaderboardUpdated { .. }));
        assert!(sub_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let bus = EventBus::new();
        bus.publish_user(
            Ulid::new(),
            ServerEvent::BidRefunded {
                auction_id: Ulid::new(),
                amount: rust_decimal::Decimal::ONE,
            },
        )
        .await;
    }
}
