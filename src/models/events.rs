use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Domain events fanned out to subscribers. Every payload carries the
/// `auctionId` plus a millisecond timestamp where the contract asks for one;
/// consumers treat events as hints and re-fetch authoritative state.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "auction:started", rename_all = "camelCase")]
    AuctionStarted {
        auction_id: Ulid,
        name: String,
        current_round: u32,
        start_time: i64,
    },
    #[serde(rename = "auction:completed", rename_all = "camelCase")]
    AuctionCompleted {
        auction_id: Ulid,
        total_rounds: u32,
        total_winners: u32,
    },
    #[serde(rename = "round:started", rename_all = "camelCase")]
    RoundStarted {
        auction_id: Ulid,
        round_number: u32,
        items_in_round: u32,
        scheduled_end_time: i64,
    },
    #[serde(rename = "round:extended", rename_all = "camelCase")]
    RoundExtended {
        auction_id: Ulid,
        round_number: u32,
        new_end_time: i64,
        extensions_count: u32,
    },
    #[serde(rename = "round:completed", rename_all = "camelCase")]
    RoundCompleted {
        auction_id: Ulid,
        round_number: u32,
        winners_count: u32,
    },
    #[serde(rename = "bid:placed", rename_all = "camelCase")]
    BidPlaced {
        auction_id: Ulid,
        bid_id: Ulid,
        user_id: Ulid,
        username: String,
        amount: Decimal,
        round_number: u32,
        ts: i64,
    },
    #[serde(rename = "bid:increased", rename_all = "camelCase")]
    BidIncreased {
        auction_id: Ulid,
        bid_id: Ulid,
        user_id: Ulid,
        username: String,
        previous_amount: Decimal,
        new_amount: Decimal,
        round_number: u32,
        ts: i64,
    },
    #[serde(rename = "leaderboard:updated", rename_all = "camelCase")]
    LeaderboardUpdated {
        auction_id: Ulid,
        round_number: u32,
        ts: i64,
    },
    #[serde(rename = "user:won", rename_all = "camelCase")]
    UserWon {
        auction_id: Ulid,
        item_number: u32,
        amount: Decimal,
        round_number: u32,
    },
    #[serde(rename = "bid:refunded", rename_all = "camelCase")]
    BidRefunded { auction_id: Ulid, amount: Decimal },
}

/// Frames a socket client may send.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ClientFrame {
    #[serde(rename = "authenticate")]
    Authenticate { token: String },
    #[serde(rename = "subscribe:auction", rename_all = "camelCase")]
    SubscribeAuction { auction_id: Ulid },
    #[serde(rename = "unsubscribe:auction", rename_all = "camelCase")]
    UnsubscribeAuction { auction_id: Ulid },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_tag_with_scoped_names() {
        let event = ServerEvent::LeaderboardUpdated {
            auction_id: Ulid::nil(),
            round_number: 2,
            ts: 1000,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "leaderboard:updated");
        assert_eq!(json["data"]["roundNumber"], 2);
    }

    #[test]
    fn client_frames_parse() {
        let frame: ClientFrame =
            serde_json::from_str(r#"{"type":"authenticate","token":"abc"}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::Authenticate {
                token: "abc".to_string()
            }
        );
        let frame: ClientFrame = serde_json::from_str(
            r#"{"type":"subscribe:auction","auctionId":"01ARZ3NDEKTSV4RRFFQ69G5FAV"}"#,
        )
        .unwrap();
        assert!(matches!(frame, ClientFrame::SubscribeAuction { .. }));
    }
}
