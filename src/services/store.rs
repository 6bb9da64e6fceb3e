//! Typed fetch helpers over the document store. Mutations live with the
//! services that own them; reads are shared here.

use aws_sdk_dynamodb::{types::AttributeValue, Client};
use serde_dynamo::{from_item, from_items};
use ulid::Ulid;

use crate::{
    constants::{
        AUCTION_TABLE, BID_ID_INDEX, BID_TABLE, EMAIL_INDEX, ROUND_TABLE, USERNAME_INDEX,
        USER_TABLE, WON_ITEM_AUCTION_INDEX, WON_ITEM_TABLE,
    },
    errors::HandlerError,
    models::{
        auction::Auction,
        bid::{Bid, BidStatus},
        round::Round,
        user::User,
        won_item::WonItem,
    },
};

pub async fn get_user(db: &Client, id: Ulid) -> Result<User, HandlerError> {
    let resp = db
        .get_item()
        .table_name(USER_TABLE)
        .key("id", AttributeValue::S(id.to_string()))
        .send()
        .await?;
    let item = resp.item.ok_or(HandlerError::NotFound("User"))?;
    Ok(from_item(item)?)
}

pub async fn find_user_by_username(
    db: &Client,
    username: &str,
) -> Result<Option<User>, HandlerError> {
    let resp = db
        .query()
        .table_name(USER_TABLE)
        .index_name(USERNAME_INDEX)
        .key_condition_expression("username = :username")
        .expression_attribute_values(":username", AttributeValue::S(username.to_string()))
        .send()
        .await?;
    match resp.items().first() {
        Some(item) => Ok(Some(from_item(item.clone())?)),
        None => Ok(None),
    }
}

pub async fn find_user_by_email(db: &Client, email: &str) -> Result<Option<User>, HandlerError> {
    let resp = db
        .query()
        .table_name(USER_TABLE)
        .index_name(EMAIL_INDEX)
        .key_condition_expression("email = :email")
        .expression_attribute_values(":email", AttributeValue::S(email.to_string()))
        .send()
        .await?;
    match resp.items().first() {
        Some(item) => Ok(Some(from_item(item.clone())?)),
        None => Ok(None),
    }
}

pub async fn get_auction(db: &Client, id: Ulid) -> Result<Auction, HandlerError> {
    let resp = db
        .get_item()
        .table_name(AUCTION_TABLE)
        .key("id", AttributeValue::S(id.to_string()))
        .send()
        .await?;
    let item = resp.item.ok_or(HandlerError::NotFound("Auction"))?;
    Ok(from_item(item)?)
}

pub async fn get_round(
    db: &Client,
    auction_id: Ulid,
    round_number: u32,
) -> Result<Round, HandlerError> {
    let resp = db
        .get_item()
        .table_name(ROUND_TABLE)
        .key("auctionId", AttributeValue::S(auction_id.to_string()))
        .key("roundNumber", AttributeValue::N(round_number.to_string()))
        .send()
        .await?;
    let item = resp.item.ok_or(HandlerError::NotFound("Round"))?;
    Ok(from_item(item)?)
}

/// All rounds of an auction in round order (range key ascending).
pub async fn list_rounds(db: &Client, auction_id: Ulid) -> Result<Vec<Round>, HandlerError> {
    let resp = db
        .query()
        .table_name(ROUND_TABLE)
        .key_condition_expression("auctionId = :auctionId")
        .expression_attribute_values(":auctionId", AttributeValue::S(auction_id.to_string()))
        .send()
        .await?;
    Ok(from_items(resp.items().to_vec())?)
}

/// Lookup by bid id alone, through the id GSI.
pub async fn get_bid(db: &Client, bid_id: Ulid) -> Result<Bid, HandlerError> {
    let resp = db
        .query()
        .table_name(BID_TABLE)
        .index_name(BID_ID_INDEX)
        .key_condition_expression("id = :id")
        .expression_attribute_values(":id", AttributeValue::S(bid_id.to_string()))
        .send()
        .await?;
    let item = resp
        .items()
        .first()
        .cloned()
        .ok_or(HandlerError::NotFound("Bid"))?;
    Ok(from_item(item)?)
}

/// Bids competing in one round of an auction, unsorted.
pub async fn list_round_bids(
    db: &Client,
    auction_id: Ulid,
    round_number: u32,
    status: BidStatus,
) -> Result<Vec<Bid>, HandlerError> {
    let resp = db
        .query()
        .table_name(BID_TABLE)
        .key_condition_expression("auctionId = :auctionId")
        .filter_expression("currentRound = :round AND #status = :status")
        .expression_attribute_names("#status", "status")
        .expression_attribute_values(":auctionId", AttributeValue::S(auction_id.to_string()))
        .expression_attribute_values(":round", AttributeValue::N(round_number.to_string()))
        .expression_attribute_values(":status", status.into())
        .send()
        .await?;
    Ok(from_items(resp.items().to_vec())?)
}

/// Every bid of an auction, any status.
pub async fn list_auction_bids(db: &Client, auction_id: Ulid) -> Result<Vec<Bid>, HandlerError> {
    let resp = db
        .query()
        .table_name(BID_TABLE)
        .key_condition_expression("auctionId = :auctionId")
        .expression_attribute_values(":auctionId", AttributeValue::S(auction_id.to_string()))
        .send()
        .await?;
    Ok(from_items(resp.items().to_vec())?)
}

/// Won items of an auction ordered by item number.
pub async fn list_won_items(db: &Client, auction_id: Ulid) -> Result<Vec<WonItem>, HandlerError> {
    let resp = db
        .query()
        .table_name(WON_ITEM_TABLE)
        .index_name(WON_ITEM_AUCTION_INDEX)
        .key_condition_expression("auctionId = :auctionId")
        .expression_attribute_values(":auctionId", AttributeValue::S(auction_id.to_string()))
        .send()
        .await?;
    let mut items: Vec<WonItem> = from_items(resp.items().to_vec())?;
    items.sort_by_key(|item| item.item_number);
    Ok(items)
}
