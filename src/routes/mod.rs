use crate::{
    errors::HandlerError,
    models::{auth::ClaimOwned, user::Role},
};

pub mod auctions;
pub mod auth;
pub mod bids;
pub mod users;
pub mod ws;

fn check_admin(claim: &ClaimOwned) -> Result<(), HandlerError> {
    if claim.role != Role::Admin {
        return Err(HandlerError::Forbidden(
            "Only admin can use this.".to_string(),
        ));
    }
    Ok(())
}
