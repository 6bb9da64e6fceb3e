use aws_sdk_dynamodb::{
    error::SdkError as DynamoSdkError,
    operation::{
        delete_item::DeleteItemError, get_item::GetItemError, put_item::PutItemError,
        query::QueryError, scan::ScanError, transact_write_items::TransactWriteItemsError,
        update_item::UpdateItemError,
    },
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use utoipa::{PartialSchema, ToSchema};

use crate::models::{ApiError, ApiResponse};

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("DynamoDB Error: GetItem: {0}")]
    DynamoDBGetError(#[from] DynamoSdkError<GetItemError>),
    #[error("DynamoDB Error: PutItem: {0}")]
    DynamoDBPutError(#[from] DynamoSdkError<PutItemError>),
    #[error("DynamoDB Error: Query: {0}")]
    DynamoDBQueryError(#[from] DynamoSdkError<QueryError>),
    #[error("DynamoDB Error: Scan: {0}")]
    DynamoDBScanError(#[from] DynamoSdkError<ScanError>),
    #[error("DynamoDB Error: DeleteItem: {0}")]
    DynamoDBDeleteError(#[from] DynamoSdkError<DeleteItemError>),
    #[error("DynamoDB Error: UpdateItem: {0}")]
    DynamoDBUpdateError(#[from] DynamoSdkError<UpdateItemError>),
    #[error("DynamoDB Error: TransactWriteItems: {0}")]
    DynamoDBTransactError(#[from] DynamoSdkError<TransactWriteItemsError>),
    #[error("Failed to build transaction: {0}")]
    TransactionBuildError(#[from] aws_sdk_dynamodb::error::BuildError),
    #[error("JWT operation failed: {0}")]
    JWTError(#[from] jsonwebtoken::errors::Error),
    #[error("PasswordHash error: {0}")]
    PasswordHashError(#[from] scrypt::password_hash::Error),
    #[error("SerdeDynamo failed to process DynamoDB data: {0}")]
    SerdeDynamoError(#[from] serde_dynamo::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("Bid too low, minimum next amount is {minimum}")]
    BidTooLow { minimum: Decimal },
    #[error("Insufficient funds, available {available}")]
    InsufficientFunds { available: Decimal },
    #[error("{0}")]
    AuctionNotActive(String),
    #[error("{0}")]
    RoundNotActive(String),
    #[error("{0}")]
    Transient(String),
    #[error("{0}")]
    Internal(String),
}

impl HandlerError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Validation",
            Self::Unauthenticated(_) => "Unauthenticated",
            Self::Forbidden(_) => "Forbidden",
            Self::NotFound(_) => "NotFound",
            Self::Conflict(_) => "Conflict",
            Self::BidTooLow { .. } => "BidTooLow",
            Self::InsufficientFunds { .. } => "InsufficientFunds",
            Self::AuctionNotActive(_) => "AuctionNotActive",
            Self::RoundNotActive(_) => "RoundNotActive",
            Self::Transient(_) => "Transient",
            _ => "Internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_)
            | Self::BidTooLow { .. }
            | Self::InsufficientFunds { .. }
            | Self::AuctionNotActive(_)
            | Self::RoundNotActive(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Store errors are logged in full but never leak
    /// engine detail to the caller.
    fn public_message(&self) -> String {
        match self.status() {
            StatusCode::INTERNAL_SERVER_ERROR => "Internal error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }
        let body = ApiResponse::<()>::err(ApiError {
            kind: self.kind().to_string(),
            message: self.public_message(),
        });
        (status, Json(body)).into_response()
    }
}

impl PartialSchema for HandlerError {
    fn schema() -> utoipa::openapi::RefOr<utoipa::openapi::schema::Schema> {
        ApiError::schema()
    }
}

impl ToSchema for HandlerError {
    fn schemas(
        schemas: &mut Vec<(
            String,
            utoipa::openapi::RefOr<utoipa::openapi::schema::Schema>,
        )>,
    ) {
        <ApiError as ToSchema>::schemas(schemas);
    }
}

/// Zero-based indexes of the items whose `ConditionalCheckFailed` cancelled a
/// `TransactWriteItems` call. Empty when the error is anything else.
pub fn conditional_failures(err: &DynamoSdkError<TransactWriteItemsError>) -> Vec<usize> {
    let DynamoSdkError::ServiceError(service_err) = err else {
        return Vec::new();
    };
    let TransactWriteItemsError::TransactionCanceledException(cancelled) = service_err.err() else {
        return Vec::new();
    };
    cancelled
        .cancellation_reasons()
        .iter()
        .enumerate()
        .filter(|(_, reason)| reason.code() == Some("ConditionalCheckFailed"))
        .map(|(i, _)| i)
        .collect()
}

/// True when a plain `UpdateItem` lost its condition. Used by the CAS
/// call sites, where losing means another worker already applied the change.
pub fn is_conditional_check_failed(err: &DynamoSdkError<UpdateItemError>) -> bool {
    err.as_service_error()
        .map(|e| e.is_conditional_check_failed_exception())
        .unwrap_or(false)
}

/// True when the transaction lost to another in-flight transaction and is
/// safe to retry as-is.
pub fn is_transact_conflict(err: &DynamoSdkError<TransactWriteItemsError>) -> bool {
    let DynamoSdkError::ServiceError(service_err) = err else {
        return false;
    };
    match service_err.err() {
        TransactWriteItemsError::TransactionCanceledException(cancelled) => cancelled
            .cancellation_reasons()
            .iter()
            .any(|reason| reason.code() == Some("TransactionConflict")),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_status_codes() {
        assert_eq!(
            HandlerError::Validation("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            HandlerError::Conflict("dup".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            HandlerError::Transient("busy".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            HandlerError::NotFound("Auction").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            HandlerError::Internal("oops".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_detail_is_not_leaked() {
        let err = HandlerError::Internal("store row 42 corrupted".into());
        assert_eq!(err.public_message(), "Internal error");
        let err = HandlerError::NotFound("Bid");
        assert_eq!(err.public_message(), "Bid not found");
    }
}
