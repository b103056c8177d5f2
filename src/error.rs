use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use crate::settlement::SettlementError;

/// Bad user input. Always retryable after the user corrects it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("group name is required")]
    EmptyGroupName,

    #[error("description is required")]
    EmptyDescription,

    #[error("wallet address is required")]
    EmptyIdentity,

    #[error("amount must be a positive number, got {0}")]
    NonPositiveAmount(f64),

    #[error("amount {0} is too large to split")]
    AmountTooLarge(f64),

    #[error("select at least one participant")]
    NoParticipants,

    #[error("address {0} was already added")]
    DuplicateParticipant(String),

    #[error("payer {0} is not a participant of the group")]
    PayerNotInGroup(String),

    #[error("{0} is not a participant of the group")]
    NotAMember(String),

    #[error("custom split requires per-participant amounts")]
    MissingCustomAmounts,

    #[error("no custom amount given for {0}")]
    MissingCustomAmount(String),

    #[error("custom amount given for {0}, who is not part of the split")]
    UnknownSplitParticipant(String),

    #[error("invalid custom amount {amount} for {address}")]
    InvalidCustomAmount { address: String, amount: f64 },

    #[error("split amounts add up to {actual}, expected {expected}")]
    SplitMismatch { expected: f64, actual: f64 },
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("malformed ledger data: {0}")]
    LedgerData(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("group {0} not found")]
    GroupNotFound(String),

    #[error("wallet not connected")]
    NotConnected,

    #[error("invalid wallet credentials")]
    Unauthorized,

    #[error(transparent)]
    Settlement(#[from] SettlementError),
}

impl LedgerError {
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation(ValidationError::SplitMismatch { .. }) => "split_mismatch",
            LedgerError::Validation(_) => "validation_error",
            LedgerError::LedgerData(_) => "ledger_data_error",
            LedgerError::StoreUnavailable(_) => "store_unavailable",
            LedgerError::GroupNotFound(_) => "not_found",
            LedgerError::NotConnected => "not_connected",
            LedgerError::Unauthorized => "unauthorized",
            LedgerError::Settlement(_) => "settlement_conflict",
        }
    }
}

impl ResponseError for LedgerError {
    fn status_code(&self) -> StatusCode {
        match self {
            LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
            LedgerError::LedgerData(_) => StatusCode::INTERNAL_SERVER_ERROR,
            LedgerError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            LedgerError::GroupNotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::NotConnected | LedgerError::Unauthorized => StatusCode::UNAUTHORIZED,
            LedgerError::Settlement(_) => StatusCode::CONFLICT,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.code(),
            "message": self.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_mismatch_is_a_bad_request_with_its_own_code() {
        let err = LedgerError::from(ValidationError::SplitMismatch {
            expected: 30.0,
            actual: 29.0,
        });
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "split_mismatch");
    }

    #[test]
    fn store_failures_map_to_service_unavailable() {
        let err = LedgerError::StoreUnavailable("connection refused".into());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.to_string(), "store unavailable: connection refused");
    }
}
