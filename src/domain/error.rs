//! Core Error Types
//!
//! Typed failures returned by the transaction coordinator and the account
//! manager. They are independent of the web layer; `AppError` maps them to
//! HTTP responses.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Amount missing, malformed, zero, negative or out of range
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Transaction type outside deposit/withdrawal/transfer/payment
    #[error("Invalid transaction type: {0}")]
    InvalidKind(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// The acting user does not own the record
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Recipient account ID is required for transfers")]
    MissingRecipient,

    #[error("Recipient account is only accepted for transfers")]
    UnexpectedRecipient,

    #[error("Recipient account not found: {0}")]
    RecipientNotFound(String),

    #[error("Cannot transfer to the same account")]
    SameAccountTransfer,

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },

    /// Deleting the user's only account
    #[error("Cannot delete the only account: {0}")]
    LastAccount(String),

    /// Clearing the primary flag directly would leave the user without one
    #[error("Account {0} is primary; mark another account primary instead")]
    PrimaryRequired(String),

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// An invariant check failed inside a unit of work
    #[error("Consistency violation: {0}")]
    ConsistencyViolation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CoreError {
    pub fn insufficient_funds(required: Decimal, available: Decimal) -> Self {
        Self::InsufficientFunds {
            required,
            available,
        }
    }

    pub fn invalid_field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }

    pub fn consistency(message: impl Into<String>) -> Self {
        Self::ConsistencyViolation(message.into())
    }

    /// Check if this is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Store(_) | Self::ConsistencyViolation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_insufficient_funds_error() {
        let err = CoreError::insufficient_funds(dec!(150), dec!(100));

        assert!(err.is_client_error());
        assert!(err.to_string().contains("150"));
        assert!(err.to_string().contains("100"));
    }

    #[test]
    fn test_store_errors_are_server_errors() {
        let err = CoreError::from(StoreError::Unavailable("primary down".to_string()));
        assert!(!err.is_client_error());
        assert!(!CoreError::consistency("two primaries").is_client_error());
    }

    #[test]
    fn test_invalid_field_message() {
        let err = CoreError::invalid_field("ifsc_code", "must not be empty");
        assert_eq!(err.to_string(), "Invalid field ifsc_code: must not be empty");
    }
}
