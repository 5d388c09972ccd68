//! Store Errors
//!
//! Error types for account and ledger persistence.

use std::time::Duration;

/// Errors that can occur in a store backend
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Record does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Write rejected because the record is not in the expected state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Persisted data could not be mapped back into domain types
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    /// Backend unreachable or refusing work
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Balance change would leave the range an account can hold
    #[error("Balance of account {0} would exceed its limit")]
    BalanceOverflow(String),

    /// Unit of work exceeded its time budget
    #[error("Unit of work timed out after {0:?}")]
    Timeout(Duration),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Check if the caller may safely retry the whole operation
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::Database(_) | StoreError::Unavailable(_) | StoreError::Timeout(_)
        )
    }
}

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
