//! Command definitions
//!
//! Commands represent intentions to change the system state.

use serde::{Deserialize, Serialize};

use crate::domain::{AccountId, Amount, CoreError, TransactionKind, UserId};

// =========================================================================
// TransactionIntent
// =========================================================================

/// A caller's requested money movement, before validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionIntent {
    /// Acting user, supplied by the identity layer
    pub user_id: UserId,
    /// Source account
    pub account_id: AccountId,
    /// Amount as received (string for precise decimal)
    pub amount: String,
    /// deposit | withdrawal | transfer | payment
    pub transaction_type: String,
    pub description: Option<String>,
    pub recipient_account_id: Option<AccountId>,
}

impl TransactionIntent {
    pub fn new(
        user_id: UserId,
        account_id: AccountId,
        amount: impl Into<String>,
        transaction_type: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            account_id,
            amount: amount.into(),
            transaction_type: transaction_type.into(),
            description: None,
            recipient_account_id: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_recipient(mut self, recipient_account_id: AccountId) -> Self {
        self.recipient_account_id = Some(recipient_account_id);
        self
    }

    /// Parse the amount and kind. Recipient rules are checked later, once
    /// the source account is known to exist and belong to the user.
    pub fn validate(self) -> Result<ValidatedIntent, CoreError> {
        let amount: Amount = self
            .amount
            .parse()
            .map_err(|e| CoreError::InvalidAmount(format!("{}", e)))?;

        let kind: TransactionKind = self
            .transaction_type
            .trim()
            .parse()
            .map_err(|_| CoreError::InvalidKind(self.transaction_type.clone()))?;

        Ok(ValidatedIntent {
            user_id: self.user_id,
            account_id: self.account_id,
            amount,
            kind,
            description: self.description.unwrap_or_default(),
            recipient_account_id: self.recipient_account_id,
        })
    }
}

/// Intent with a parsed amount and kind
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedIntent {
    pub user_id: UserId,
    pub account_id: AccountId,
    pub amount: Amount,
    pub kind: TransactionKind,
    pub description: String,
    pub recipient_account_id: Option<AccountId>,
}

impl ValidatedIntent {
    /// A transfer needs a recipient other than the source; nothing else
    /// takes one.
    pub fn check_recipient(&self) -> Result<(), CoreError> {
        match (self.kind.requires_recipient(), self.recipient_account_id) {
            (true, None) => Err(CoreError::MissingRecipient),
            (false, Some(_)) => Err(CoreError::UnexpectedRecipient),
            (true, Some(recipient)) if recipient == self.account_id => {
                Err(CoreError::SameAccountTransfer)
            }
            _ => Ok(()),
        }
    }

    /// Recipient whose row must be read, if any
    pub fn credited_recipient(&self) -> Option<AccountId> {
        self.recipient_account_id
            .filter(|id| self.kind.requires_recipient() && *id != self.account_id)
    }
}

// =========================================================================
// Results
// =========================================================================

/// Result of closing an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedAccount {
    pub account_id: AccountId,
    /// Account promoted to primary, if the closed one was primary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_primary: Option<AccountId>,
}
