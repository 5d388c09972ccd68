//! Ledger entries
//!
//! One entry is written per transaction attempt. Entries are never deleted;
//! their status only ever moves forward from `pending` to a terminal state.

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::amount::Amount;
use super::ids::{AccountId, TransactionId, UserId};

/// Length of the random suffix appended to every reference
const REFERENCE_SUFFIX_LEN: usize = 6;

/// Kind of money movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Transfer,
    Payment,
}

/// Error for a transaction type string outside the supported set
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown transaction type: {0:?}")]
pub struct UnknownKind(pub String);

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::Transfer => "transfer",
            TransactionKind::Payment => "payment",
        }
    }

    /// Whether the source account is debited. Payments leave the source
    /// account with no credited counterpart.
    pub fn debits_source(&self) -> bool {
        !matches!(self, TransactionKind::Deposit)
    }

    pub fn requires_recipient(&self) -> bool {
        matches!(self, TransactionKind::Transfer)
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionKind::Deposit),
            "withdrawal" => Ok(TransactionKind::Withdrawal),
            "transfer" => Ok(TransactionKind::Transfer),
            "payment" => Ok(TransactionKind::Payment),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}

/// Ledger entry status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// pending -> completed | failed; terminal states never change
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        matches!(self, TransactionStatus::Pending) && next.is_terminal()
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(format!("unknown transaction status: {other}")),
        }
    }
}

/// A ledger entry as persisted by the ledger store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: TransactionId,
    pub reference: String,
    pub user_id: UserId,
    pub account_id: AccountId,
    pub amount: Amount,
    pub transaction_type: TransactionKind,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_account_id: Option<AccountId>,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Create a new `pending` entry stamped with the current instant
    pub fn pending(
        user_id: UserId,
        account_id: AccountId,
        amount: Amount,
        transaction_type: TransactionKind,
        description: String,
        recipient_account_id: Option<AccountId>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TransactionId::new(),
            reference: generate_reference(now),
            user_id,
            account_id,
            amount,
            transaction_type,
            description,
            recipient_account_id,
            status: TransactionStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Copy of this entry moved to `status`
    pub fn with_status(&self, status: TransactionStatus, at: DateTime<Utc>) -> Self {
        Self {
            status,
            updated_at: at,
            ..self.clone()
        }
    }

    /// Whether `account_id` is the source or the recipient of this entry
    pub fn touches(&self, account_id: AccountId) -> bool {
        self.account_id == account_id || self.recipient_account_id == Some(account_id)
    }
}

/// Human-readable reference derived from the creation instant.
///
/// Format: `TXN<unix seconds>-<6 uppercase alphanumerics>`. The random suffix
/// keeps references distinct for entries created within the same second.
pub fn generate_reference(at: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REFERENCE_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect();
    format!("TXN{}-{}", at.timestamp(), suffix)
}

/// Paging window for ledger listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub skip: i64,
}

impl Page {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 200;

    /// Clamp caller-supplied values into a sane window
    pub fn new(limit: i64, skip: i64) -> Self {
        Self {
            limit: limit.clamp(1, Self::MAX_LIMIT),
            skip: skip.max(0),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LIMIT, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_kind_parse() {
        assert_eq!("transfer".parse::<TransactionKind>().unwrap(), TransactionKind::Transfer);
        let err = "refund".parse::<TransactionKind>().unwrap_err();
        assert_eq!(err, UnknownKind("refund".to_string()));
        // case matters: the wire format is lowercase only
        assert!("Deposit".parse::<TransactionKind>().is_err());
    }

    #[test]
    fn test_kind_direction() {
        assert!(!TransactionKind::Deposit.debits_source());
        assert!(TransactionKind::Withdrawal.debits_source());
        assert!(TransactionKind::Transfer.debits_source());
        assert!(TransactionKind::Payment.debits_source());
        assert!(TransactionKind::Transfer.requires_recipient());
        assert!(!TransactionKind::Payment.requires_recipient());
    }

    #[test]
    fn test_status_transitions() {
        use TransactionStatus::*;
        assert!(Pending.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Completed));
    }

    #[test]
    fn test_reference_format() {
        let at = DateTime::parse_from_rfc3339("2024-10-19T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let reference = generate_reference(at);

        let (prefix, suffix) = reference.split_once('-').unwrap();
        assert_eq!(prefix, format!("TXN{}", at.timestamp()));
        assert_eq!(suffix.len(), REFERENCE_SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_pending_entry() {
        let source = AccountId::new();
        let recipient = AccountId::new();
        let entry = LedgerEntry::pending(
            UserId::new(),
            source,
            Amount::new(dec!(40)).unwrap(),
            TransactionKind::Transfer,
            "rent".to_string(),
            Some(recipient),
        );

        assert_eq!(entry.status, TransactionStatus::Pending);
        assert!(entry.reference.starts_with("TXN"));
        assert!(entry.touches(source));
        assert!(entry.touches(recipient));
        assert!(!entry.touches(AccountId::new()));

        let done = entry.with_status(TransactionStatus::Completed, entry.created_at);
        assert_eq!(done.status, TransactionStatus::Completed);
        assert_eq!(done.id, entry.id);
    }

    #[test]
    fn test_entry_serialization_shape() {
        let entry = LedgerEntry::pending(
            UserId::new(),
            AccountId::new(),
            Amount::new(dec!(50)).unwrap(),
            TransactionKind::Deposit,
            String::new(),
            None,
        );
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["transaction_type"], "deposit");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["amount"], "50.00");
        assert!(json.get("recipient_account_id").is_none());
    }

    #[test]
    fn test_page_clamping() {
        assert_eq!(Page::default(), Page { limit: 50, skip: 0 });
        assert_eq!(Page::new(10_000, -3), Page { limit: 200, skip: 0 });
        assert_eq!(Page::new(0, 5), Page { limit: 1, skip: 5 });
    }
}
