//! Domain module
//!
//! Core domain types: accounts, ledger entries, amounts and typed ids.

pub mod account;
pub mod amount;
pub mod context;
pub mod error;
pub mod ids;
pub mod transaction;

pub use account::{Account, AccountPatch, AccountType, NewAccount};
pub use amount::{Amount, AmountError, MAX_BALANCE};
pub use context::OperationContext;
pub use error::CoreError;
pub use ids::{AccountId, IdError, TransactionId, UserId};
pub use transaction::{LedgerEntry, Page, TransactionKind, TransactionStatus, UnknownKind};
