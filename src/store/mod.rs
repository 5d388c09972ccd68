//! Store module
//!
//! Persistence interfaces consumed by the transaction coordinator and the
//! account manager. All access goes through a [`Session`]: one atomic unit of
//! work spanning both the account store and the ledger store, which either
//! commits as a whole or leaves no trace.

mod error;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::{
    Account, AccountId, AccountPatch, Amount, LedgerEntry, Page, TransactionId,
    TransactionStatus, UserId,
};

pub use error::{StoreError, StoreResult};
pub use memory::{FailPoint, MemoryStore};
pub use postgres::PgStore;

/// Outcome of a guarded debit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Debit {
    /// Balance covered the amount; holds the balance after the debit
    Applied(Decimal),
    /// Balance did not cover the amount; nothing changed
    Insufficient(Decimal),
}

/// Account records within a unit of work
#[async_trait]
pub trait AccountStore: Send {
    /// Fetch one account. Inside a unit of work the row stays locked until
    /// commit or rollback.
    async fn get(&mut self, id: AccountId) -> StoreResult<Account>;

    /// All accounts of a user, oldest first. Inside a unit of work the rows
    /// are locked in id order.
    async fn get_by_user(&mut self, user_id: UserId) -> StoreResult<Vec<Account>>;

    async fn insert(&mut self, account: &Account) -> StoreResult<()>;

    async fn update_fields(&mut self, id: AccountId, patch: &AccountPatch) -> StoreResult<Account>;

    async fn delete(&mut self, id: AccountId) -> StoreResult<()>;

    /// Serialize primary-flag changes for one user until the unit of work ends
    async fn lock_user(&mut self, user_id: UserId) -> StoreResult<()>;

    /// Unset `is_primary` on every account of the user except `keep`.
    /// Returns the number of accounts changed.
    async fn clear_primary(&mut self, user_id: UserId, keep: Option<AccountId>) -> StoreResult<u64>;

    /// Add `amount` to the balance; returns the new balance
    async fn credit(&mut self, id: AccountId, amount: &Amount) -> StoreResult<Decimal>;

    /// Subtract `amount` only if the balance covers it, as a single
    /// conditional write.
    async fn debit_if_sufficient(&mut self, id: AccountId, amount: &Amount) -> StoreResult<Debit>;
}

/// Ledger entries within a unit of work. There is no delete.
#[async_trait]
pub trait LedgerStore: Send {
    async fn get(&mut self, id: TransactionId) -> StoreResult<LedgerEntry>;

    /// Entries created by a user, newest first
    async fn get_by_user(&mut self, user_id: UserId, page: Page) -> StoreResult<Vec<LedgerEntry>>;

    /// Entries where the account is source or recipient, newest first
    async fn get_by_account(&mut self, account_id: AccountId, page: Page) -> StoreResult<Vec<LedgerEntry>>;

    async fn insert(&mut self, entry: &LedgerEntry) -> StoreResult<()>;

    /// Move a pending entry to a terminal status. Fails with
    /// `StoreError::Conflict` if the entry is already terminal.
    async fn update_status(&mut self, id: TransactionId, status: TransactionStatus) -> StoreResult<LedgerEntry>;

    /// Persist `entry` as failed: insert it if the aborted unit of work took
    /// it along, or flip it if it is still pending. Terminal entries are left
    /// untouched.
    async fn record_failure(&mut self, entry: &LedgerEntry) -> StoreResult<()>;
}

/// One atomic unit of work over both stores
#[async_trait]
pub trait Session: Send {
    fn accounts(&mut self) -> &mut dyn AccountStore;

    fn ledger(&mut self) -> &mut dyn LedgerStore;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// Handle to a store backend, injected into the core
#[async_trait]
pub trait Store: Send + Sync {
    /// Open a new unit of work
    async fn begin(&self) -> StoreResult<Box<dyn Session>>;

    /// Backend name for logs
    fn backend(&self) -> &'static str;
}

/// Roll back, logging instead of returning a rollback failure.
///
/// An unfinished unit of work is discarded by the backend anyway.
pub async fn discard(session: Box<dyn Session>) {
    if let Err(err) = session.rollback().await {
        tracing::warn!(error = %err, "Rollback failed");
    }
}

/// Commit on success, roll back on failure
pub async fn finish<T, E>(session: Box<dyn Session>, result: Result<T, E>) -> Result<T, E>
where
    E: From<StoreError>,
{
    match result {
        Ok(value) => {
            session.commit().await?;
            Ok(value)
        }
        Err(err) => {
            discard(session).await;
            Err(err)
        }
    }
}
