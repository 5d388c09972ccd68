//! In-memory store
//!
//! A store backend kept entirely in process memory. A session holds the
//! store-wide lock for its whole lifetime and works on a private copy of the
//! state, so units of work are fully serialized and a rollback simply drops
//! the copy. Used by the test suites, the load tool, and by the server when
//! no database is configured.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::{
    Account, AccountId, AccountPatch, Amount, LedgerEntry, Page, TransactionId,
    TransactionStatus, UserId,
};

use super::{AccountStore, Debit, LedgerStore, Session, Store, StoreError, StoreResult};

/// Fault to inject into every session until cleared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    Credit,
    Debit,
    LedgerInsert,
    StatusUpdate,
    Commit,
    RecordFailure,
    /// Sleep this long before applying each credit
    SlowCredit(Duration),
    /// Sleep this long before a commit takes effect
    SlowCommit(Duration),
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    accounts: HashMap<AccountId, Account>,
    entries: HashMap<TransactionId, LedgerEntry>,
    fail_point: Option<FailPoint>,
}

/// In-memory store handle. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following session fail at `point` (or stop failing)
    pub async fn inject_failure(&self, point: Option<FailPoint>) {
        self.state.lock().await.fail_point = point;
    }

    /// Committed view of one account
    pub async fn account(&self, id: AccountId) -> Option<Account> {
        self.state.lock().await.accounts.get(&id).cloned()
    }

    /// Committed view of one ledger entry
    pub async fn entry(&self, id: TransactionId) -> Option<LedgerEntry> {
        self.state.lock().await.entries.get(&id).cloned()
    }

    /// Committed ledger, oldest first
    pub async fn entries(&self) -> Vec<LedgerEntry> {
        let state = self.state.lock().await;
        let mut entries: Vec<LedgerEntry> = state.entries.values().cloned().collect();
        entries.sort_by_key(|e| (e.created_at, e.id));
        entries
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn Session>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemorySession { guard, working }))
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

struct MemorySession {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

impl MemorySession {
    fn check(&self, point: FailPoint) -> StoreResult<()> {
        if self.working.fail_point == Some(point) {
            return Err(StoreError::Unavailable(format!("injected failure at {point:?}")));
        }
        Ok(())
    }

    fn account_mut(&mut self, id: AccountId) -> StoreResult<&mut Account> {
        self.working
            .accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("account", id))
    }

    fn newest_first<F>(&self, page: Page, keep: F) -> Vec<LedgerEntry>
    where
        F: Fn(&LedgerEntry) -> bool,
    {
        let mut entries: Vec<&LedgerEntry> =
            self.working.entries.values().filter(|e| keep(e)).collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        entries
            .into_iter()
            .skip(usize::try_from(page.skip).unwrap_or(0))
            .take(usize::try_from(page.limit).unwrap_or(0))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AccountStore for MemorySession {
    async fn get(&mut self, id: AccountId) -> StoreResult<Account> {
        self.working
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("account", id))
    }

    async fn get_by_user(&mut self, user_id: UserId) -> StoreResult<Vec<Account>> {
        let mut accounts: Vec<Account> = self
            .working
            .accounts
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        accounts.sort_by_key(|a| (a.created_at, a.id));
        Ok(accounts)
    }

    async fn insert(&mut self, account: &Account) -> StoreResult<()> {
        if self.working.accounts.contains_key(&account.id) {
            return Err(StoreError::Conflict(format!("account {} already exists", account.id)));
        }
        self.working.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn update_fields(&mut self, id: AccountId, patch: &AccountPatch) -> StoreResult<Account> {
        let account = self.account_mut(id)?;
        account.apply_patch(patch, Utc::now());
        Ok(account.clone())
    }

    async fn delete(&mut self, id: AccountId) -> StoreResult<()> {
        self.working
            .accounts
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("account", id))
    }

    async fn lock_user(&mut self, _user_id: UserId) -> StoreResult<()> {
        // the session already holds the store-wide lock
        Ok(())
    }

    async fn clear_primary(&mut self, user_id: UserId, keep: Option<AccountId>) -> StoreResult<u64> {
        let now = Utc::now();
        let mut changed = 0;
        for account in self.working.accounts.values_mut() {
            if account.user_id == user_id && account.is_primary && Some(account.id) != keep {
                account.is_primary = false;
                account.updated_at = now;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn credit(&mut self, id: AccountId, amount: &Amount) -> StoreResult<Decimal> {
        if let Some(FailPoint::SlowCredit(delay)) = self.working.fail_point {
            tokio::time::sleep(delay).await;
        }
        self.check(FailPoint::Credit)?;

        let account = self.account_mut(id)?;
        account.balance = amount
            .credited_to(account.balance)
            .ok_or_else(|| StoreError::BalanceOverflow(id.to_string()))?;
        account.updated_at = Utc::now();
        Ok(account.balance)
    }

    async fn debit_if_sufficient(&mut self, id: AccountId, amount: &Amount) -> StoreResult<Debit> {
        self.check(FailPoint::Debit)?;

        let account = self.account_mut(id)?;
        if !amount.is_covered_by(account.balance) {
            return Ok(Debit::Insufficient(account.balance));
        }
        account.balance = amount
            .debited_from(account.balance)
            .ok_or_else(|| StoreError::BalanceOverflow(id.to_string()))?;
        account.updated_at = Utc::now();
        Ok(Debit::Applied(account.balance))
    }
}

#[async_trait]
impl LedgerStore for MemorySession {
    async fn get(&mut self, id: TransactionId) -> StoreResult<LedgerEntry> {
        self.working
            .entries
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("transaction", id))
    }

    async fn get_by_user(&mut self, user_id: UserId, page: Page) -> StoreResult<Vec<LedgerEntry>> {
        Ok(self.newest_first(page, |e| e.user_id == user_id))
    }

    async fn get_by_account(&mut self, account_id: AccountId, page: Page) -> StoreResult<Vec<LedgerEntry>> {
        Ok(self.newest_first(page, |e| e.touches(account_id)))
    }

    async fn insert(&mut self, entry: &LedgerEntry) -> StoreResult<()> {
        self.check(FailPoint::LedgerInsert)?;

        if self.working.entries.contains_key(&entry.id) {
            return Err(StoreError::Conflict(format!("transaction {} already exists", entry.id)));
        }
        self.working.entries.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn update_status(&mut self, id: TransactionId, status: TransactionStatus) -> StoreResult<LedgerEntry> {
        self.check(FailPoint::StatusUpdate)?;

        let entry = self
            .working
            .entries
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("transaction", id))?;
        if !entry.status.can_transition_to(status) {
            return Err(StoreError::Conflict(format!(
                "transaction {} cannot move from {} to {}",
                id, entry.status, status
            )));
        }
        entry.status = status;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    async fn record_failure(&mut self, entry: &LedgerEntry) -> StoreResult<()> {
        self.check(FailPoint::RecordFailure)?;

        let now = Utc::now();
        match self.working.entries.get_mut(&entry.id) {
            Some(existing) if existing.status == TransactionStatus::Pending => {
                existing.status = TransactionStatus::Failed;
                existing.updated_at = now;
            }
            Some(_) => {}
            None => {
                self.working
                    .entries
                    .insert(entry.id, entry.with_status(TransactionStatus::Failed, now));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Session for MemorySession {
    fn accounts(&mut self) -> &mut dyn AccountStore {
        self
    }

    fn ledger(&mut self) -> &mut dyn LedgerStore {
        self
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        if let Some(FailPoint::SlowCommit(delay)) = self.working.fail_point {
            tokio::time::sleep(delay).await;
        }
        self.check(FailPoint::Commit)?;

        let MemorySession { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
