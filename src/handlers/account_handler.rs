//! Account Handler
//!
//! Account lifecycle with the "exactly one primary account per user" rule
//! enforced inside every unit of work that touches the primary flag.

use std::sync::Arc;

use crate::domain::{
    Account, AccountId, AccountPatch, CoreError, NewAccount, OperationContext, UserId,
};
use crate::store::{self, Session, Store, StoreError};

use super::ClosedAccount;

/// Map a missing account row to the domain error
pub(crate) fn account_not_found(id: AccountId) -> impl FnOnce(StoreError) -> CoreError {
    move |err| {
        if err.is_not_found() {
            CoreError::AccountNotFound(id.to_string())
        } else {
            err.into()
        }
    }
}

/// Load an account and check that `user_id` owns it
pub(crate) async fn owned_account(
    session: &mut dyn Session,
    user_id: UserId,
    account_id: AccountId,
) -> Result<Account, CoreError> {
    let account = session
        .accounts()
        .get(account_id)
        .await
        .map_err(account_not_found(account_id))?;

    if !account.is_owned_by(user_id) {
        return Err(CoreError::AccessDenied(format!(
            "account {} does not belong to the requesting user",
            account_id
        )));
    }
    Ok(account)
}

// =========================================================================
// AccountManager
// =========================================================================

/// Opens, edits, closes and lists accounts
#[derive(Clone)]
pub struct AccountManager {
    store: Arc<dyn Store>,
}

impl AccountManager {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Open an account. The user's first account is always primary; asking
    /// for primary on a later one demotes the current primary.
    pub async fn open_account(
        &self,
        user_id: UserId,
        details: NewAccount,
        context: &OperationContext,
    ) -> Result<Account, CoreError> {
        details.validate()?;

        let mut session = self.store.begin().await?;
        let result = open_in(session.as_mut(), user_id, details).await;
        let account = store::finish(session, result).await?;

        tracing::info!(
            account_id = %account.id,
            user_id = %user_id,
            is_primary = account.is_primary,
            correlation_id = ?context.correlation_id,
            "Account opened"
        );
        Ok(account)
    }

    /// Edit holder/bank/ifsc/type or promote the account to primary
    pub async fn update_account(
        &self,
        user_id: UserId,
        account_id: AccountId,
        patch: AccountPatch,
        context: &OperationContext,
    ) -> Result<Account, CoreError> {
        patch.validate()?;

        let mut session = self.store.begin().await?;
        let result = update_in(session.as_mut(), user_id, account_id, &patch).await;
        let account = store::finish(session, result).await?;

        tracing::info!(
            account_id = %account_id,
            user_id = %user_id,
            correlation_id = ?context.correlation_id,
            "Account updated"
        );
        Ok(account)
    }

    /// Delete an account. The user's last account cannot be deleted; a
    /// deleted primary hands the flag to the oldest remaining account.
    pub async fn close_account(
        &self,
        user_id: UserId,
        account_id: AccountId,
        context: &OperationContext,
    ) -> Result<ClosedAccount, CoreError> {
        let mut session = self.store.begin().await?;
        let result = close_in(session.as_mut(), user_id, account_id).await;
        let closed = store::finish(session, result).await?;

        tracing::info!(
            account_id = %account_id,
            user_id = %user_id,
            new_primary = ?closed.new_primary,
            correlation_id = ?context.correlation_id,
            "Account closed"
        );
        Ok(closed)
    }

    pub async fn get_account(&self, user_id: UserId, account_id: AccountId) -> Result<Account, CoreError> {
        let mut session = self.store.begin().await?;
        let result = owned_account(session.as_mut(), user_id, account_id).await;
        store::finish(session, result).await
    }

    /// All accounts of a user, oldest first
    pub async fn list_accounts(&self, user_id: UserId) -> Result<Vec<Account>, CoreError> {
        let mut session = self.store.begin().await?;
        let result = session.accounts().get_by_user(user_id).await.map_err(CoreError::from);
        store::finish(session, result).await
    }
}

async fn open_in(
    session: &mut dyn Session,
    user_id: UserId,
    details: NewAccount,
) -> Result<Account, CoreError> {
    session.accounts().lock_user(user_id).await?;

    let existing = session.accounts().get_by_user(user_id).await?;
    let is_primary = existing.is_empty() || details.is_primary;
    if is_primary && !existing.is_empty() {
        session.accounts().clear_primary(user_id, None).await?;
    }

    let account = Account::open(user_id, details, is_primary);
    session.accounts().insert(&account).await?;

    ensure_single_primary(session, user_id).await?;
    Ok(account)
}

async fn update_in(
    session: &mut dyn Session,
    user_id: UserId,
    account_id: AccountId,
    patch: &AccountPatch,
) -> Result<Account, CoreError> {
    session.accounts().lock_user(user_id).await?;
    // Row locks in id order before any single-row lock
    session.accounts().get_by_user(user_id).await?;
    let account = owned_account(session, user_id, account_id).await?;

    match patch.is_primary {
        Some(false) if account.is_primary => {
            return Err(CoreError::PrimaryRequired(account_id.to_string()));
        }
        Some(true) if !account.is_primary => {
            session.accounts().clear_primary(user_id, Some(account_id)).await?;
        }
        _ => {}
    }

    let updated = session
        .accounts()
        .update_fields(account_id, patch)
        .await
        .map_err(account_not_found(account_id))?;

    ensure_single_primary(session, user_id).await?;
    Ok(updated)
}

async fn close_in(
    session: &mut dyn Session,
    user_id: UserId,
    account_id: AccountId,
) -> Result<ClosedAccount, CoreError> {
    session.accounts().lock_user(user_id).await?;
    // Row locks in id order before any single-row lock
    let accounts = session.accounts().get_by_user(user_id).await?;
    let account = owned_account(session, user_id, account_id).await?;

    let remaining: Vec<Account> = accounts.into_iter().filter(|a| a.id != account_id).collect();

    if remaining.is_empty() {
        return Err(CoreError::LastAccount(account_id.to_string()));
    }

    session
        .accounts()
        .delete(account_id)
        .await
        .map_err(account_not_found(account_id))?;

    // Accounts come back oldest first
    let new_primary = if account.is_primary {
        let successor = remaining[0].id;
        session
            .accounts()
            .update_fields(successor, &AccountPatch::primary(true))
            .await?;
        Some(successor)
    } else {
        None
    };

    ensure_single_primary(session, user_id).await?;
    Ok(ClosedAccount {
        account_id,
        new_primary,
    })
}

/// Fail the unit of work unless the user has exactly one primary account
/// (or no accounts at all)
async fn ensure_single_primary(session: &mut dyn Session, user_id: UserId) -> Result<(), CoreError> {
    let accounts = session.accounts().get_by_user(user_id).await?;
    let primaries = accounts.iter().filter(|a| a.is_primary).count();

    if !accounts.is_empty() && primaries != 1 {
        return Err(CoreError::consistency(format!(
            "user {} has {} primary accounts",
            user_id, primaries
        )));
    }
    Ok(())
}
