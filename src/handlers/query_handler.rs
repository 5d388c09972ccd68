//! Query Handler
//!
//! Read side of the ledger: single entries and paged history.

use std::sync::Arc;

use crate::domain::{AccountId, CoreError, LedgerEntry, Page, TransactionId, UserId};
use crate::store::{self, Store};

use super::account_handler::owned_account;

/// Ledger lookups scoped to the requesting user
#[derive(Clone)]
pub struct LedgerQueries {
    store: Arc<dyn Store>,
}

impl LedgerQueries {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// One entry, visible only to the user who created it
    pub async fn get_transaction(
        &self,
        user_id: UserId,
        transaction_id: TransactionId,
    ) -> Result<LedgerEntry, CoreError> {
        let mut session = self.store.begin().await?;
        let result = session.ledger().get(transaction_id).await.map_err(|err| {
            if err.is_not_found() {
                CoreError::TransactionNotFound(transaction_id.to_string())
            } else {
                err.into()
            }
        });
        let entry = store::finish(session, result).await?;

        if entry.user_id != user_id {
            return Err(CoreError::AccessDenied(format!(
                "transaction {} does not belong to the requesting user",
                transaction_id
            )));
        }
        Ok(entry)
    }

    /// History, newest first. With `account_id`, every entry where that
    /// account is source or recipient (the account must belong to the user);
    /// otherwise every entry the user created.
    pub async fn list_transactions(
        &self,
        user_id: UserId,
        account_id: Option<AccountId>,
        page: Page,
    ) -> Result<Vec<LedgerEntry>, CoreError> {
        let mut session = self.store.begin().await?;

        let result = match account_id {
            Some(account_id) => match owned_account(session.as_mut(), user_id, account_id).await {
                Ok(_) => session
                    .ledger()
                    .get_by_account(account_id, page)
                    .await
                    .map_err(CoreError::from),
                Err(err) => Err(err),
            },
            None => session
                .ledger()
                .get_by_user(user_id, page)
                .await
                .map_err(CoreError::from),
        };

        store::finish(session, result).await
    }
}
