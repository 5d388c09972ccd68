//! Transaction Handler
//!
//! Executes money-movement intents: validates funds and ownership, then
//! mutates balances and writes the ledger entry in one unit of work.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::domain::{
    Account, AccountId, CoreError, LedgerEntry, OperationContext, TransactionStatus, MAX_BALANCE,
};
use crate::store::{self, AccountStore, Debit, Session, Store, StoreError};

use super::{TransactionIntent, ValidatedIntent};

/// Default time budget for one unit of work
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Balances observed while checking preconditions
#[derive(Debug, Clone, Copy)]
struct Snapshot {
    source: Decimal,
    recipient: Option<Decimal>,
}

/// Why an execution stopped
enum Failure {
    /// A precondition failed; nothing was written
    Rejected(CoreError),
    /// The atomic phase failed or timed out; the entry must be recorded as failed
    Aborted(CoreError),
}

// =========================================================================
// TransactionCoordinator
// =========================================================================

/// Coordinator for deposits, withdrawals, transfers and payments.
///
/// Holds no state of its own beyond the injected store handle.
#[derive(Clone)]
pub struct TransactionCoordinator {
    store: Arc<dyn Store>,
    timeout: Duration,
}

impl TransactionCoordinator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Execute an intent and return the completed ledger entry.
    ///
    /// Callers only ever see terminal outcomes: either the committed,
    /// `completed` entry or an error. When the atomic phase fails, balances
    /// are rolled back and the entry is persisted as `failed` on a best-effort
    /// basis.
    pub async fn execute(
        &self,
        intent: TransactionIntent,
        context: &OperationContext,
    ) -> Result<LedgerEntry, CoreError> {
        let intent = intent.validate()?;
        let entry = LedgerEntry::pending(
            intent.user_id,
            intent.account_id,
            intent.amount,
            intent.kind,
            intent.description.clone(),
            intent.recipient_account_id,
        );

        match self.run(&intent, &entry).await {
            Ok(completed) => {
                tracing::info!(
                    transaction_id = %completed.id,
                    reference = %completed.reference,
                    kind = %completed.transaction_type,
                    amount = %completed.amount,
                    account_id = %completed.account_id,
                    correlation_id = ?context.correlation_id,
                    "Transaction completed"
                );
                Ok(completed)
            }
            Err(Failure::Rejected(err)) => {
                tracing::debug!(
                    account_id = %intent.account_id,
                    kind = %intent.kind,
                    correlation_id = ?context.correlation_id,
                    error = %err,
                    "Transaction rejected"
                );
                Err(err)
            }
            Err(Failure::Aborted(err)) => {
                let retryable = matches!(&err, CoreError::Store(e) if e.is_retryable());
                tracing::warn!(
                    transaction_id = %entry.id,
                    reference = %entry.reference,
                    correlation_id = ?context.correlation_id,
                    client_error = err.is_client_error(),
                    retryable,
                    error = %err,
                    "Transaction aborted, recording failure"
                );
                self.record_failure(&entry, context).await;
                Err(err)
            }
        }
    }

    /// Stage the unit of work under the deadline, then commit. The deadline
    /// never interrupts a commit.
    async fn run(&self, intent: &ValidatedIntent, entry: &LedgerEntry) -> Result<LedgerEntry, Failure> {
        let (session, completed) = tokio::time::timeout(self.timeout, self.stage(intent, entry))
            .await
            .map_err(|_| Failure::Aborted(StoreError::Timeout(self.timeout).into()))??;

        session
            .commit()
            .await
            .map_err(|e| Failure::Aborted(e.into()))?;
        Ok(completed)
    }

    /// Everything before commit. A session dropped here by the deadline is
    /// rolled back by its backend.
    async fn stage(
        &self,
        intent: &ValidatedIntent,
        entry: &LedgerEntry,
    ) -> Result<(Box<dyn Session>, LedgerEntry), Failure> {
        let mut session = self
            .store
            .begin()
            .await
            .map_err(|e| Failure::Rejected(e.into()))?;

        let snapshot = match check_preconditions(session.accounts(), intent).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                store::discard(session).await;
                return Err(Failure::Rejected(err));
            }
        };

        match apply(session.as_mut(), entry, snapshot).await {
            Ok(completed) => Ok((session, completed)),
            Err(err) => {
                store::discard(session).await;
                Err(Failure::Aborted(err))
            }
        }
    }

    /// Persist the entry as failed in a fresh unit of work, outside the
    /// aborted one. Failures here are only logged.
    async fn record_failure(&self, entry: &LedgerEntry, context: &OperationContext) {
        let result: Result<(), StoreError> = async {
            let mut session = self.store.begin().await?;
            let recorded = session.ledger().record_failure(entry).await;
            store::finish(session, recorded).await
        }
        .await;

        if let Err(err) = result {
            tracing::error!(
                transaction_id = %entry.id,
                reference = %entry.reference,
                correlation_id = ?context.correlation_id,
                error = %err,
                "Failed to record failed transaction"
            );
        }
    }
}

/// Fetch an account, mapping a missing row to `None`
async fn find_account(
    accounts: &mut dyn AccountStore,
    id: AccountId,
) -> Result<Option<Account>, CoreError> {
    match accounts.get(id).await {
        Ok(account) => Ok(Some(account)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Check ownership, recipient rules, recipient existence and funds, in
/// that order.
///
/// Source and recipient are read in id order so that concurrent transfers
/// in opposite directions lock rows in the same order.
async fn check_preconditions(
    accounts: &mut dyn AccountStore,
    intent: &ValidatedIntent,
) -> Result<Snapshot, CoreError> {
    let recipient_id = intent.credited_recipient();
    let (source, recipient) = match recipient_id {
        Some(recipient_id) if recipient_id < intent.account_id => {
            let recipient = find_account(accounts, recipient_id).await?;
            let source = find_account(accounts, intent.account_id).await?;
            (source, recipient)
        }
        Some(recipient_id) => {
            let source = find_account(accounts, intent.account_id).await?;
            let recipient = find_account(accounts, recipient_id).await?;
            (source, recipient)
        }
        None => (find_account(accounts, intent.account_id).await?, None),
    };

    let source = source.ok_or_else(|| CoreError::AccountNotFound(intent.account_id.to_string()))?;
    if !source.is_owned_by(intent.user_id) {
        return Err(CoreError::AccessDenied(format!(
            "account {} does not belong to the requesting user",
            source.id
        )));
    }

    intent.check_recipient()?;

    let recipient_balance = match recipient_id {
        Some(recipient_id) => {
            let recipient =
                recipient.ok_or_else(|| CoreError::RecipientNotFound(recipient_id.to_string()))?;
            if intent.amount.credited_to(recipient.balance).is_none() {
                return Err(balance_limit(recipient_id));
            }
            Some(recipient.balance)
        }
        None => None,
    };

    if intent.kind.debits_source() {
        if !intent.amount.is_covered_by(source.balance) {
            return Err(CoreError::insufficient_funds(intent.amount.value(), source.balance));
        }
    } else if intent.amount.credited_to(source.balance).is_none() {
        return Err(balance_limit(intent.account_id));
    }

    Ok(Snapshot {
        source: source.balance,
        recipient: recipient_balance,
    })
}

fn balance_limit(account_id: AccountId) -> CoreError {
    CoreError::InvalidAmount(format!(
        "account {} would exceed the maximum balance ({})",
        account_id, MAX_BALANCE
    ))
}

/// The atomic phase: insert pending, move money, complete
async fn apply(
    session: &mut dyn Session,
    entry: &LedgerEntry,
    before: Snapshot,
) -> Result<LedgerEntry, CoreError> {
    let amount = entry.amount;
    session.ledger().insert(entry).await?;

    let source_after = if entry.transaction_type.debits_source() {
        match session
            .accounts()
            .debit_if_sufficient(entry.account_id, &amount)
            .await?
        {
            Debit::Applied(balance) => balance,
            Debit::Insufficient(available) => {
                return Err(CoreError::insufficient_funds(amount.value(), available))
            }
        }
    } else {
        session.accounts().credit(entry.account_id, &amount).await?
    };

    let expected_source = if entry.transaction_type.debits_source() {
        amount.debited_from(before.source)
    } else {
        amount.credited_to(before.source)
    };
    let Some(expected_source) = expected_source else {
        return Err(CoreError::consistency(format!(
            "account {} balance {} cannot absorb {}",
            entry.account_id, before.source, amount
        )));
    };
    if source_after != expected_source {
        return Err(CoreError::consistency(format!(
            "account {} balance is {}, expected {}",
            entry.account_id, source_after, expected_source
        )));
    }

    if let (Some(recipient_id), Some(recipient_before)) =
        (entry.recipient_account_id, before.recipient)
    {
        let recipient_after = session.accounts().credit(recipient_id, &amount).await?;
        let combined_after = source_after.checked_add(recipient_after);
        if combined_after.is_none() || combined_after != before.source.checked_add(recipient_before) {
            return Err(CoreError::consistency(format!(
                "transfer {} did not conserve the combined balance",
                entry.reference
            )));
        }
    }

    let completed = session
        .ledger()
        .update_status(entry.id, TransactionStatus::Completed)
        .await?;

    tracing::debug!(
        transaction_id = %entry.id,
        balance = %source_after,
        "Balances updated"
    );

    Ok(completed)
}
