//! PostgreSQL store
//!
//! Each session wraps one database transaction. Account rows read inside a
//! session are locked with `FOR UPDATE`; debits are a single conditional
//! `UPDATE ... WHERE balance >= amount`; per-user primary-flag changes are
//! serialized with a transaction-scoped advisory lock.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::domain::{
    Account, AccountId, AccountPatch, Amount, LedgerEntry, Page, TransactionId,
    TransactionStatus, UserId,
};

use super::{AccountStore, Debit, LedgerStore, Session, Store, StoreError, StoreResult};

const ACCOUNT_COLUMNS: &str = "id, user_id, account_number, account_holder_name, bank_name, \
     ifsc_code, account_type, balance, is_primary, created_at, updated_at";

const ENTRY_COLUMNS: &str = "id, reference, user_id, account_id, amount, transaction_type, \
     description, recipient_account_id, status, created_at, updated_at";

/// PostgreSQL store handle
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn Session>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgSession { tx }))
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

struct PgSession {
    tx: Transaction<'static, Postgres>,
}

/// SQLSTATE 22003: the balance left the range of its NUMERIC column
fn is_numeric_overflow(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("22003"))
}

fn account_from_row(row: &PgRow) -> StoreResult<Account> {
    let account_type: String = row.try_get("account_type")?;
    Ok(Account {
        id: AccountId::from(row.try_get::<Uuid, _>("id")?),
        user_id: UserId::from(row.try_get::<Uuid, _>("user_id")?),
        account_number: row.try_get("account_number")?,
        account_holder_name: row.try_get("account_holder_name")?,
        bank_name: row.try_get("bank_name")?,
        ifsc_code: row.try_get("ifsc_code")?,
        account_type: account_type.parse().map_err(StoreError::InvalidData)?,
        balance: row.try_get("balance")?,
        is_primary: row.try_get("is_primary")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn entry_from_row(row: &PgRow) -> StoreResult<LedgerEntry> {
    let amount: Decimal = row.try_get("amount")?;
    let kind: String = row.try_get("transaction_type")?;
    let status: String = row.try_get("status")?;
    let recipient: Option<Uuid> = row.try_get("recipient_account_id")?;

    Ok(LedgerEntry {
        id: TransactionId::from(row.try_get::<Uuid, _>("id")?),
        reference: row.try_get("reference")?,
        user_id: UserId::from(row.try_get::<Uuid, _>("user_id")?),
        account_id: AccountId::from(row.try_get::<Uuid, _>("account_id")?),
        amount: Amount::new(amount).map_err(|e| StoreError::InvalidData(e.to_string()))?,
        transaction_type: kind
            .parse()
            .map_err(|e: crate::domain::UnknownKind| StoreError::InvalidData(e.to_string()))?,
        description: row.try_get("description")?,
        recipient_account_id: recipient.map(AccountId::from),
        status: status.parse().map_err(StoreError::InvalidData)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl AccountStore for PgSession {
    async fn get(&mut self, id: AccountId) -> StoreResult<Account> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| StoreError::not_found("account", id))?;

        account_from_row(&row)
    }

    async fn get_by_user(&mut self, user_id: UserId) -> StoreResult<Vec<Account>> {
        // Lock in id order, the same order transfers use, then sort by age
        let rows = sqlx::query(&format!(
            r#"
            WITH locked AS (
                SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = $1 ORDER BY id FOR UPDATE
            )
            SELECT {ACCOUNT_COLUMNS} FROM locked ORDER BY created_at, id
            "#
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(account_from_row).collect()
    }

    async fn insert(&mut self, account: &Account) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (
                id, user_id, account_number, account_holder_name, bank_name,
                ifsc_code, account_type, balance, is_primary, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(account.id.as_uuid())
        .bind(account.user_id.as_uuid())
        .bind(&account.account_number)
        .bind(&account.account_holder_name)
        .bind(&account.bank_name)
        .bind(&account.ifsc_code)
        .bind(account.account_type.as_str())
        .bind(account.balance)
        .bind(account.is_primary)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn update_fields(&mut self, id: AccountId, patch: &AccountPatch) -> StoreResult<Account> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE accounts
            SET
                account_holder_name = COALESCE($2, account_holder_name),
                bank_name = COALESCE($3, bank_name),
                ifsc_code = COALESCE($4, ifsc_code),
                account_type = COALESCE($5, account_type),
                is_primary = COALESCE($6, is_primary),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(patch.account_holder_name.as_deref())
        .bind(patch.bank_name.as_deref())
        .bind(patch.ifsc_code.as_deref())
        .bind(patch.account_type.map(|t| t.as_str()))
        .bind(patch.is_primary)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| StoreError::not_found("account", id))?;

        account_from_row(&row)
    }

    async fn delete(&mut self, id: AccountId) -> StoreResult<()> {
        let rows_affected = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?
            .rows_affected();

        if rows_affected == 0 {
            return Err(StoreError::not_found("account", id));
        }
        Ok(())
    }

    async fn lock_user(&mut self, user_id: UserId) -> StoreResult<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(user_id.to_string())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn clear_primary(&mut self, user_id: UserId, keep: Option<AccountId>) -> StoreResult<u64> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE accounts
            SET is_primary = false, updated_at = NOW()
            WHERE user_id = $1 AND is_primary AND ($2::uuid IS NULL OR id <> $2)
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(keep.map(|id| id.as_uuid()))
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        Ok(rows_affected)
    }

    async fn credit(&mut self, id: AccountId, amount: &Amount) -> StoreResult<Decimal> {
        let balance: Option<Decimal> = sqlx::query_scalar(
            r#"
            UPDATE accounts
            SET balance = balance + $2, updated_at = NOW()
            WHERE id = $1
            RETURNING balance
            "#,
        )
        .bind(id.as_uuid())
        .bind(amount.value())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|err| {
            if is_numeric_overflow(&err) {
                StoreError::BalanceOverflow(id.to_string())
            } else {
                err.into()
            }
        })?;

        balance.ok_or_else(|| StoreError::not_found("account", id))
    }

    async fn debit_if_sufficient(&mut self, id: AccountId, amount: &Amount) -> StoreResult<Debit> {
        let balance: Option<Decimal> = sqlx::query_scalar(
            r#"
            UPDATE accounts
            SET balance = balance - $2, updated_at = NOW()
            WHERE id = $1 AND balance >= $2
            RETURNING balance
            "#,
        )
        .bind(id.as_uuid())
        .bind(amount.value())
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(balance) = balance {
            return Ok(Debit::Applied(balance));
        }

        // Either the guard rejected the debit or the row is gone
        let current: Option<Decimal> = sqlx::query_scalar("SELECT balance FROM accounts WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;

        current
            .map(Debit::Insufficient)
            .ok_or_else(|| StoreError::not_found("account", id))
    }
}

#[async_trait]
impl LedgerStore for PgSession {
    async fn get(&mut self, id: TransactionId) -> StoreResult<LedgerEntry> {
        let row = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM transactions WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| StoreError::not_found("transaction", id))?;

        entry_from_row(&row)
    }

    async fn get_by_user(&mut self, user_id: UserId, page: Page) -> StoreResult<Vec<LedgerEntry>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ENTRY_COLUMNS} FROM transactions
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(user_id.as_uuid())
        .bind(page.limit)
        .bind(page.skip)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn get_by_account(&mut self, account_id: AccountId, page: Page) -> StoreResult<Vec<LedgerEntry>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ENTRY_COLUMNS} FROM transactions
            WHERE account_id = $1 OR recipient_account_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(account_id.as_uuid())
        .bind(page.limit)
        .bind(page.skip)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn insert(&mut self, entry: &LedgerEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, reference, user_id, account_id, amount, transaction_type,
                description, recipient_account_id, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(&entry.reference)
        .bind(entry.user_id.as_uuid())
        .bind(entry.account_id.as_uuid())
        .bind(entry.amount.value())
        .bind(entry.transaction_type.as_str())
        .bind(&entry.description)
        .bind(entry.recipient_account_id.map(|id| id.as_uuid()))
        .bind(entry.status.as_str())
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn update_status(&mut self, id: TransactionId, status: TransactionStatus) -> StoreResult<LedgerEntry> {
        if !TransactionStatus::Pending.can_transition_to(status) {
            return Err(StoreError::Conflict(format!("{status} is not a terminal status")));
        }

        let row = sqlx::query(&format!(
            r#"
            UPDATE transactions
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {ENTRY_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(status.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => entry_from_row(&row),
            None => {
                // Distinguish a missing entry from a terminal one
                let current = LedgerStore::get(self, id).await?;
                Err(StoreError::Conflict(format!(
                    "transaction {} cannot move from {} to {}",
                    id, current.status, status
                )))
            }
        }
    }

    async fn record_failure(&mut self, entry: &LedgerEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, reference, user_id, account_id, amount, transaction_type,
                description, recipient_account_id, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'failed', $9, NOW())
            ON CONFLICT (id) DO UPDATE
            SET status = 'failed', updated_at = NOW()
            WHERE transactions.status = 'pending'
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(&entry.reference)
        .bind(entry.user_id.as_uuid())
        .bind(entry.account_id.as_uuid())
        .bind(entry.amount.value())
        .bind(entry.transaction_type.as_str())
        .bind(&entry.description)
        .bind(entry.recipient_account_id.map(|id| id.as_uuid()))
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl Session for PgSession {
    fn accounts(&mut self) -> &mut dyn AccountStore {
        self
    }

    fn ledger(&mut self) -> &mut dyn LedgerStore {
        self
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_lists_match_insert_order() {
        assert_eq!(ACCOUNT_COLUMNS.split(',').count(), 11);
        assert_eq!(ENTRY_COLUMNS.split(',').count(), 11);
        assert!(ENTRY_COLUMNS.contains("recipient_account_id"));
    }
}
