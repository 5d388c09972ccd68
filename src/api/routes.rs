//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Extension, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{
    Account, AccountId, AccountPatch, AccountType, Amount, CoreError, LedgerEntry, NewAccount,
    OperationContext, Page, TransactionId, UserId,
};
use crate::error::AppError;
use crate::handlers::{ClosedAccount, TransactionIntent};

use super::middleware::RequestUser;
use super::AppState;

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    pub account_number: String,
    pub account_holder_name: String,
    pub bank_name: String,
    pub ifsc_code: String,
    pub account_type: AccountType,
    /// Number or decimal string, defaults to zero
    #[serde(default, alias = "balance", skip_serializing_if = "Option::is_none")]
    pub opening_balance: Option<Value>,
    #[serde(default)]
    pub is_primary: bool,
}

/// Editable account fields. Anything else, `balance` included, is rejected.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateAccountRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_holder_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ifsc_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_type: Option<AccountType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_primary: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct AccountListResponse {
    pub accounts: Vec<Account>,
}

/// Directory view of another user's account: enough to pick a transfer
/// recipient, no balance
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountSummary {
    pub id: AccountId,
    pub user_id: UserId,
    pub account_holder_name: String,
    pub bank_name: String,
    pub account_type: AccountType,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountSummary {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            user_id: account.user_id,
            account_holder_name: account.account_holder_name,
            bank_name: account.bank_name,
            account_type: account.account_type,
            is_primary: account.is_primary,
            created_at: account.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccountDirectoryResponse {
    pub user_id: UserId,
    pub accounts: Vec<AccountSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTransactionRequest {
    pub account_id: String,
    /// Number or decimal string
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub transaction_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_account_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub skip: i64,
}

fn default_limit() -> i64 {
    Page::DEFAULT_LIMIT
}

#[derive(Debug, Serialize)]
pub struct TransactionListResponse {
    pub transactions: Vec<LedgerEntry>,
    pub limit: i64,
    pub skip: i64,
}

/// Accept a JSON number or a decimal string, as text for exact parsing
fn decimal_text(value: Option<Value>, field: &str) -> Result<Option<String>, CoreError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(CoreError::InvalidAmount(format!(
            "{} must be a number or a decimal string, got {}",
            field, other
        ))),
    }
}

fn parse_opening_balance(value: Option<Value>) -> Result<Decimal, CoreError> {
    let Some(text) = decimal_text(value, "opening_balance")? else {
        return Ok(Decimal::ZERO);
    };

    let trimmed = text.trim();
    let balance = trimmed
        .parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| CoreError::InvalidAmount(format!("invalid opening balance: {}", text)))?
        .normalize();

    if balance.scale() > 2 {
        return Err(CoreError::InvalidAmount(format!(
            "opening balance has too many decimal places: {}",
            text
        )));
    }
    if balance > Amount::MAX {
        return Err(CoreError::InvalidAmount(format!(
            "opening balance exceeds maximum allowed value ({})",
            Amount::MAX
        )));
    }
    Ok(balance)
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/accounts", get(list_accounts).post(create_account))
        .route(
            "/accounts/:account_id",
            get(get_account).put(update_account).delete(delete_account),
        )
        .route("/users/:user_id/accounts", get(list_user_accounts))
        .route("/transactions", get(list_transactions).post(create_transaction))
        .route("/transactions/:transaction_id", get(get_transaction))
}

// =========================================================================
// POST /accounts
// =========================================================================

/// Open a bank account for the requesting user
async fn create_account(
    State(state): State<AppState>,
    user: RequestUser,
    Extension(context): Extension<OperationContext>,
    payload: Result<Json<CreateAccountRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Account>), AppError> {
    let Json(request) = payload?;

    let details = NewAccount {
        account_number: request.account_number,
        account_holder_name: request.account_holder_name,
        bank_name: request.bank_name,
        ifsc_code: request.ifsc_code,
        account_type: request.account_type,
        opening_balance: parse_opening_balance(request.opening_balance)?,
        is_primary: request.is_primary,
    };

    let account = state
        .accounts
        .open_account(user.user_id, details, &context)
        .await?;

    Ok((StatusCode::CREATED, Json(account)))
}

// =========================================================================
// GET /accounts
// =========================================================================

async fn list_accounts(
    State(state): State<AppState>,
    user: RequestUser,
) -> Result<Json<AccountListResponse>, AppError> {
    let accounts = state.accounts.list_accounts(user.user_id).await?;
    Ok(Json(AccountListResponse { accounts }))
}

// =========================================================================
// GET /accounts/:account_id
// =========================================================================

async fn get_account(
    State(state): State<AppState>,
    user: RequestUser,
    Path(account_id): Path<String>,
) -> Result<Json<Account>, AppError> {
    let account_id = AccountId::parse(&account_id)?;
    let account = state.accounts.get_account(user.user_id, account_id).await?;
    Ok(Json(account))
}

// =========================================================================
// PUT /accounts/:account_id
// =========================================================================

async fn update_account(
    State(state): State<AppState>,
    user: RequestUser,
    Extension(context): Extension<OperationContext>,
    Path(account_id): Path<String>,
    payload: Result<Json<UpdateAccountRequest>, JsonRejection>,
) -> Result<Json<Account>, AppError> {
    let account_id = AccountId::parse(&account_id)?;
    let Json(request) = payload?;

    let patch = AccountPatch {
        account_holder_name: request.account_holder_name,
        bank_name: request.bank_name,
        ifsc_code: request.ifsc_code,
        account_type: request.account_type,
        is_primary: request.is_primary,
    };

    let account = state
        .accounts
        .update_account(user.user_id, account_id, patch, &context)
        .await?;
    Ok(Json(account))
}

// =========================================================================
// DELETE /accounts/:account_id
// =========================================================================

async fn delete_account(
    State(state): State<AppState>,
    user: RequestUser,
    Extension(context): Extension<OperationContext>,
    Path(account_id): Path<String>,
) -> Result<Json<ClosedAccount>, AppError> {
    let account_id = AccountId::parse(&account_id)?;
    let closed = state
        .accounts
        .close_account(user.user_id, account_id, &context)
        .await?;
    Ok(Json(closed))
}

// =========================================================================
// GET /users/:user_id/accounts
// =========================================================================

/// Accounts of any user, without balances, for choosing a transfer recipient
async fn list_user_accounts(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<AccountDirectoryResponse>, AppError> {
    let user_id = UserId::parse(&user_id)?;
    let accounts = state.accounts.list_accounts(user_id).await?;

    Ok(Json(AccountDirectoryResponse {
        user_id,
        accounts: accounts.into_iter().map(AccountSummary::from).collect(),
    }))
}

// =========================================================================
// POST /transactions
// =========================================================================

/// Execute a deposit, withdrawal, transfer or payment
async fn create_transaction(
    State(state): State<AppState>,
    user: RequestUser,
    Extension(context): Extension<OperationContext>,
    payload: Result<Json<CreateTransactionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<LedgerEntry>), AppError> {
    let Json(request) = payload?;

    let account_id = AccountId::parse(&request.account_id)?;
    let recipient = request
        .recipient_account_id
        .as_deref()
        .filter(|id| !id.trim().is_empty())
        .map(AccountId::parse)
        .transpose()?;
    let amount = decimal_text(request.amount, "amount")?
        .ok_or_else(|| CoreError::InvalidAmount("amount is required".to_string()))?;

    let mut intent = TransactionIntent::new(
        user.user_id,
        account_id,
        amount,
        request.transaction_type.unwrap_or_default(),
    );
    if let Some(description) = request.description {
        intent = intent.with_description(description);
    }
    if let Some(recipient) = recipient {
        intent = intent.with_recipient(recipient);
    }

    let entry = state.coordinator.execute(intent, &context).await?;

    Ok((StatusCode::CREATED, Json(entry)))
}

// =========================================================================
// GET /transactions
// =========================================================================

/// Transaction history, newest first
async fn list_transactions(
    State(state): State<AppState>,
    user: RequestUser,
    query: Result<Query<TransactionsQuery>, QueryRejection>,
) -> Result<Json<TransactionListResponse>, AppError> {
    let Query(query) = query?;

    let account_id = query
        .account_id
        .as_deref()
        .map(AccountId::parse)
        .transpose()?;
    let page = Page::new(query.limit, query.skip);

    let transactions = state
        .queries
        .list_transactions(user.user_id, account_id, page)
        .await?;

    Ok(Json(TransactionListResponse {
        transactions,
        limit: page.limit,
        skip: page.skip,
    }))
}

// =========================================================================
// GET /transactions/:transaction_id
// =========================================================================

async fn get_transaction(
    State(state): State<AppState>,
    user: RequestUser,
    Path(transaction_id): Path<String>,
) -> Result<Json<LedgerEntry>, AppError> {
    let transaction_id = TransactionId::parse(&transaction_id)?;
    let entry = state
        .queries
        .get_transaction(user.user_id, transaction_id)
        .await?;
    Ok(Json(entry))
}
