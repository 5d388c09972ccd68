//! Bank account records

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::amount::Amount;
use super::error::CoreError;
use super::ids::{AccountId, UserId};

/// Kind of bank account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Savings,
    Checking,
    Other,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Savings => "savings",
            AccountType::Checking => "checking",
            AccountType::Other => "other",
        }
    }
}

impl Default for AccountType {
    fn default() -> Self {
        Self::Savings
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "savings" => Ok(AccountType::Savings),
            "checking" => Ok(AccountType::Checking),
            "other" => Ok(AccountType::Other),
            other => Err(format!("unknown account type: {other}")),
        }
    }
}

/// A bank account as persisted by the account store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub user_id: UserId,
    pub account_number: String,
    pub account_holder_name: String,
    pub bank_name: String,
    pub ifsc_code: String,
    pub account_type: AccountType,
    pub balance: Decimal,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Build a new account record for `user_id`.
    ///
    /// The primary flag is decided by the caller, which knows what other
    /// accounts the user already has.
    pub fn open(user_id: UserId, details: NewAccount, is_primary: bool) -> Self {
        let now = Utc::now();
        Self {
            id: AccountId::new(),
            user_id,
            account_number: details.account_number,
            account_holder_name: details.account_holder_name,
            bank_name: details.bank_name,
            ifsc_code: details.ifsc_code,
            account_type: details.account_type,
            balance: details.opening_balance,
            is_primary,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    /// Apply a partial update in place (used by stores without a query engine)
    pub fn apply_patch(&mut self, patch: &AccountPatch, at: DateTime<Utc>) {
        if let Some(ref name) = patch.account_holder_name {
            self.account_holder_name = name.clone();
        }
        if let Some(ref bank) = patch.bank_name {
            self.bank_name = bank.clone();
        }
        if let Some(ref ifsc) = patch.ifsc_code {
            self.ifsc_code = ifsc.clone();
        }
        if let Some(account_type) = patch.account_type {
            self.account_type = account_type;
        }
        if let Some(is_primary) = patch.is_primary {
            self.is_primary = is_primary;
        }
        self.updated_at = at;
    }
}

/// Details supplied when opening an account
#[derive(Debug, Clone, PartialEq)]
pub struct NewAccount {
    pub account_number: String,
    pub account_holder_name: String,
    pub bank_name: String,
    pub ifsc_code: String,
    pub account_type: AccountType,
    pub opening_balance: Decimal,
    pub is_primary: bool,
}

impl NewAccount {
    pub fn validate(&self) -> Result<(), CoreError> {
        let required = [
            ("account_number", &self.account_number),
            ("account_holder_name", &self.account_holder_name),
            ("bank_name", &self.bank_name),
            ("ifsc_code", &self.ifsc_code),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(CoreError::invalid_field(field, "must not be empty"));
            }
        }

        if self.opening_balance < Decimal::ZERO {
            return Err(CoreError::InvalidAmount(format!(
                "opening balance must not be negative (got {})",
                self.opening_balance
            )));
        }
        if self.opening_balance > Amount::MAX {
            return Err(CoreError::InvalidAmount(format!(
                "opening balance exceeds maximum allowed value ({})",
                Amount::MAX
            )));
        }

        Ok(())
    }
}

/// Partial update of an account's editable fields.
///
/// Balance is deliberately absent: balances only move through the
/// transaction coordinator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountPatch {
    pub account_holder_name: Option<String>,
    pub bank_name: Option<String>,
    pub ifsc_code: Option<String>,
    pub account_type: Option<AccountType>,
    pub is_primary: Option<bool>,
}

impl AccountPatch {
    pub fn primary(is_primary: bool) -> Self {
        Self {
            is_primary: Some(is_primary),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let optional = [
            ("account_holder_name", &self.account_holder_name),
            ("bank_name", &self.bank_name),
            ("ifsc_code", &self.ifsc_code),
        ];
        for (field, value) in optional {
            if matches!(value, Some(v) if v.trim().is_empty()) {
                return Err(CoreError::invalid_field(field, "must not be empty"));
            }
        }
        Ok(())
    }
}
