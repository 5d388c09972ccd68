//! Amount type
//!
//! Domain primitive for money moved by a single transaction.
//! Amounts are validated at construction time, so a ledger entry can never
//! carry a zero, negative or malformed value. Direction is encoded by the
//! transaction kind, never by the sign.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum amount for a single transaction (1 trillion)
const MAX_AMOUNT: Decimal = Decimal::from_parts(3_567_587_328, 232, 0, false, 0);

/// Maximum decimal places (cents)
const MAX_SCALE: u32 = 2;

/// Largest balance an account can hold: 999999999999999999.99, the range of
/// the `NUMERIC(20, 2)` balance column
pub const MAX_BALANCE: Decimal = Decimal::from_parts(1_661_992_959, 1_808_227_885, 5, false, 2);

/// Amount represents a validated, strictly positive monetary value.
///
/// # Invariants
/// - Value is always positive (> 0)
/// - At most 2 decimal places
/// - At most 1 trillion
///
/// # Example
/// ```
/// use rust_decimal::Decimal;
/// use bank_ledger::domain::Amount;
///
/// let amount = Amount::new(Decimal::new(15050, 2)).unwrap();
/// assert_eq!(amount.to_string(), "150.50");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(Decimal);

/// Errors that can occur when creating an Amount
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("amount must be greater than zero (got {0})")]
    NotPositive(Decimal),

    #[error("amount has too many decimal places (max {MAX_SCALE}, got {0})")]
    TooManyDecimals(u32),

    #[error("amount exceeds maximum allowed value ({MAX_AMOUNT})")]
    Overflow,

    #[error("invalid amount format: {0}")]
    ParseError(String),
}

impl Amount {
    /// Largest single amount, also the cap on opening balances
    pub const MAX: Decimal = MAX_AMOUNT;

    /// Create a new Amount with validation.
    ///
    /// # Errors
    /// - `AmountError::NotPositive` if value <= 0
    /// - `AmountError::TooManyDecimals` if more than 2 significant decimal places
    /// - `AmountError::Overflow` if value > 1 trillion
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value <= Decimal::ZERO {
            return Err(AmountError::NotPositive(value));
        }

        // "10.500" is fine, "10.505" is not
        let normalized = value.normalize();
        if normalized.scale() > MAX_SCALE {
            return Err(AmountError::TooManyDecimals(normalized.scale()));
        }

        if value > MAX_AMOUNT {
            return Err(AmountError::Overflow);
        }

        Ok(Self(normalized))
    }

    /// Get the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Check if a balance covers this amount.
    pub fn is_covered_by(&self, balance: Decimal) -> bool {
        balance >= self.0
    }

    /// `balance` plus this amount, or `None` past `MAX_BALANCE`
    pub fn credited_to(&self, balance: Decimal) -> Option<Decimal> {
        balance
            .checked_add(self.0)
            .filter(|total| *total <= MAX_BALANCE)
    }

    /// `balance` minus this amount, or `None` on overflow
    pub fn debited_from(&self, balance: Decimal) -> Option<Decimal> {
        balance.checked_sub(self.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    /// Accepts plain decimals ("150.5") and the scientific notation JSON
    /// encoders emit for large floats ("1e3").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let decimal = Decimal::from_str(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .map_err(|e| AmountError::ParseError(format!("{trimmed:?}: {e}")))?;
        Amount::new(decimal)
    }
}

impl TryFrom<String> for Amount {
    type Error = AmountError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Amount::from_str(&value)
    }
}

impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        amount.to_string()
    }
}
