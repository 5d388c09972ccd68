//! Typed identifiers
//!
//! Every id that crosses the HTTP boundary is parsed into one of these
//! newtypes up front. A malformed id fails fast with [`IdError`] instead of
//! being silently reinterpreted further down.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Error returned when a string is not a valid identifier
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} id: {value:?}")]
pub struct IdError {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random id
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse an id supplied by a caller
            pub fn parse(value: &str) -> Result<Self, IdError> {
                Uuid::parse_str(value.trim()).map(Self).map_err(|_| IdError {
                    kind: $kind,
                    value: value.to_string(),
                })
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

typed_id!(
    /// Identifier of a bank account
    AccountId,
    "account"
);

typed_id!(
    /// Identifier of an authenticated user, supplied by the identity layer
    UserId,
    "user"
);

typed_id!(
    /// Identifier of a ledger entry
    TransactionId,
    "transaction"
);
