//! Command Handlers module
//!
//! Business operations over an injected store: the transaction coordinator,
//! the account manager that guards the primary-account rule, and ledger
//! queries.

mod account_handler;
mod commands;
mod query_handler;
mod transaction_handler;


pub use account_handler::AccountManager;
pub use commands::*;
pub use query_handler::LedgerQueries;
pub use transaction_handler::{TransactionCoordinator, DEFAULT_TIMEOUT};
