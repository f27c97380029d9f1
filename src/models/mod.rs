//! This module defines the domain data types.

pub use account::{Account, AccountId, AccountUpdate, BalanceView, NewAccount};
pub use ledger::{EntryAction, LedgerEntry, NewLedgerEntry};
pub use password::PasswordHash;

mod account;
mod ledger;
mod password;
