//! Contains traits and implementations for objects that store the domain [models](crate::models).

mod account;
mod ledger;

pub mod sqlite;

pub use account::AccountStore;
pub use ledger::LedgerStore;
pub use sqlite::{SQLiteAccountStore, SQLiteLedgerStore};
