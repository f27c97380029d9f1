//! Contains the SQLite implementations of the store traits and a convenience
//! function for building an [AppState] on the SQLite backend.

pub mod account;
pub mod ledger;

pub use account::SQLiteAccountStore;
pub use ledger::SQLiteLedgerStore;

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::{AppState, Error, db::initialize};

/// An alias for an [AppState] that uses SQLite for the backend.
pub type SQLAppState = AppState<SQLiteAccountStore, SQLiteLedgerStore>;

/// Creates an [AppState] instance that uses SQLite for the backend.
///
/// This function will modify the database by adding the tables for the domain
/// models to the database.
pub fn create_app_state(db_connection: Connection, jwt_secret: &str) -> Result<SQLAppState, Error> {
    initialize(&db_connection)?;

    let connection = Arc::new(Mutex::new(db_connection));
    let account_store = SQLiteAccountStore::new(connection.clone());
    let ledger_store = SQLiteLedgerStore::new(connection.clone());

    Ok(AppState::new(jwt_secret, account_store, ledger_store))
}
