//! Defines the account store trait.

use crate::{
    Error,
    models::{Account, AccountId, AccountUpdate, NewAccount},
};

/// Handles durable storage of account identity and current balance.
///
/// Implementers must enforce the uniqueness of the login handle and the
/// external account number.
pub trait AccountStore {
    /// Create a new account with a zero balance and a freshly assigned unique
    /// account number.
    ///
    /// Returns [Error::DuplicateUsername] if the login handle is taken.
    fn create(&mut self, new_account: NewAccount) -> Result<Account, Error>;

    /// Get an account by its ID.
    ///
    /// Returns [Error::AccountNotFound] if no such account exists.
    fn get(&self, id: AccountId) -> Result<Account, Error>;

    /// Get every account in the store.
    fn get_all(&self) -> Result<Vec<Account>, Error>;

    /// Get an account by its login handle, for authentication.
    ///
    /// Returns [Error::AccountNotFound] if no such account exists.
    fn get_by_username(&self, username: &str) -> Result<Account, Error>;

    /// Update an account's identity fields with merge semantics: a field that
    /// is absent or empty keeps its previous value. The balance is never
    /// touched by this operation.
    fn update(&mut self, id: AccountId, update: AccountUpdate) -> Result<Account, Error>;

    /// Delete an account by its ID. Ledger history referring to the account
    /// is retained as an audit trail.
    ///
    /// Returns [Error::AccountNotFound] if no such account exists.
    fn delete(&mut self, id: AccountId) -> Result<(), Error>;

    /// Unconditionally overwrite the stored balance of an account.
    ///
    /// This performs no invariant check. It exists for the
    /// [TransferEngine](crate::engine::TransferEngine), which validates
    /// non-negativity before every write; nothing else should call it.
    fn set_balance(&mut self, id: AccountId, new_balance: i64) -> Result<(), Error>;
}
