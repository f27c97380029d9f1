//! Defines the ledger store trait.

use crate::{
    Error,
    models::{AccountId, LedgerEntry, NewLedgerEntry},
};

/// Handles append-only storage of transfer, deposit and withdrawal records.
///
/// There is deliberately no update or delete operation: the ledger is the
/// immutable audit trail.
pub trait LedgerStore {
    /// Append a single entry. Either the whole record is written or nothing
    /// is.
    fn append(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry, Error>;

    /// Append the two legs of one peer-to-peer transfer as a single atomic
    /// unit, so one leg is never visible without the other.
    fn append_transfer(
        &mut self,
        debit: NewLedgerEntry,
        credit: NewLedgerEntry,
    ) -> Result<(LedgerEntry, LedgerEntry), Error>;

    /// Get every entry in insertion order.
    fn get_all(&self) -> Result<Vec<LedgerEntry>, Error>;

    /// Get every entry where the account is the source or the destination,
    /// in insertion order, including both legs of transfers the account
    /// participated in.
    fn get_for_account(&self, id: AccountId) -> Result<Vec<LedgerEntry>, Error>;
}
