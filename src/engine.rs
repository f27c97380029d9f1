//! The transfer engine: the one place that mutates account balances.
//!
//! Every operation runs the read-validate-write sequence under a per-account
//! lock so that two concurrent operations against the same account can never
//! both read the same stale balance (the classic double-spend). Operations on
//! unrelated accounts proceed in parallel.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use serde::Serialize;
use time::OffsetDateTime;

use crate::{
    Error,
    models::{AccountId, BalanceView, EntryAction, NewLedgerEntry},
    stores::{AccountStore, LedgerStore},
};

/// An in-process lock table keyed by account id.
///
/// At most one balance-mutating operation per account is in flight at a time.
/// The table only ever grows, by one small entry per account that has been
/// touched, which is bounded by the account table itself.
#[derive(Debug, Clone, Default)]
pub struct AccountLocks {
    locks: Arc<Mutex<HashMap<AccountId, Arc<Mutex<()>>>>>,
}

impl AccountLocks {
    fn lock_for(&self, id: AccountId) -> Arc<Mutex<()>> {
        self.locks.lock().unwrap().entry(id).or_default().clone()
    }
}

/// The result of a successful peer-to-peer transfer: the source account's
/// updated balance view and a sent flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferOutcome {
    /// The source account's balance view after the transfer.
    #[serde(rename = "my-account")]
    pub account: BalanceView,
    /// Whether the transfer was sent. Always true on the success path; the
    /// field exists for wire compatibility.
    pub sent: bool,
}

/// Orchestrates balance changes against the account store and writes the
/// matching entries to the ledger store.
///
/// Invariants upheld here, not in the stores:
/// - a balance is never written that is below zero;
/// - a transfer conserves money across the two accounts;
/// - a ledger entry exists if and only if the balance write it describes
///   succeeded.
#[derive(Debug, Clone)]
pub struct TransferEngine<A, L>
where
    A: AccountStore,
    L: LedgerStore,
{
    accounts: A,
    ledger: L,
    locks: AccountLocks,
}

impl<A, L> TransferEngine<A, L>
where
    A: AccountStore,
    L: LedgerStore,
{
    /// Create an engine over the given stores.
    ///
    /// `locks` must be the same lock table across every clone of the engine
    /// that shares the underlying storage.
    pub fn new(accounts: A, ledger: L, locks: AccountLocks) -> Self {
        Self {
            accounts,
            ledger,
            locks,
        }
    }

    /// The current balance view of an account.
    pub fn read_balance(&self, id: AccountId) -> Result<BalanceView, Error> {
        Ok(self.accounts.get(id)?.balance_view())
    }

    /// Deposit into (`amount > 0`) or withdraw from (`amount < 0`) an
    /// account, and record the change in the ledger.
    ///
    /// # Errors
    ///
    /// - [Error::InvalidAmount] if `amount` is zero or the new balance would
    ///   overflow. No state is changed.
    /// - [Error::InsufficientFunds] if a withdrawal would take the balance
    ///   below zero. No state is changed.
    /// - [Error::AccountNotFound] if the account does not exist.
    /// - [Error::PersistenceFailure] if a storage write did not complete; the
    ///   whole operation can safely be retried.
    pub fn adjust_balance(&mut self, id: AccountId, amount: i64) -> Result<BalanceView, Error> {
        if amount == 0 {
            return Err(Error::InvalidAmount(amount));
        }

        let lock = self.locks.lock_for(id);
        let _guard = lock.lock().unwrap();

        let account = self.accounts.get(id)?;
        let balance_after = account
            .balance
            .checked_add(amount)
            .ok_or(Error::InvalidAmount(amount))?;

        if balance_after < 0 {
            return Err(Error::InsufficientFunds {
                balance: account.balance,
                requested: -amount,
            });
        }

        self.accounts.set_balance(id, balance_after)?;

        let action = if amount > 0 {
            EntryAction::Deposit
        } else {
            EntryAction::Withdrawal
        };
        let entry = NewLedgerEntry {
            from_account: id,
            to_account: id,
            amount: amount.abs(),
            action,
            balance_before: account.balance,
            balance_after,
            completed_at: OffsetDateTime::now_utc(),
        };

        if let Err(append_error) = self.ledger.append(entry) {
            // A ledger entry must exist iff the balance write it describes
            // succeeded, so undo the write before reporting the failure.
            if let Err(restore_error) = self.accounts.set_balance(id, account.balance) {
                tracing::error!(
                    "could not restore account {id} to {} after a failed ledger append: \
                     {restore_error}",
                    account.balance
                );
            }
            return Err(append_error);
        }

        Ok(BalanceView {
            username: account.username,
            account_number: account.account_number,
            balance: balance_after,
        })
    }

    /// Move `amount` from `source` to `destination`, recording a debit leg
    /// and a credit leg that share one completion timestamp.
    ///
    /// A self-transfer (`source == destination`) is legal: the credit applies
    /// on top of the already debited balance, so it nets to no change while
    /// still producing both ledger legs.
    ///
    /// # Errors
    ///
    /// - [Error::InvalidAmount] if `amount` is not positive. No state is
    ///   changed.
    /// - [Error::AccountNotFound] if either account is missing. No state is
    ///   changed.
    /// - [Error::InsufficientFunds] if the source cannot cover `amount`. No
    ///   state is changed.
    /// - [Error::PersistenceFailure] if a write failed but the accounts were
    ///   left as they started.
    /// - [Error::CompensationFailure] if the source was debited and could not
    ///   be restored. The accounts are inconsistent and need out-of-band
    ///   reconciliation; this must never be retried.
    pub fn transfer(
        &mut self,
        source: AccountId,
        destination: AccountId,
        amount: i64,
    ) -> Result<TransferOutcome, Error> {
        if amount <= 0 {
            return Err(Error::InvalidAmount(amount));
        }

        // Locks are taken in ascending id order so two opposing transfers
        // cannot deadlock. A self-transfer takes its lock once.
        let (first, second) = if source <= destination {
            (source, destination)
        } else {
            (destination, source)
        };
        let first_lock = self.locks.lock_for(first);
        let _first_guard = first_lock.lock().unwrap();
        let second_lock = (first != second).then(|| self.locks.lock_for(second));
        let _second_guard = second_lock.as_ref().map(|lock| lock.lock().unwrap());

        let source_account = self.accounts.get(source)?;
        let destination_account = self.accounts.get(destination)?;

        let source_after = source_account.balance - amount;
        if source_after < 0 {
            return Err(Error::InsufficientFunds {
                balance: source_account.balance,
                requested: amount,
            });
        }

        let destination_before = if source == destination {
            source_after
        } else {
            destination_account.balance
        };
        let destination_after = destination_before
            .checked_add(amount)
            .ok_or(Error::InvalidAmount(amount))?;

        self.accounts.set_balance(source, source_after)?;

        if let Err(credit_error) = self.accounts.set_balance(destination, destination_after) {
            return Err(self.compensate(source, source_account.balance, credit_error));
        }

        let completed_at = OffsetDateTime::now_utc();
        let debit = NewLedgerEntry {
            from_account: source,
            to_account: destination,
            amount,
            action: EntryAction::TransferDebit,
            balance_before: source_account.balance,
            balance_after: source_after,
            completed_at,
        };
        let credit = NewLedgerEntry {
            from_account: source,
            to_account: destination,
            amount,
            action: EntryAction::TransferCredit,
            balance_before: destination_before,
            balance_after: destination_after,
            completed_at,
        };

        if let Err(append_error) = self.ledger.append_transfer(debit, credit) {
            // Committed money movement must always have a matching ledger
            // record, so roll both balances back.
            let restore_result = if source == destination {
                self.accounts.set_balance(source, source_account.balance)
            } else {
                self.accounts
                    .set_balance(destination, destination_account.balance)
                    .and_then(|()| self.accounts.set_balance(source, source_account.balance))
            };

            return match restore_result {
                Ok(()) => Err(append_error),
                Err(restore_error) => {
                    tracing::error!(
                        "transfer of {amount} from {source} to {destination} was written but \
                         could not be logged or reversed: {restore_error}"
                    );
                    Err(Error::CompensationFailure {
                        source_account: source,
                        restore_to: source_account.balance,
                    })
                }
            };
        }

        // For a self-transfer the source's final balance is the credited one.
        let source_final = if source == destination {
            destination_after
        } else {
            source_after
        };

        Ok(TransferOutcome {
            account: BalanceView {
                username: source_account.username,
                account_number: source_account.account_number,
                balance: source_final,
            },
            sent: true,
        })
    }

    /// Restore the debited source after a failed credit to the destination.
    ///
    /// Returns the original `credit_error` when the restore succeeds, or
    /// [Error::CompensationFailure] when it does not.
    fn compensate(&mut self, source: AccountId, restore_to: i64, credit_error: Error) -> Error {
        match self.accounts.set_balance(source, restore_to) {
            Ok(()) => credit_error,
            Err(restore_error) => {
                tracing::error!(
                    "compensating write failed: account {source} was debited and must be \
                     manually restored to {restore_to}: {restore_error}"
                );
                Error::CompensationFailure {
                    source_account: source,
                    restore_to,
                }
            }
        }
    }
}
