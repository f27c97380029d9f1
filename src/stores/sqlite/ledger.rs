//! Implements a SQLite backed ledger store.

use std::{
    str::FromStr,
    sync::{Arc, Mutex},
};

use rusqlite::{Connection, Row};

use crate::{
    Error,
    db::{CreateTable, MapRow},
    models::{AccountId, EntryAction, LedgerEntry, NewLedgerEntry},
    stores::LedgerStore,
};

/// Append and retrieve ledger entries in a SQLite database.
#[derive(Debug, Clone)]
pub struct SQLiteLedgerStore {
    connection: Arc<Mutex<Connection>>,
}

impl SQLiteLedgerStore {
    /// Create a new store from the SQLite `connection`.
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }

    fn insert(connection: &Connection, entry: &NewLedgerEntry) -> Result<i64, rusqlite::Error> {
        connection.execute(
            "INSERT INTO ledger
                (from_account, to_account, amount, action, balance_before, balance_after, completed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            (
                entry.from_account.as_i64(),
                entry.to_account.as_i64(),
                entry.amount,
                entry.action.to_string(),
                entry.balance_before,
                entry.balance_after,
                entry.completed_at,
            ),
        )?;

        Ok(connection.last_insert_rowid())
    }
}

impl CreateTable for SQLiteLedgerStore {
    fn create_table(connection: &Connection) -> Result<(), rusqlite::Error> {
        // AUTOINCREMENT keeps entry IDs monotonic even if rows were ever
        // removed out-of-band.
        connection.execute(
            "CREATE TABLE IF NOT EXISTS ledger (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                from_account INTEGER NOT NULL,
                to_account INTEGER NOT NULL,
                amount INTEGER NOT NULL,
                action TEXT NOT NULL,
                balance_before INTEGER NOT NULL,
                balance_after INTEGER NOT NULL,
                completed_at TEXT NOT NULL
                )",
            (),
        )?;

        connection.execute(
            "CREATE INDEX IF NOT EXISTS ledger_from_account ON ledger(from_account)",
            (),
        )?;
        connection.execute(
            "CREATE INDEX IF NOT EXISTS ledger_to_account ON ledger(to_account)",
            (),
        )?;

        Ok(())
    }
}

impl MapRow for SQLiteLedgerStore {
    type ReturnType = LedgerEntry;

    fn map_row_with_offset(row: &Row, offset: usize) -> Result<Self::ReturnType, rusqlite::Error> {
        let id = row.get(offset)?;
        let raw_from: i64 = row.get(offset + 1)?;
        let raw_to: i64 = row.get(offset + 2)?;
        let amount = row.get(offset + 3)?;
        let raw_action: String = row.get(offset + 4)?;
        let balance_before = row.get(offset + 5)?;
        let balance_after = row.get(offset + 6)?;
        let completed_at = row.get(offset + 7)?;

        let action = EntryAction::from_str(&raw_action).map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                offset + 4,
                rusqlite::types::Type::Text,
                error.into(),
            )
        })?;

        Ok(LedgerEntry {
            id,
            from_account: AccountId::new(raw_from),
            to_account: AccountId::new(raw_to),
            amount,
            action,
            balance_before,
            balance_after,
            completed_at,
        })
    }
}

const SELECT_COLUMNS: &str =
    "id, from_account, to_account, amount, action, balance_before, balance_after, completed_at";

impl LedgerStore for SQLiteLedgerStore {
    fn append(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry, Error> {
        let connection = self.connection.lock().unwrap();

        let id = Self::insert(&connection, &entry)?;

        Ok(LedgerEntry {
            id,
            from_account: entry.from_account,
            to_account: entry.to_account,
            amount: entry.amount,
            action: entry.action,
            balance_before: entry.balance_before,
            balance_after: entry.balance_after,
            completed_at: entry.completed_at,
        })
    }

    /// Append both legs of a transfer in one SQL transaction so one leg is
    /// never visible without the other.
    fn append_transfer(
        &mut self,
        debit: NewLedgerEntry,
        credit: NewLedgerEntry,
    ) -> Result<(LedgerEntry, LedgerEntry), Error> {
        let mut connection = self.connection.lock().unwrap();
        let transaction = connection.transaction()?;

        let debit_id = Self::insert(&transaction, &debit)?;
        let credit_id = Self::insert(&transaction, &credit)?;

        transaction.commit()?;

        let debit_entry = LedgerEntry {
            id: debit_id,
            from_account: debit.from_account,
            to_account: debit.to_account,
            amount: debit.amount,
            action: debit.action,
            balance_before: debit.balance_before,
            balance_after: debit.balance_after,
            completed_at: debit.completed_at,
        };
        let credit_entry = LedgerEntry {
            id: credit_id,
            from_account: credit.from_account,
            to_account: credit.to_account,
            amount: credit.amount,
            action: credit.action,
            balance_before: credit.balance_before,
            balance_after: credit.balance_after,
            completed_at: credit.completed_at,
        };

        Ok((debit_entry, credit_entry))
    }

    fn get_all(&self) -> Result<Vec<LedgerEntry>, Error> {
        self.connection
            .lock()
            .unwrap()
            .prepare(&format!("SELECT {SELECT_COLUMNS} FROM ledger ORDER BY id"))?
            .query_map([], SQLiteLedgerStore::map_row)?
            .map(|maybe_entry| maybe_entry.map_err(|error| error.into()))
            .collect()
    }

    fn get_for_account(&self, id: AccountId) -> Result<Vec<LedgerEntry>, Error> {
        self.connection
            .lock()
            .unwrap()
            .prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM ledger
                    WHERE from_account = :id OR to_account = :id
                    ORDER BY id"
            ))?
            .query_map(&[(":id", &id.as_i64())], SQLiteLedgerStore::map_row)?
            .map(|maybe_entry| maybe_entry.map_err(|error| error.into()))
            .collect()
    }
}

#[cfg(test)]
mod sqlite_ledger_store_tests {
    use std::sync::{Arc, Mutex};

    use rusqlite::Connection;
    use time::OffsetDateTime;

    use crate::{
        db::CreateTable,
        models::{AccountId, EntryAction, NewLedgerEntry},
        stores::LedgerStore,
    };

    use super::SQLiteLedgerStore;

    fn get_test_store() -> SQLiteLedgerStore {
        let connection = Connection::open_in_memory().unwrap();
        SQLiteLedgerStore::create_table(&connection).unwrap();

        SQLiteLedgerStore::new(Arc::new(Mutex::new(connection)))
    }

    fn deposit_entry(account: i64, amount: i64, before: i64) -> NewLedgerEntry {
        NewLedgerEntry {
            from_account: AccountId::new(account),
            to_account: AccountId::new(account),
            amount,
            action: EntryAction::Deposit,
            balance_before: before,
            balance_after: before + amount,
            completed_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn append_assigns_monotonic_ids() {
        let mut store = get_test_store();

        let first = store.append(deposit_entry(1, 100, 0)).unwrap();
        let second = store.append(deposit_entry(1, 50, 100)).unwrap();

        assert!(second.id > first.id);
    }

    #[test]
    fn append_transfer_writes_both_legs_with_shared_timestamp() {
        let mut store = get_test_store();
        let completed_at = OffsetDateTime::now_utc();

        let debit = NewLedgerEntry {
            from_account: AccountId::new(1),
            to_account: AccountId::new(2),
            amount: 200,
            action: EntryAction::TransferDebit,
            balance_before: 500,
            balance_after: 300,
            completed_at,
        };
        let credit = NewLedgerEntry {
            from_account: AccountId::new(1),
            to_account: AccountId::new(2),
            amount: 200,
            action: EntryAction::TransferCredit,
            balance_before: 100,
            balance_after: 300,
            completed_at,
        };

        let (debit_entry, credit_entry) = store.append_transfer(debit, credit).unwrap();

        assert_eq!(credit_entry.id, debit_entry.id + 1);
        assert_eq!(debit_entry.completed_at, credit_entry.completed_at);
        assert_eq!(store.get_all().unwrap(), vec![debit_entry, credit_entry]);
    }

    #[test]
    fn get_for_account_returns_both_legs_for_each_participant() {
        let mut store = get_test_store();
        let completed_at = OffsetDateTime::now_utc();

        store.append(deposit_entry(1, 500, 0)).unwrap();
        store.append(deposit_entry(3, 70, 0)).unwrap();

        let debit = NewLedgerEntry {
            from_account: AccountId::new(1),
            to_account: AccountId::new(2),
            amount: 200,
            action: EntryAction::TransferDebit,
            balance_before: 500,
            balance_after: 300,
            completed_at,
        };
        let credit = NewLedgerEntry {
            from_account: AccountId::new(1),
            to_account: AccountId::new(2),
            amount: 200,
            action: EntryAction::TransferCredit,
            balance_before: 0,
            balance_after: 200,
            completed_at,
        };
        store.append_transfer(debit, credit).unwrap();

        let source_history = store.get_for_account(AccountId::new(1)).unwrap();
        let destination_history = store.get_for_account(AccountId::new(2)).unwrap();
        let bystander_history = store.get_for_account(AccountId::new(3)).unwrap();

        // The source sees its deposit plus both legs of the transfer, the
        // destination sees both legs, the bystander only its own deposit.
        assert_eq!(source_history.len(), 3);
        assert_eq!(destination_history.len(), 2);
        assert_eq!(bystander_history.len(), 1);
    }

    #[test]
    fn get_all_returns_entries_in_insertion_order() {
        let mut store = get_test_store();

        let first = store.append(deposit_entry(1, 100, 0)).unwrap();
        let second = store.append(deposit_entry(2, 200, 0)).unwrap();
        let third = store.append(deposit_entry(1, 300, 100)).unwrap();

        assert_eq!(store.get_all().unwrap(), vec![first, second, third]);
    }
}
