//! Implements a SQLite backed account store.

use std::sync::{Arc, Mutex};

use rand::Rng;
use rusqlite::{Connection, Row};
use time::OffsetDateTime;

use crate::{
    Error,
    db::{CreateTable, MapRow},
    models::{Account, AccountId, AccountUpdate, NewAccount, PasswordHash},
    stores::AccountStore,
};

/// The inclusive range account numbers are sampled from, giving every account
/// a caller-visible 8-digit identifier.
const ACCOUNT_NUMBER_RANGE: std::ops::RangeInclusive<i64> = 10_000_000..=99_999_999;

/// How many times to re-sample the account number on collision before giving
/// up. Collisions are vanishingly rare until the table holds a large share of
/// the 90 million possible numbers.
const ACCOUNT_NUMBER_ATTEMPTS: usize = 16;

/// Create, retrieve and update accounts in a SQLite database.
#[derive(Debug, Clone)]
pub struct SQLiteAccountStore {
    connection: Arc<Mutex<Connection>>,
}

impl SQLiteAccountStore {
    /// Create a new store from the SQLite `connection`.
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self { connection }
    }
}

impl CreateTable for SQLiteAccountStore {
    fn create_table(connection: &Connection) -> Result<(), rusqlite::Error> {
        connection.execute(
            "CREATE TABLE IF NOT EXISTS account (
                id INTEGER PRIMARY KEY,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                username TEXT UNIQUE NOT NULL,
                password TEXT NOT NULL,
                account_number INTEGER UNIQUE NOT NULL,
                balance INTEGER NOT NULL,
                created_at TEXT NOT NULL
                )",
            (),
        )?;

        Ok(())
    }
}

impl MapRow for SQLiteAccountStore {
    type ReturnType = Account;

    fn map_row_with_offset(row: &Row, offset: usize) -> Result<Self::ReturnType, rusqlite::Error> {
        let raw_id = row.get(offset)?;
        let first_name = row.get(offset + 1)?;
        let last_name = row.get(offset + 2)?;
        let username = row.get(offset + 3)?;
        let raw_password_hash: String = row.get(offset + 4)?;
        let account_number = row.get(offset + 5)?;
        let balance = row.get(offset + 6)?;
        let created_at = row.get(offset + 7)?;

        Ok(Account {
            id: AccountId::new(raw_id),
            first_name,
            last_name,
            username,
            password_hash: PasswordHash::new_unchecked(&raw_password_hash),
            account_number,
            balance,
            created_at,
        })
    }
}

const SELECT_COLUMNS: &str =
    "id, first_name, last_name, username, password, account_number, balance, created_at";

impl AccountStore for SQLiteAccountStore {
    /// Create and insert a new account with a zero balance.
    ///
    /// The account number is sampled uniformly from the 8-digit range and
    /// re-sampled when it collides with an existing account.
    ///
    /// # Panics
    ///
    /// Panics if the database lock is already acquired by the same thread or
    /// is poisoned.
    fn create(&mut self, new_account: NewAccount) -> Result<Account, Error> {
        let connection = self.connection.lock().unwrap();
        let created_at = OffsetDateTime::now_utc();

        let mut rng = rand::thread_rng();

        for _ in 0..ACCOUNT_NUMBER_ATTEMPTS {
            let account_number = rng.gen_range(ACCOUNT_NUMBER_RANGE);

            let result = connection.execute(
                "INSERT INTO account
                    (first_name, last_name, username, password, account_number, balance, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
                (
                    &new_account.first_name,
                    &new_account.last_name,
                    &new_account.username,
                    new_account.password_hash.to_string(),
                    account_number,
                    created_at,
                ),
            );

            match result.map_err(Error::from) {
                Ok(_) => {
                    let id = AccountId::new(connection.last_insert_rowid());

                    return Ok(Account {
                        id,
                        first_name: new_account.first_name,
                        last_name: new_account.last_name,
                        username: new_account.username,
                        password_hash: new_account.password_hash,
                        account_number,
                        balance: 0,
                        created_at,
                    });
                }
                Err(Error::DuplicateAccountNumber) => continue,
                Err(error) => return Err(error),
            }
        }

        Err(Error::DuplicateAccountNumber)
    }

    fn get(&self, id: AccountId) -> Result<Account, Error> {
        self.connection
            .lock()
            .unwrap()
            .prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM account WHERE id = :id"
            ))?
            .query_row(&[(":id", &id.as_i64())], SQLiteAccountStore::map_row)
            .map_err(|e| e.into())
    }

    fn get_all(&self) -> Result<Vec<Account>, Error> {
        self.connection
            .lock()
            .unwrap()
            .prepare(&format!("SELECT {SELECT_COLUMNS} FROM account ORDER BY id"))?
            .query_map([], SQLiteAccountStore::map_row)?
            .map(|maybe_account| maybe_account.map_err(|error| error.into()))
            .collect()
    }

    fn get_by_username(&self, username: &str) -> Result<Account, Error> {
        self.connection
            .lock()
            .unwrap()
            .prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM account WHERE username = :username"
            ))?
            .query_row(&[(":username", username)], SQLiteAccountStore::map_row)
            .map_err(|e| e.into())
    }

    /// Merge `update` into the stored identity fields and persist the result.
    ///
    /// The read and the write happen under one lock acquisition so a
    /// concurrent update cannot interleave between them.
    fn update(&mut self, id: AccountId, update: AccountUpdate) -> Result<Account, Error> {
        let connection = self.connection.lock().unwrap();

        let current = connection
            .prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM account WHERE id = :id"
            ))?
            .query_row(&[(":id", &id.as_i64())], SQLiteAccountStore::map_row)
            .map_err(Error::from)?;

        let merged = update.merged_with(&current);

        connection
            .execute(
                "UPDATE account
                    SET first_name = ?1, last_name = ?2, username = ?3, password = ?4
                    WHERE id = ?5",
                (
                    &merged.first_name,
                    &merged.last_name,
                    &merged.username,
                    merged.password_hash.to_string(),
                    id.as_i64(),
                ),
            )
            .map_err(Error::from)?;

        Ok(merged)
    }

    fn delete(&mut self, id: AccountId) -> Result<(), Error> {
        let rows_deleted = self
            .connection
            .lock()
            .unwrap()
            .execute("DELETE FROM account WHERE id = ?1", [id.as_i64()])?;

        if rows_deleted == 0 {
            Err(Error::AccountNotFound)
        } else {
            Ok(())
        }
    }

    /// Overwrite the stored balance without any invariant check.
    ///
    /// The caller (the transfer engine) must have already validated that
    /// `new_balance` is non-negative.
    fn set_balance(&mut self, id: AccountId, new_balance: i64) -> Result<(), Error> {
        let rows_updated = self.connection.lock().unwrap().execute(
            "UPDATE account SET balance = ?1 WHERE id = ?2",
            (new_balance, id.as_i64()),
        )?;

        if rows_updated == 0 {
            Err(Error::AccountNotFound)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod sqlite_account_store_tests {
    use std::sync::{Arc, Mutex};

    use rusqlite::Connection;

    use crate::{
        Error,
        db::CreateTable,
        models::{AccountId, AccountUpdate, NewAccount, PasswordHash},
        stores::AccountStore,
    };

    use super::SQLiteAccountStore;

    fn get_test_store() -> SQLiteAccountStore {
        let connection = Connection::open_in_memory().unwrap();
        SQLiteAccountStore::create_table(&connection).unwrap();

        SQLiteAccountStore::new(Arc::new(Mutex::new(connection)))
    }

    fn new_account(username: &str) -> NewAccount {
        NewAccount {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            username: username.to_string(),
            password_hash: PasswordHash::new_unchecked("$2b$04$abcdefghijklmnopqrstuv"),
        }
    }

    #[test]
    fn create_assigns_id_zero_balance_and_eight_digit_number() {
        let mut store = get_test_store();

        let account = store.create(new_account("ada")).unwrap();

        assert!(account.id.as_i64() > 0);
        assert_eq!(account.balance, 0);
        assert!((10_000_000..=99_999_999).contains(&account.account_number));
    }

    #[test]
    fn create_fails_on_duplicate_username() {
        let mut store = get_test_store();

        store.create(new_account("ada")).unwrap();

        assert_eq!(
            store.create(new_account("ada")),
            Err(Error::DuplicateUsername)
        );
    }

    #[test]
    fn create_assigns_distinct_account_numbers() {
        let mut store = get_test_store();

        let first = store.create(new_account("ada")).unwrap();
        let second = store.create(new_account("grace")).unwrap();

        assert_ne!(first.account_number, second.account_number);
    }

    #[test]
    fn get_returns_created_account() {
        let mut store = get_test_store();

        let created = store.create(new_account("ada")).unwrap();
        let retrieved = store.get(created.id).unwrap();

        assert_eq!(retrieved, created);
    }

    #[test]
    fn get_fails_with_non_existent_id() {
        let store = get_test_store();

        assert_eq!(
            store.get(AccountId::new(42)),
            Err(Error::AccountNotFound)
        );
    }

    #[test]
    fn get_by_username_returns_created_account() {
        let mut store = get_test_store();

        let created = store.create(new_account("ada")).unwrap();
        let retrieved = store.get_by_username("ada").unwrap();

        assert_eq!(retrieved, created);
    }

    #[test]
    fn get_all_returns_accounts_in_insertion_order() {
        let mut store = get_test_store();

        let first = store.create(new_account("ada")).unwrap();
        let second = store.create(new_account("grace")).unwrap();

        assert_eq!(store.get_all().unwrap(), vec![first, second]);
    }

    #[test]
    fn update_merges_and_persists() {
        let mut store = get_test_store();

        let created = store.create(new_account("ada")).unwrap();
        let update = AccountUpdate {
            first_name: Some("Augusta".to_string()),
            last_name: Some(String::new()),
            username: None,
            password_hash: None,
        };

        let updated = store.update(created.id, update).unwrap();

        assert_eq!(updated.first_name, "Augusta");
        assert_eq!(updated.last_name, created.last_name);
        assert_eq!(updated.username, created.username);
        assert_eq!(store.get(created.id).unwrap(), updated);
    }

    #[test]
    fn update_fails_with_non_existent_id() {
        let mut store = get_test_store();

        assert_eq!(
            store.update(AccountId::new(42), AccountUpdate::default()),
            Err(Error::AccountNotFound)
        );
    }

    #[test]
    fn delete_removes_account() {
        let mut store = get_test_store();

        let created = store.create(new_account("ada")).unwrap();

        store.delete(created.id).unwrap();

        assert_eq!(store.get(created.id), Err(Error::AccountNotFound));
    }

    #[test]
    fn delete_fails_with_non_existent_id() {
        let mut store = get_test_store();

        assert_eq!(
            store.delete(AccountId::new(42)),
            Err(Error::AccountNotFound)
        );
    }

    #[test]
    fn set_balance_overwrites_unconditionally() {
        let mut store = get_test_store();

        let created = store.create(new_account("ada")).unwrap();

        // The store performs no invariant check, even for negative values.
        // The engine is responsible for never committing one.
        store.set_balance(created.id, -50).unwrap();

        assert_eq!(store.get(created.id).unwrap().balance, -50);
    }

    #[test]
    fn set_balance_fails_with_non_existent_id() {
        let mut store = get_test_store();

        assert_eq!(
            store.set_balance(AccountId::new(42), 100),
            Err(Error::AccountNotFound)
        );
    }
}
