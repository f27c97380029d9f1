//! This file defines a bank account and its supporting types.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::models::PasswordHash;

/// A newtype wrapper for integer account IDs.
///
/// This helps disambiguate the internal storage identifier from the
/// caller-visible account number, leading to better compile time errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(i64);

impl AccountId {
    /// Create an account ID from an integer.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// The underlying integer value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A bank account: identity fields plus the current balance in minor
/// currency units.
///
/// The balance is only ever mutated through the
/// [TransferEngine](crate::engine::TransferEngine); the identity fields only
/// through the profile-update path.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Account {
    /// The account's ID in the database.
    pub id: AccountId,
    /// The holder's first name.
    pub first_name: String,
    /// The holder's last name.
    pub last_name: String,
    /// The unique login handle.
    pub username: String,
    /// The bcrypt hash of the holder's password. Never serialized.
    #[serde(skip_serializing)]
    pub password_hash: PasswordHash,
    /// The unique, caller-visible 8-digit account number.
    #[serde(rename = "bank-number")]
    pub account_number: i64,
    /// The current balance in minor currency units. Never negative after a
    /// successful operation.
    pub balance: i64,
    /// When the account was created (UTC).
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Account {
    /// The caller-visible view of this account's balance.
    pub fn balance_view(&self) -> BalanceView {
        BalanceView {
            username: self.username.clone(),
            account_number: self.account_number,
            balance: self.balance,
        }
    }
}

/// The data needed to create a new account.
///
/// The store assigns the ID, the unique account number, a zero balance and
/// the creation timestamp.
#[derive(Debug, Clone)]
pub struct NewAccount {
    /// The holder's first name.
    pub first_name: String,
    /// The holder's last name.
    pub last_name: String,
    /// The unique login handle.
    pub username: String,
    /// The bcrypt hash of the holder's password.
    pub password_hash: PasswordHash,
}

/// The caller-visible view of an account's balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceView {
    /// The login handle of the account holder.
    pub username: String,
    /// The caller-visible account number.
    #[serde(rename = "my-account")]
    pub account_number: i64,
    /// The current balance in minor currency units.
    pub balance: i64,
}

/// A partial update of an account's identity fields.
///
/// The merge is deliberately permissive: a field that is absent *or* supplied
/// as an empty string keeps its previous value. This is an observable
/// contract and must not be tightened.
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    /// Replacement first name, if any.
    pub first_name: Option<String>,
    /// Replacement last name, if any.
    pub last_name: Option<String>,
    /// Replacement login handle, if any.
    pub username: Option<String>,
    /// Replacement password hash, if any.
    pub password_hash: Option<PasswordHash>,
}

impl AccountUpdate {
    /// Apply this update on top of `current`, keeping the previous value for
    /// every field that is absent or empty.
    ///
    /// The balance, ID, account number and creation timestamp are never
    /// touched by a profile update.
    pub fn merged_with(self, current: &Account) -> Account {
        Account {
            id: current.id,
            first_name: merge_field(self.first_name, &current.first_name),
            last_name: merge_field(self.last_name, &current.last_name),
            username: merge_field(self.username, &current.username),
            password_hash: self
                .password_hash
                .unwrap_or_else(|| current.password_hash.clone()),
            account_number: current.account_number,
            balance: current.balance,
            created_at: current.created_at,
        }
    }
}

fn merge_field(new_value: Option<String>, current: &str) -> String {
    match new_value {
        Some(value) if !value.is_empty() => value,
        _ => current.to_string(),
    }
}

#[cfg(test)]
mod account_update_tests {
    use time::macros::datetime;

    use crate::models::{Account, AccountId, AccountUpdate, PasswordHash};

    fn test_account() -> Account {
        Account {
            id: AccountId::new(1),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            username: "ada".to_string(),
            password_hash: PasswordHash::new_unchecked("$2b$04$abcdefghijklmnopqrstuv"),
            account_number: 12345678,
            balance: 250,
            created_at: datetime!(2025-01-01 00:00:00 UTC),
        }
    }

    #[test]
    fn empty_update_keeps_every_field() {
        let account = test_account();

        let merged = AccountUpdate::default().merged_with(&account);

        assert_eq!(merged, account);
    }

    #[test]
    fn empty_strings_keep_previous_values() {
        let account = test_account();
        let update = AccountUpdate {
            first_name: Some(String::new()),
            last_name: Some(String::new()),
            username: Some(String::new()),
            password_hash: None,
        };

        let merged = update.merged_with(&account);

        assert_eq!(merged, account);
    }

    #[test]
    fn supplied_fields_replace_previous_values() {
        let account = test_account();
        let update = AccountUpdate {
            first_name: Some("Augusta".to_string()),
            last_name: None,
            username: Some("augusta".to_string()),
            password_hash: None,
        };

        let merged = update.merged_with(&account);

        assert_eq!(merged.first_name, "Augusta");
        assert_eq!(merged.last_name, account.last_name);
        assert_eq!(merged.username, "augusta");
        assert_eq!(merged.password_hash, account.password_hash);
    }

    #[test]
    fn update_never_touches_balance_or_account_number() {
        let account = test_account();
        let update = AccountUpdate {
            first_name: Some("Augusta".to_string()),
            last_name: Some("King".to_string()),
            username: Some("countess".to_string()),
            password_hash: Some(PasswordHash::new_unchecked("$2b$04$vutsrqponmlkjihgfedcba")),
        };

        let merged = update.merged_with(&account);

        assert_eq!(merged.id, account.id);
        assert_eq!(merged.balance, account.balance);
        assert_eq!(merged.account_number, account.account_number);
        assert_eq!(merged.created_at, account.created_at);
    }
}
