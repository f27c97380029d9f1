//! This file defines the immutable ledger entry and its action tag.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::models::AccountId;

/// The kind of balance change a ledger entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryAction {
    /// Money added to an account by its holder.
    Deposit,
    /// Money removed from an account by its holder.
    Withdrawal,
    /// The debit leg of a peer-to-peer transfer, recorded on the source.
    TransferDebit,
    /// The credit leg of a peer-to-peer transfer, recorded on the destination.
    TransferCredit,
}

impl Display for EntryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            EntryAction::Deposit => "deposit",
            EntryAction::Withdrawal => "withdrawal",
            EntryAction::TransferDebit => "transfer_debit",
            EntryAction::TransferCredit => "transfer_credit",
        };

        write!(f, "{text}")
    }
}

impl FromStr for EntryAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(EntryAction::Deposit),
            "withdrawal" => Ok(EntryAction::Withdrawal),
            "transfer_debit" => Ok(EntryAction::TransferDebit),
            "transfer_credit" => Ok(EntryAction::TransferCredit),
            other => Err(format!("unknown ledger action \"{other}\"")),
        }
    }
}

/// An immutable record of one account's balance change, with a snapshot of
/// the balance before and after.
///
/// A deposit or withdrawal produces exactly one entry whose source and
/// destination both name the acting account. A peer-to-peer transfer produces
/// exactly two entries (a debit leg and a credit leg) sharing the same amount
/// and completion timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// The entry's monotonically assigned ID. Immutable once written.
    pub id: i64,
    /// The account the money came from.
    #[serde(rename = "from")]
    pub from_account: AccountId,
    /// The account the money went to.
    #[serde(rename = "to")]
    pub to_account: AccountId,
    /// The amount moved, always positive, in minor currency units.
    pub amount: i64,
    /// The kind of balance change this entry records.
    pub action: EntryAction,
    /// The described account's balance before the change.
    #[serde(rename = "previous-balance")]
    pub balance_before: i64,
    /// The described account's balance after the change.
    #[serde(rename = "current-balance")]
    pub balance_after: i64,
    /// When the change was committed (UTC). Both legs of one transfer share
    /// this timestamp exactly.
    #[serde(rename = "completed-at", with = "time::serde::rfc3339")]
    pub completed_at: OffsetDateTime,
}

/// A ledger entry that has not been appended yet, i.e. has no ID.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLedgerEntry {
    /// The account the money came from.
    pub from_account: AccountId,
    /// The account the money went to.
    pub to_account: AccountId,
    /// The amount moved, always positive, in minor currency units.
    pub amount: i64,
    /// The kind of balance change this entry records.
    pub action: EntryAction,
    /// The described account's balance before the change.
    pub balance_before: i64,
    /// The described account's balance after the change.
    pub balance_after: i64,
    /// When the change was committed (UTC).
    pub completed_at: OffsetDateTime,
}
