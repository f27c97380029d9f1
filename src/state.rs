//! Implements a struct that holds the state of the REST server.

use std::marker::{Send, Sync};

use axum::extract::FromRef;

use crate::{
    auth::AuthKeys,
    engine::{AccountLocks, TransferEngine},
    stores::{AccountStore, LedgerStore},
};

/// The state of the REST server.
#[derive(Clone)]
pub struct AppState<A, L>
where
    A: AccountStore + Clone + Send + Sync,
    L: LedgerStore + Clone + Send + Sync,
{
    /// The keys for signing and verifying session tokens.
    pub auth_keys: AuthKeys,
    /// The store for account identity and balances.
    pub account_store: A,
    /// The store for the immutable transfer ledger.
    pub ledger_store: L,
    /// The engine that owns all balance mutations.
    pub engine: TransferEngine<A, L>,
}

impl<A, L> AppState<A, L>
where
    A: AccountStore + Clone + Send + Sync,
    L: LedgerStore + Clone + Send + Sync,
{
    /// Create a new [AppState].
    ///
    /// The engine shares the given stores and one lock table, so every clone
    /// of this state serializes balance mutations per account.
    pub fn new(jwt_secret: &str, account_store: A, ledger_store: L) -> Self {
        let engine = TransferEngine::new(
            account_store.clone(),
            ledger_store.clone(),
            AccountLocks::default(),
        );

        Self {
            auth_keys: AuthKeys::new(jwt_secret),
            account_store,
            ledger_store,
            engine,
        }
    }
}

// this impl tells the Claims extractor how to access the keys from our state
impl<A, L> FromRef<AppState<A, L>> for AuthKeys
where
    A: AccountStore + Clone + Send + Sync,
    L: LedgerStore + Clone + Send + Sync,
{
    fn from_ref(state: &AppState<A, L>) -> Self {
        state.auth_keys.clone()
    }
}
