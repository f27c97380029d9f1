//! The HTTP surface: route construction and request handlers.
//!
//! Handlers decode requests, resolve the acting account through the bearer
//! token, call into the stores or the transfer engine, and encode the result.
//! All money-movement semantics live in [crate::engine], not here.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    AppState, Error,
    auth::{self, Claims},
    engine::TransferOutcome,
    models::{Account, AccountId, AccountUpdate, BalanceView, LedgerEntry, NewAccount, PasswordHash},
    stores::{AccountStore, LedgerStore},
};

/// Return a router with all the app's routes.
pub fn build_router<A, L>(state: AppState<A, L>) -> Router
where
    A: AccountStore + Clone + Send + Sync + 'static,
    L: LedgerStore + Clone + Send + Sync + 'static,
{
    Router::new()
        .route(
            "/account",
            post(create_account::<A, L>).get(get_all_accounts::<A, L>),
        )
        .route(
            "/account/{id}",
            get(get_account::<A, L>)
                .patch(update_account::<A, L>)
                .delete(delete_account::<A, L>),
        )
        .route("/login", post(auth::sign_in::<A, L>))
        .route("/transfer", get(get_all_transfers::<A, L>))
        .route(
            "/transfer/{id}",
            get(account_history::<A, L>)
                .patch(adjust_balance::<A, L>)
                .post(transfer::<A, L>),
        )
        .with_state(state)
}

/// The data a caller signs up with.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CreateAccountRequest {
    first_name: String,
    last_name: String,
    username: String,
    password: String,
}

/// A freshly created account and its first session token.
#[derive(Debug, Serialize)]
struct CreateAccountResponse {
    account: Account,
    token: String,
}

async fn create_account<A, L>(
    State(state): State<AppState<A, L>>,
    Json(request): Json<CreateAccountRequest>,
) -> Result<Json<CreateAccountResponse>, Error>
where
    A: AccountStore + Clone + Send + Sync,
    L: LedgerStore + Clone + Send + Sync,
{
    let password_hash = PasswordHash::new(&request.password, PasswordHash::DEFAULT_COST)?;

    let mut account_store = state.account_store;
    let account = account_store.create(NewAccount {
        first_name: request.first_name,
        last_name: request.last_name,
        username: request.username,
        password_hash,
    })?;

    let token = auth::encode_token(account.id, &state.auth_keys)?;

    Ok(Json(CreateAccountResponse { account, token }))
}

async fn get_all_accounts<A, L>(
    State(state): State<AppState<A, L>>,
) -> Result<Json<Vec<Account>>, Error>
where
    A: AccountStore + Clone + Send + Sync,
    L: LedgerStore + Clone + Send + Sync,
{
    Ok(Json(state.account_store.get_all()?))
}

async fn get_account<A, L>(
    State(state): State<AppState<A, L>>,
    claims: Claims,
    Path(id): Path<i64>,
) -> Result<Json<Account>, Error>
where
    A: AccountStore + Clone + Send + Sync,
    L: LedgerStore + Clone + Send + Sync,
{
    let id = AccountId::new(id);
    claims.authorize(id)?;

    Ok(Json(state.account_store.get(id)?))
}

/// A partial profile update. The caller re-authenticates with their current
/// credentials; fields that are absent or empty keep their previous value.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct UpdateAccountRequest {
    current_username: String,
    current_password: String,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

async fn update_account<A, L>(
    State(state): State<AppState<A, L>>,
    claims: Claims,
    Path(id): Path<i64>,
    Json(request): Json<UpdateAccountRequest>,
) -> Result<Json<Account>, Error>
where
    A: AccountStore + Clone + Send + Sync,
    L: LedgerStore + Clone + Send + Sync,
{
    let id = AccountId::new(id);
    claims.authorize(id)?;

    let current = state.account_store.get(id)?;

    let password_is_correct = current
        .password_hash
        .verify(&request.current_password)
        .map_err(|error| Error::HashingError(error.to_string()))?;

    if current.username != request.current_username || !password_is_correct {
        return Err(Error::InvalidCredentials);
    }

    let password_hash = match request.password {
        Some(password) if !password.is_empty() => {
            Some(PasswordHash::new(&password, PasswordHash::DEFAULT_COST)?)
        }
        _ => None,
    };

    let mut account_store = state.account_store;
    let updated = account_store.update(
        id,
        AccountUpdate {
            first_name: request.first_name,
            last_name: request.last_name,
            username: request.username,
            password_hash,
        },
    )?;

    Ok(Json(updated))
}

async fn delete_account<A, L>(
    State(state): State<AppState<A, L>>,
    claims: Claims,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, Error>
where
    A: AccountStore + Clone + Send + Sync,
    L: LedgerStore + Clone + Send + Sync,
{
    let id = AccountId::new(id);
    claims.authorize(id)?;

    let mut account_store = state.account_store;
    account_store.delete(id)?;

    Ok(Json(json!({ "deleted": id })))
}

async fn get_all_transfers<A, L>(
    State(state): State<AppState<A, L>>,
) -> Result<Json<Vec<LedgerEntry>>, Error>
where
    A: AccountStore + Clone + Send + Sync,
    L: LedgerStore + Clone + Send + Sync,
{
    Ok(Json(state.ledger_store.get_all()?))
}

/// An account's balance view plus every ledger entry it participated in.
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct AccountHistoryResponse {
    my_balance: BalanceView,
    transfers: Vec<LedgerEntry>,
}

async fn account_history<A, L>(
    State(state): State<AppState<A, L>>,
    claims: Claims,
    Path(id): Path<i64>,
) -> Result<Json<AccountHistoryResponse>, Error>
where
    A: AccountStore + Clone + Send + Sync,
    L: LedgerStore + Clone + Send + Sync,
{
    let id = AccountId::new(id);
    claims.authorize(id)?;

    let my_balance = state.engine.read_balance(id)?;
    let transfers = state.ledger_store.get_for_account(id)?;

    Ok(Json(AccountHistoryResponse {
        my_balance,
        transfers,
    }))
}

/// A signed amount: positive deposits, negative withdraws.
#[derive(Debug, Deserialize)]
struct AdjustBalanceRequest {
    amount: i64,
}

async fn adjust_balance<A, L>(
    State(state): State<AppState<A, L>>,
    claims: Claims,
    Path(id): Path<i64>,
    Json(request): Json<AdjustBalanceRequest>,
) -> Result<Json<BalanceView>, Error>
where
    A: AccountStore + Clone + Send + Sync,
    L: LedgerStore + Clone + Send + Sync,
{
    let id = AccountId::new(id);
    claims.authorize(id)?;

    let mut engine = state.engine;
    Ok(Json(engine.adjust_balance(id, request.amount)?))
}

/// A peer-to-peer transfer to another account's internal id.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct TransferRequest {
    to_account: i64,
    amount: i64,
}

async fn transfer<A, L>(
    State(state): State<AppState<A, L>>,
    claims: Claims,
    Path(id): Path<i64>,
    Json(request): Json<TransferRequest>,
) -> Result<Json<TransferOutcome>, Error>
where
    A: AccountStore + Clone + Send + Sync,
    L: LedgerStore + Clone + Send + Sync,
{
    let id = AccountId::new(id);
    claims.authorize(id)?;

    let mut engine = state.engine;
    let outcome = engine.transfer(id, AccountId::new(request.to_account), request.amount)?;

    Ok(Json(outcome))
}
