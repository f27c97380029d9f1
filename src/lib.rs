//! Teller is a small banking backend: account signup/login and money
//! movement (deposits, withdrawals, peer-to-peer transfers) persisted in
//! SQLite and exposed as a JSON REST API with bearer-token sessions.
//!
//! The interesting part lives in [engine::TransferEngine], which owns the
//! read-validate-write sequence for balances and guarantees that balances
//! never go negative and that a transfer conserves money across accounts.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde_json::json;
use tokio::signal;

pub mod auth;
pub mod db;
pub mod engine;
pub mod models;
mod routes;
mod state;
pub mod stores;

pub use routes::build_router;
pub use state::AppState;

use crate::models::AccountId;

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
///
/// Each variant maps to a distinct, stable error code in the HTTP response so
/// callers can tell "retry is safe" apart from "do not retry".
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The amount is zero, has the wrong sign for the operation, or would
    /// overflow the balance. No state was changed.
    #[error("the amount {0} is not valid for this operation")]
    InvalidAmount(i64),

    /// The account's balance would go negative. No state was changed.
    #[error("insufficient funds: balance is {balance}, requested {requested}")]
    InsufficientFunds {
        /// The balance at the time of the request.
        balance: i64,
        /// The amount the caller tried to remove.
        requested: i64,
    },

    /// No account matched the given id or username.
    #[error("the account could not be found")]
    AccountNotFound,

    /// The username is already taken. The client should try a different one.
    #[error("the username is already in use")]
    DuplicateUsername,

    /// The randomly generated account number collided with an existing one.
    /// The store re-samples on collision, so seeing this error means the
    /// retry budget was exhausted.
    #[error("the account number is already in use")]
    DuplicateAccountNumber,

    /// The username and password combination did not match an account.
    #[error("invalid username or password")]
    InvalidCredentials,

    /// The caller's token does not grant access to the requested account.
    #[error("the token does not grant access to this account")]
    Forbidden,

    /// The bearer token is missing, malformed, expired, or not signed with
    /// the server's key.
    #[error("missing or invalid token")]
    InvalidToken,

    /// A session token could not be created.
    ///
    /// The error string should only be logged for debugging on the server.
    #[error("could not create a token: {0}")]
    TokenCreation(String),

    /// An unexpected error occurred with the underlying hashing library.
    ///
    /// The error string should only be logged for debugging on the server,
    /// never sent to the client.
    #[error("hashing failed: {0}")]
    HashingError(String),

    /// A repository read or write did not complete.
    ///
    /// For single-account operations no partial state was committed, so
    /// retrying the whole operation is safe.
    #[error("a storage operation did not complete: {0}")]
    PersistenceFailure(rusqlite::Error),

    /// A transfer debited the source account, the credit to the destination
    /// failed, and the write restoring the source also failed.
    ///
    /// The system is left inconsistent (money debited but not credited) and
    /// needs out-of-band reconciliation. Never retried.
    #[error("transfer could not be completed or reversed, manual reconciliation required")]
    CompensationFailure {
        /// The account that was debited and could not be restored.
        source_account: AccountId,
        /// The balance the source account should be restored to.
        restore_to: i64,
    },
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            // Code 2067 occurs when a UNIQUE constraint failed.
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == 2067 && desc.contains("username") =>
            {
                Error::DuplicateUsername
            }
            rusqlite::Error::SqliteFailure(sql_error, Some(ref desc))
                if sql_error.extended_code == 2067 && desc.contains("account_number") =>
            {
                Error::DuplicateAccountNumber
            }
            rusqlite::Error::QueryReturnedNoRows => Error::AccountNotFound,
            error => Error::PersistenceFailure(error),
        }
    }
}

impl Error {
    /// The stable, machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidAmount(_) => "invalid_amount",
            Error::InsufficientFunds { .. } => "insufficient_funds",
            Error::AccountNotFound => "account_not_found",
            Error::DuplicateUsername => "duplicate_username",
            Error::DuplicateAccountNumber => "duplicate_account_number",
            Error::InvalidCredentials => "invalid_credentials",
            Error::Forbidden => "forbidden",
            Error::InvalidToken => "invalid_token",
            Error::TokenCreation(_) => "token_creation",
            Error::HashingError(_) => "internal_error",
            Error::PersistenceFailure(_) => "persistence_failure",
            Error::CompensationFailure { .. } => "compensation_failure",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidAmount(_) | Error::InsufficientFunds { .. } => StatusCode::BAD_REQUEST,
            Error::AccountNotFound => StatusCode::NOT_FOUND,
            Error::DuplicateUsername | Error::DuplicateAccountNumber => StatusCode::CONFLICT,
            Error::InvalidCredentials | Error::InvalidToken => StatusCode::UNAUTHORIZED,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::TokenCreation(_)
            | Error::HashingError(_)
            | Error::PersistenceFailure(_)
            | Error::CompensationFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let message = match &self {
            // Internal details are logged server side, not shown to clients.
            Error::HashingError(inner) => {
                tracing::error!("hashing error: {inner}");
                "Internal server error".to_string()
            }
            Error::TokenCreation(inner) => {
                tracing::error!("token creation error: {inner}");
                "Internal server error".to_string()
            }
            Error::PersistenceFailure(inner) => {
                tracing::error!("persistence failure: {inner}");
                "A storage operation did not complete. Retrying is safe.".to_string()
            }
            Error::CompensationFailure {
                source_account,
                restore_to,
            } => {
                tracing::error!(
                    "compensation failure: account {source_account} must be restored to {restore_to}"
                );
                "The transfer could not be completed or reversed. \
                 Do not retry, contact support."
                    .to_string()
            }
            error => error.to_string(),
        };

        let body = Json(json!({
            "error": message,
            "code": self.code(),
        }));

        (self.status_code(), body).into_response()
    }
}

#[cfg(test)]
mod error_tests {
    use crate::Error;

    #[test]
    fn unique_username_violation_maps_to_duplicate_username() {
        let sql_error = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ffi::ErrorCode::ConstraintViolation,
                extended_code: 2067,
            },
            Some("UNIQUE constraint failed: account.username".to_string()),
        );

        assert_eq!(Error::from(sql_error), Error::DuplicateUsername);
    }

    #[test]
    fn unique_account_number_violation_maps_to_duplicate_account_number() {
        let sql_error = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ffi::ErrorCode::ConstraintViolation,
                extended_code: 2067,
            },
            Some("UNIQUE constraint failed: account.account_number".to_string()),
        );

        assert_eq!(Error::from(sql_error), Error::DuplicateAccountNumber);
    }

    #[test]
    fn no_rows_maps_to_account_not_found() {
        assert_eq!(
            Error::from(rusqlite::Error::QueryReturnedNoRows),
            Error::AccountNotFound
        );
    }

    #[test]
    fn error_codes_are_distinct() {
        let errors = [
            Error::InvalidAmount(0),
            Error::InsufficientFunds {
                balance: 0,
                requested: 1,
            },
            Error::AccountNotFound,
            Error::DuplicateUsername,
            Error::DuplicateAccountNumber,
            Error::InvalidCredentials,
            Error::Forbidden,
            Error::InvalidToken,
            Error::TokenCreation(String::new()),
            Error::HashingError(String::new()),
            Error::PersistenceFailure(rusqlite::Error::QueryReturnedNoRows),
            Error::CompensationFailure {
                source_account: crate::models::AccountId::new(1),
                restore_to: 0,
            },
        ];

        let mut codes: Vec<_> = errors.iter().map(Error::code).collect();
        codes.sort_unstable();
        codes.dedup();

        assert_eq!(codes.len(), errors.len());
    }
}
