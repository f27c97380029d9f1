//! Token-based session handling: signing in, issuing JWTs and extracting the
//! authenticated account from a request.
//!
//! The core trusts the account identifier resolved here; it performs no
//! credential checks of its own.

use axum::{
    Json, RequestPartsExt,
    extract::{FromRef, FromRequestParts, State},
    http::request::Parts,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::{
    AppState, Error,
    models::AccountId,
    stores::{AccountStore, LedgerStore},
};

/// How long an issued token stays valid.
const TOKEN_DURATION: Duration = Duration::hours(24);

/// The signing and verification keys for session tokens, derived from one
/// shared secret.
#[derive(Clone)]
pub struct AuthKeys {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AuthKeys {
    /// Create the key pair from a secret string.
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_ref()),
            decoding_key: DecodingKey::from_secret(secret.as_ref()),
        }
    }
}

/// The contents of a session token.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// The expiry time of the token as a unix timestamp.
    pub exp: usize,
    /// The time the token was issued as a unix timestamp.
    pub iat: usize,
    /// The account the token was issued to.
    pub sub: AccountId,
}

impl Claims {
    /// Check that the token was issued to `id`.
    ///
    /// Returns [Error::Forbidden] when it was not, so a caller can never act
    /// on another holder's account with their own valid token.
    pub fn authorize(&self, id: AccountId) -> Result<(), Error> {
        if self.sub == id {
            Ok(())
        } else {
            Err(Error::Forbidden)
        }
    }
}

impl<S> FromRequestParts<S> for Claims
where
    AuthKeys: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| Error::InvalidToken)?;

        let keys = AuthKeys::from_ref(state);

        decode_token(bearer.token(), &keys)
    }
}

/// Issue a token for `account_id`, valid for [TOKEN_DURATION].
pub fn encode_token(account_id: AccountId, keys: &AuthKeys) -> Result<String, Error> {
    let now = OffsetDateTime::now_utc();
    let claims = Claims {
        exp: (now + TOKEN_DURATION).unix_timestamp() as usize,
        iat: now.unix_timestamp() as usize,
        sub: account_id,
    };

    encode(&Header::default(), &claims, &keys.encoding_key)
        .map_err(|error| Error::TokenCreation(error.to_string()))
}

fn decode_token(token: &str, keys: &AuthKeys) -> Result<Claims, Error> {
    decode::<Claims>(token, &keys.decoding_key, &Validation::default())
        .map(|data| data.claims)
        .map_err(|_| Error::InvalidToken)
}

/// The credentials a caller signs in with.
#[derive(Debug, Deserialize)]
pub struct Credentials {
    /// The login handle entered during sign-in.
    pub username: String,
    /// The password entered during sign-in.
    pub password: String,
}

/// A successful sign-in: who signed in and their session token.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    /// The login handle of the signed-in account.
    pub username: String,
    /// The bearer token for subsequent requests.
    pub token: String,
}

/// Handler for sign-in requests.
///
/// Responds with [Error::InvalidCredentials] whether the username or the
/// password was wrong, so a caller cannot probe which usernames exist.
pub async fn sign_in<A, L>(
    State(state): State<AppState<A, L>>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<LoginResponse>, Error>
where
    A: AccountStore + Clone + Send + Sync,
    L: LedgerStore + Clone + Send + Sync,
{
    let account = state
        .account_store
        .get_by_username(&credentials.username)
        .map_err(|error| match error {
            Error::AccountNotFound => Error::InvalidCredentials,
            other => other,
        })?;

    let password_is_correct = account
        .password_hash
        .verify(&credentials.password)
        .map_err(|error| Error::HashingError(error.to_string()))?;

    if !password_is_correct {
        return Err(Error::InvalidCredentials);
    }

    let token = encode_token(account.id, &state.auth_keys)?;

    Ok(Json(LoginResponse {
        username: account.username,
        token,
    }))
}
