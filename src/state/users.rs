// Accounts and bearer tokens. Registration leaves the account locked
// behind an admin approval link; tokens live in their own collection so
// logout can revoke a refresh token by deleting it.

use anyhow::{Context, anyhow};
use bson::{DateTime, doc, oid::ObjectId};
use data_encoding::BASE32_NOPAD;
use openssl::{hash::MessageDigest, memcmp, pkcs5::pbkdf2_hmac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

use crate::error::ApiError;
use crate::models::{AuthToken, TokenKind, User};

use super::{ACCESS_TTL_SECONDS, APPROVAL_TTL_SECONDS, AppState, REFRESH_TTL_SECONDS};

const PBKDF2_ITERATIONS: usize = 260_000;
const SALT_BYTES: usize = 16;
const HASH_BYTES: usize = 32;
const TOKEN_BYTES: usize = 32;

#[derive(Debug, Deserialize)]
pub struct RegisterInput {
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_approved: bool,
}

#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

impl UserView {
    pub fn of(user: &User) -> Self {
        UserView {
            id: user.id.map(|id| id.to_hex()).unwrap_or_default(),
            email: user.email.clone(),
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            is_approved: user.is_approved,
        }
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    BASE32_NOPAD.encode(&bytes)
}

fn derive_key(password: &str, salt: &[u8]) -> Result<[u8; HASH_BYTES], ApiError> {
    let mut key = [0u8; HASH_BYTES];
    pbkdf2_hmac(
        password.as_bytes(),
        salt,
        PBKDF2_ITERATIONS,
        MessageDigest::sha256(),
        &mut key,
    )
    .context("pbkdf2 derivation failed")?;
    Ok(key)
}

/// PBKDF2-SHA256 hash in `pbkdf2_sha256$iterations$salt$hash` form, with
/// the salt and digest Base32 encoded.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let mut salt = [0u8; SALT_BYTES];
    rand::rng().fill_bytes(&mut salt);
    let key = derive_key(password, &salt)?;
    Ok(format!(
        "pbkdf2_sha256${PBKDF2_ITERATIONS}${}${}",
        BASE32_NOPAD.encode(&salt),
        BASE32_NOPAD.encode(&key)
    ))
}

pub fn verify_password(password: &str, stored: &str) -> Result<bool, ApiError> {
    let mut parts = stored.split('$');
    let (algo, iterations, salt, digest) = match (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) {
        (Some(a), Some(i), Some(s), Some(d)) => (a, i, s, d),
        _ => return Ok(false),
    };
    if algo != "pbkdf2_sha256" {
        return Ok(false);
    }
    // Older records verify with their recorded iteration count.
    let iterations: usize = iterations
        .parse()
        .map_err(|_| ApiError::Internal(anyhow!("corrupt password hash")))?;
    let salt = BASE32_NOPAD
        .decode(salt.as_bytes())
        .map_err(|_| ApiError::Internal(anyhow!("corrupt password salt")))?;
    let expected = BASE32_NOPAD
        .decode(digest.as_bytes())
        .map_err(|_| ApiError::Internal(anyhow!("corrupt password digest")))?;

    let mut key = vec![0u8; expected.len()];
    pbkdf2_hmac(
        password.as_bytes(),
        &salt,
        iterations,
        MessageDigest::sha256(),
        &mut key,
    )
    .context("pbkdf2 derivation failed")?;
    Ok(key.len() == expected.len() && memcmp::eq(&key, &expected))
}

async fn issue_token(
    state: &AppState,
    user_id: ObjectId,
    kind: TokenKind,
) -> Result<String, ApiError> {
    let ttl = match kind {
        TokenKind::Access => ACCESS_TTL_SECONDS,
        TokenKind::Refresh => REFRESH_TTL_SECONDS,
    };
    let token = random_token();
    state
        .tokens
        .insert_one(AuthToken {
            id: None,
            token: token.clone(),
            user_id,
            kind,
            expires_at: DateTime::from_system_time(SystemTime::now() + Duration::from_secs(ttl)),
        })
        .await?;
    Ok(token)
}

async fn issue_token_pair(state: &AppState, user_id: ObjectId) -> Result<TokenPair, ApiError> {
    Ok(TokenPair {
        access: issue_token(state, user_id, TokenKind::Access).await?,
        refresh: issue_token(state, user_id, TokenKind::Refresh).await?,
    })
}

pub async fn register(
    state: &AppState,
    input: RegisterInput,
) -> Result<(UserView, TokenPair), ApiError> {
    if input.password.len() < 8 {
        return Err(ApiError::validation(
            "password",
            "password must be at least 8 characters",
        ));
    }
    if state
        .users
        .find_one(doc! { "email": &input.email })
        .await?
        .is_some()
    {
        return Err(ApiError::conflict(format!(
            "email {} is already registered",
            input.email
        )));
    }
    if state
        .users
        .find_one(doc! { "username": &input.username })
        .await?
        .is_some()
    {
        return Err(ApiError::conflict(format!(
            "username {} is already taken",
            input.username
        )));
    }

    let approval_token = random_token();
    let mut user = User {
        id: None,
        email: input.email,
        username: input.username,
        first_name: input.first_name,
        last_name: input.last_name,
        password_hash: hash_password(&input.password)?,
        is_approved: false,
        approval_token: Some(approval_token.clone()),
        approval_expires_at: Some(DateTime::from_system_time(
            SystemTime::now() + Duration::from_secs(APPROVAL_TTL_SECONDS),
        )),
        created_at: Some(DateTime::from_system_time(SystemTime::now())),
    };
    let res = state.users.insert_one(&user).await?;
    user.id = res.inserted_id.as_object_id();
    let user_id = user
        .id
        .ok_or_else(|| ApiError::Internal(anyhow!("user insert missing _id")))?;

    // There is no outbound mail; the approval link goes to the log for an
    // operator to forward.
    tracing::info!(
        email = %user.email,
        "new account pending approval: /api/admin/approve-user?token={approval_token}"
    );

    let tokens = issue_token_pair(state, user_id).await?;
    Ok((UserView::of(&user), tokens))
}

pub async fn login(state: &AppState, input: LoginInput) -> Result<(UserView, TokenPair), ApiError> {
    let user = state
        .users
        .find_one(doc! { "email": &input.email })
        .await?
        .ok_or_else(|| ApiError::unauthorized("invalid email or password"))?;
    if !verify_password(&input.password, &user.password_hash)? {
        return Err(ApiError::unauthorized("invalid email or password"));
    }
    if !user.is_approved {
        return Err(ApiError::unauthorized("account is pending admin approval"));
    }
    let user_id = user
        .id
        .ok_or_else(|| ApiError::Internal(anyhow!("stored user missing _id")))?;
    let tokens = issue_token_pair(state, user_id).await?;
    Ok((UserView::of(&user), tokens))
}

/// Resolve a live token of the given kind to its user.
pub async fn user_for_token(
    state: &AppState,
    token: &str,
    kind: TokenKind,
) -> Result<Option<User>, ApiError> {
    let record = state
        .tokens
        .find_one(doc! { "token": token, "kind": kind.as_str() })
        .await?;
    let Some(record) = record else { return Ok(None) };
    if record.expires_at.to_system_time() <= SystemTime::now() {
        state.tokens.delete_one(doc! { "token": token }).await?;
        return Ok(None);
    }
    state
        .users
        .find_one(doc! { "_id": &record.user_id })
        .await
        .map_err(Into::into)
}

/// Exchange a refresh token for a fresh access token.
pub async fn refresh(state: &AppState, refresh_token: &str) -> Result<TokenPair, ApiError> {
    let user = user_for_token(state, refresh_token, TokenKind::Refresh)
        .await?
        .ok_or_else(|| ApiError::unauthorized("invalid or expired refresh token"))?;
    if !user.is_approved {
        return Err(ApiError::unauthorized("account is pending admin approval"));
    }
    let user_id = user
        .id
        .ok_or_else(|| ApiError::Internal(anyhow!("stored user missing _id")))?;
    let access = issue_token(state, user_id, TokenKind::Access).await?;
    Ok(TokenPair {
        access,
        refresh: refresh_token.to_string(),
    })
}

/// Deleting the refresh token is the blacklist; the access token is left
/// to expire on its own clock.
pub async fn logout(state: &AppState, refresh_token: &str) -> Result<(), ApiError> {
    state
        .tokens
        .delete_one(doc! { "token": refresh_token, "kind": TokenKind::Refresh.as_str() })
        .await?;
    Ok(())
}

/// Follow an approval link. Idempotent for an already-approved account
/// whose token matches.
pub async fn approve_user(state: &AppState, token: &str) -> Result<UserView, ApiError> {
    let user = state
        .users
        .find_one(doc! { "approval_token": token })
        .await?
        .ok_or_else(|| ApiError::not_found("approval token not recognized"))?;
    if let Some(expires) = user.approval_expires_at {
        if expires.to_system_time() <= SystemTime::now() {
            return Err(ApiError::unauthorized("approval token has expired"));
        }
    }
    state
        .users
        .update_one(
            doc! { "approval_token": token },
            doc! { "$set": { "is_approved": true } },
        )
        .await?;
    let mut approved = user;
    approved.is_approved = true;
    Ok(UserView::of(&approved))
}
