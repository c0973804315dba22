//! Account registration and login.

use std::net::SocketAddr;
use std::sync::LazyLock;

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::{info, instrument, warn};
use validator::Validate;

use super::error::AuthError;
use super::password::{hash_password, verify_password};
use crate::db::{self, UserId};
use crate::error::{ServiceError, ServiceResult};
use crate::permissions::SiteFlags;
use crate::ratelimit::{client_ip, normalize_ip};
use crate::state::AppState;

static USERNAME_REGEX: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[A-Za-z0-9_]+$").unwrap());

/// Registration request.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    /// Display name (3-32 letters, digits, underscore). Not unique: the
    /// discriminator tag tells same-named users apart.
    #[validate(length(min = 3, max = 32), regex(path = *USERNAME_REGEX))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    /// Password (8-128 characters).
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

/// Login request.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Successful registration or login.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user_id: UserId,
    pub name: String,
    pub tag: i64,
    pub access_token: String,
    pub expires_in: i64,
}

/// Create an account and sign the new user in.
///
/// The source address is the peer, or the forwarded client when the limiter
/// trusts proxies. The limiter sees it normalised together with the email,
/// so the same address may retry one email as often as it likes but only
/// try a few distinct ones per day.
#[instrument(skip(state, headers, body), fields(username = %body.username))]
pub async fn register(
    state: &AppState,
    headers: &HeaderMap,
    peer: SocketAddr,
    body: RegisterRequest,
) -> ServiceResult<AuthResponse> {
    body.validate()?;

    let trust_proxy = state.limiter.config().trust_proxy;
    let source = normalize_ip(client_ip(headers, peer, trust_proxy));
    state.limiter.check(&source, &body.email)?;

    let password_hash = hash_password(&body.password)?;

    let mut tx = state.storage.begin().await?;
    let (user_id, tag) = match insert_account(&mut tx, &body, &password_hash).await {
        Ok(created) => created,
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::error!(error = %rollback, "Failed to roll back registration");
            }
            return Err(e);
        }
    };
    tx.commit().await?;

    info!(user_id, tag, "User registered");

    let mut conn = state.storage.acquire().await?;
    let access_token = issue_for_user(&mut conn, state, user_id).await?;
    Ok(AuthResponse {
        user_id,
        name: body.username,
        tag,
        access_token,
        expires_in: super::TOKEN_TTL_SECONDS,
    })
}

async fn insert_account(
    conn: &mut SqliteConnection,
    body: &RegisterRequest,
    password_hash: &str,
) -> ServiceResult<(UserId, i64)> {
    if db::email_exists(conn, &body.email).await? {
        return Err(ServiceError::Validation("Email already registered".into()));
    }
    let tag = db::next_user_tag(conn, &body.username).await?;
    let user_id = db::insert_user(conn, &body.username, tag, &body.email, password_hash).await?;
    Ok((user_id, tag))
}

/// Verify credentials and issue a token.
///
/// An unknown email and a wrong password give the same error.
#[instrument(skip(state, body))]
pub async fn login(state: &AppState, body: LoginRequest) -> ServiceResult<AuthResponse> {
    let mut conn = state.storage.acquire().await?;
    let user = db::find_user_by_email(&mut conn, &body.email)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    if !verify_password(&body.password, &user.password)? {
        warn!(user_id = user.id, "Failed login attempt");
        return Err(AuthError::InvalidCredentials.into());
    }

    let access_token = issue_for_user(&mut conn, state, user.id).await?;
    info!(user_id = user.id, "User logged in");
    Ok(AuthResponse {
        user_id: user.id,
        name: user.name,
        tag: user.tag,
        access_token,
        expires_in: super::TOKEN_TTL_SECONDS,
    })
}

/// Sign a token carrying the user's current roles and site flags.
///
/// Site flags are the OR of every site role the user holds, recomputed on
/// each issuance.
pub async fn issue_for_user(
    conn: &mut SqliteConnection,
    state: &AppState,
    user_id: UserId,
) -> ServiceResult<String> {
    let roles = db::user_role_names(conn, user_id).await?;
    let site_flags = SiteFlags::aggregate(db::user_site_role_flags(conn, user_id).await?);
    Ok(state.tokens.issue(user_id, &roles, site_flags)?)
}
