//! Database access for accounts, challenges, sessions, and reset tokens.
//!
//! Single-use records (wallet challenges, reset tokens) are consumed through
//! one conditional `UPDATE … RETURNING` statement so existence, the used
//! flag, and expiry are checked atomically; two concurrent redeemers cannot
//! both succeed. Expired rows are treated like missing rows everywhere, no
//! sweep process required.

use anyhow::{Context, Result};
use rand::{rngs::OsRng, RngCore};
use serde_json::json;
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::role::Role;
use super::state::AuthConfig;
use super::utils::{build_reset_url, generate_reset_token, hash_reset_token, is_unique_violation};

/// Leading address characters used to derive usernames for wallet accounts.
const USERNAME_PREFIX_LENGTH: usize = 8;

/// Columns shared by every user-returning query.
const USER_COLUMNS: &str = "id, username, wallet_address, email, role, bio, avatar_url, \
     is_public, banned_at IS NOT NULL AS banned, \
     CAST(EXTRACT(EPOCH FROM created_at) AS BIGINT) AS created_at_unix";

/// A full account row, minus credential material.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub wallet_address: Option<String>,
    pub email: Option<String>,
    pub role: Role,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub is_public: bool,
    pub banned: bool,
    pub created_at_unix: i64,
}

fn user_from_row(row: &sqlx::postgres::PgRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        username: row.get("username"),
        wallet_address: row.get("wallet_address"),
        email: row.get("email"),
        role: row.get("role"),
        bio: row.get("bio"),
        avatar_url: row.get("avatar_url"),
        is_public: row.get("is_public"),
        banned: row.get("banned"),
        created_at_unix: row.get("created_at_unix"),
    }
}

/// Outcome when attempting to create a new email/password account.
#[derive(Debug)]
pub(super) enum SignupOutcome {
    Created(UserRecord),
    Conflict,
}

/// Outcome for a profile update.
#[derive(Debug)]
pub(crate) enum ProfileOutcome {
    Updated(UserRecord),
    Conflict,
    Missing,
}

/// Outcome for a reset request (the caller always responds identically).
#[derive(Debug)]
pub(super) enum ResetRequestOutcome {
    Queued,
    Noop,
}

/// Session lookup result: the owning account joined onto the session row.
#[derive(Debug)]
pub(crate) struct SessionRecord {
    pub(crate) user: UserRecord,
}

pub(super) async fn insert_email_user(
    pool: &PgPool,
    username: &str,
    email: &str,
    password_hash: &str,
) -> Result<SignupOutcome> {
    let query = format!(
        "INSERT INTO users (username, email, password_hash) VALUES ($1, $2, $3) \
         RETURNING {USER_COLUMNS}"
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .fetch_one(pool)
        .instrument(span)
        .await;

    match row {
        Ok(row) => Ok(SignupOutcome::Created(user_from_row(&row))),
        Err(err) if is_unique_violation(&err) => Ok(SignupOutcome::Conflict),
        Err(err) => Err(err).context("failed to insert user"),
    }
}

/// Look up an account and its stored password hash by email.
pub(super) async fn lookup_user_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<(UserRecord, Option<String>)>> {
    let query = format!("SELECT {USER_COLUMNS}, password_hash FROM users WHERE email = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by email")?;

    Ok(row.map(|row| {
        let password_hash: Option<String> = row.get("password_hash");
        (user_from_row(&row), password_hash)
    }))
}

pub(super) async fn lookup_user_by_wallet(
    pool: &PgPool,
    wallet_address: &str,
) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE wallet_address = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(wallet_address)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by wallet")?;

    Ok(row.map(|row| user_from_row(&row)))
}

pub(crate) async fn fetch_user(pool: &PgPool, user_id: Uuid) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch user")?;

    Ok(row.map(|row| user_from_row(&row)))
}

/// Create a wallet account with a username derived from the address prefix.
///
/// Username collisions retry with a random suffix; a concurrent create for
/// the same wallet resolves to the winner's row instead of erroring.
pub(super) async fn insert_wallet_user(
    pool: &PgPool,
    wallet_address: &str,
    role: Role,
) -> Result<UserRecord> {
    let query = format!(
        "INSERT INTO users (username, wallet_address, role) VALUES ($1, $2, $3) \
         RETURNING {USER_COLUMNS}"
    );

    let prefix = &wallet_address[..USERNAME_PREFIX_LENGTH];
    for attempt in 0..3 {
        let username = if attempt == 0 {
            prefix.to_string()
        } else {
            let mut bytes = [0u8; 2];
            OsRng
                .try_fill_bytes(&mut bytes)
                .context("failed to generate username suffix")?;
            format!("{prefix}-{}", hex::encode(bytes))
        };

        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(&username)
            .bind(wallet_address)
            .bind(role)
            .fetch_one(pool)
            .instrument(span)
            .await;

        match row {
            Ok(row) => return Ok(user_from_row(&row)),
            Err(err) if is_unique_violation(&err) => {
                // Either the username or the wallet itself collided; if the
                // wallet row exists now, a concurrent verify won the race.
                if let Some(existing) = lookup_user_by_wallet(pool, wallet_address).await? {
                    return Ok(existing);
                }
            }
            Err(err) => return Err(err).context("failed to insert wallet user"),
        }
    }

    Err(anyhow::anyhow!(
        "failed to derive a unique username for wallet account"
    ))
}

/// Re-apply the resolved role when the configured operator wallet changed.
pub(super) async fn update_role(pool: &PgPool, user_id: Uuid, role: Role) -> Result<()> {
    let query = "UPDATE users SET role = $2, updated_at = NOW() WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(role)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update role")?;
    Ok(())
}

pub(super) async fn insert_challenge(
    pool: &PgPool,
    wallet_address: &str,
    challenge: &str,
    ttl_seconds: i64,
) -> Result<()> {
    let query = r"
        INSERT INTO wallet_challenges (wallet_address, challenge, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(wallet_address)
        .bind(challenge)
        .bind(ttl_seconds)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert wallet challenge")?;
    Ok(())
}

/// Atomically consume a wallet challenge.
///
/// Existence, the used flag, and expiry are all evaluated inside the single
/// conditional update, closing the window where one signature could be
/// redeemed twice by concurrent requests.
pub(super) async fn consume_challenge(
    pool: &PgPool,
    wallet_address: &str,
    challenge: &str,
) -> Result<bool> {
    let query = r"
        UPDATE wallet_challenges
        SET used_at = NOW()
        WHERE wallet_address = $1
          AND challenge = $2
          AND used_at IS NULL
          AND expires_at > NOW()
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(wallet_address)
        .bind(challenge)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to consume wallet challenge")?;

    Ok(row.is_some())
}

pub(super) async fn insert_session(
    pool: &PgPool,
    user_id: Uuid,
    token_hash: &[u8],
    ttl_seconds: i64,
) -> Result<()> {
    let query = r"
        INSERT INTO user_sessions (user_id, token_hash, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .bind(token_hash)
        .bind(ttl_seconds)
        .execute(pool)
        .instrument(span)
        .await;

    match result {
        Ok(_) => Ok(()),
        // The same token reissued within one second hashes to the same row;
        // that session already authorizes this exact token.
        Err(err) if is_unique_violation(&err) => Ok(()),
        Err(err) => Err(err).context("failed to insert session"),
    }
}

/// Resolve a token hash to its session and owning account.
///
/// Expired sessions are filtered in SQL and indistinguishable from missing
/// ones. Banned accounts still resolve; the gate maps them to a distinct
/// rejection.
pub(crate) async fn lookup_session(
    pool: &PgPool,
    token_hash: &[u8],
) -> Result<Option<SessionRecord>> {
    let query = r"
        SELECT users.id, users.username, users.wallet_address, users.email, users.role,
               users.bio, users.avatar_url, users.is_public,
               users.banned_at IS NOT NULL AS banned,
               CAST(EXTRACT(EPOCH FROM users.created_at) AS BIGINT) AS created_at_unix
        FROM user_sessions
        JOIN users ON users.id = user_sessions.user_id
        WHERE user_sessions.token_hash = $1
          AND user_sessions.expires_at > NOW()
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session")?;

    let Some(row) = row else {
        return Ok(None);
    };

    // Record activity for audit/visibility without extending the session TTL.
    let query = "UPDATE user_sessions SET last_seen_at = NOW() WHERE token_hash = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update session last_seen_at")?;

    Ok(Some(SessionRecord {
        user: user_from_row(&row),
    }))
}

pub(super) async fn delete_session(pool: &PgPool, token_hash: &[u8]) -> Result<()> {
    // Logout is idempotent; it's fine if no rows are deleted.
    let query = "DELETE FROM user_sessions WHERE token_hash = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete session")?;
    Ok(())
}

pub(crate) async fn lookup_password_hash(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<Option<String>> {
    let query = "SELECT password_hash FROM users WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup password hash")?;

    Ok(row.and_then(|row| row.get::<Option<String>, _>("password_hash")))
}

/// Rotate the password and revoke every other session of the identity.
///
/// The session presenting `keep_hash` survives so the caller stays signed in;
/// any stolen token dies here.
pub(crate) async fn update_password(
    pool: &PgPool,
    user_id: Uuid,
    new_password_hash: &str,
    keep_hash: &[u8],
) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .context("begin password change transaction")?;

    let query = "UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(new_password_hash)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to update password hash")?;

    let query = "DELETE FROM user_sessions WHERE user_id = $1 AND token_hash <> $2";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(keep_hash)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to revoke other sessions")?;

    tx.commit()
        .await
        .context("commit password change transaction")?;
    Ok(())
}

/// Look up an account by email and, when it exists, persist a reset token
/// plus its outbox notification in one transaction.
///
/// Both branches run the same transaction round-trip so response latency
/// stays statically similar whether or not the account exists.
pub(super) async fn enqueue_password_reset(
    pool: &PgPool,
    email: &str,
    config: &AuthConfig,
) -> Result<ResetRequestOutcome> {
    let mut tx = pool.begin().await.context("begin reset transaction")?;

    let query = "SELECT id, username, email FROM users WHERE email = $1 LIMIT 1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to lookup user for reset")?;

    let Some(row) = row else {
        tx.commit().await.context("commit reset noop")?;
        return Ok(ResetRequestOutcome::Noop);
    };

    let user_id: Uuid = row.get("id");
    let username: String = row.get("username");
    let to_email: String = row.get("email");

    // The raw token only travels in the notification; the database stores a hash.
    let token = generate_reset_token()?;
    let token_hash = hash_reset_token(&token);

    let query = r"
        INSERT INTO password_reset_tokens (user_id, token_hash, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(&token_hash)
        .bind(config.reset_token_ttl_seconds())
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert reset token")?;

    let reset_url = build_reset_url(config.frontend_base_url(), &token);
    let payload_json = json!({
        "username": username,
        "reset_url": reset_url,
    });
    let payload_text =
        serde_json::to_string(&payload_json).context("failed to serialize reset payload")?;

    let query = r"
        INSERT INTO notification_outbox (to_email, template, payload_json)
        VALUES ($1, $2, $3::jsonb)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(&to_email)
        .bind("password_reset")
        .bind(payload_text)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert outbox row")?;

    tx.commit().await.context("commit reset enqueue")?;
    Ok(ResetRequestOutcome::Queued)
}

/// Redeem a reset token: consume it, rotate the password, revoke every
/// session of the identity, all in one transaction. A crash cannot leave
/// the token consumed without the password changed, nor old sessions alive
/// after the change is visible.
pub(super) async fn redeem_password_reset(
    pool: &PgPool,
    token_hash: &[u8],
    new_password_hash: &str,
) -> Result<bool> {
    let mut tx = pool.begin().await.context("begin redeem transaction")?;

    let query = r"
        UPDATE password_reset_tokens
        SET consumed_at = NOW()
        WHERE token_hash = $1
          AND consumed_at IS NULL
          AND expires_at > NOW()
        RETURNING user_id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to consume reset token")?;

    let Some(row) = row else {
        let _ = tx.rollback().await;
        return Ok(false);
    };

    let user_id: Uuid = row.get("user_id");
    let query = "UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(new_password_hash)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to rotate password")?;

    let query = "DELETE FROM user_sessions WHERE user_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to revoke sessions")?;

    tx.commit().await.context("commit redeem transaction")?;
    Ok(true)
}

/// Apply allow-listed profile updates and return the refreshed account.
pub(crate) async fn update_profile(
    pool: &PgPool,
    user_id: Uuid,
    username: Option<String>,
    bio: Option<String>,
    avatar_url: Option<String>,
    is_public: Option<bool>,
) -> Result<ProfileOutcome> {
    let query = format!(
        "UPDATE users SET \
             username = COALESCE($2, username), \
             bio = COALESCE($3, bio), \
             avatar_url = COALESCE($4, avatar_url), \
             is_public = COALESCE($5, is_public), \
             updated_at = NOW() \
         WHERE id = $1 RETURNING {USER_COLUMNS}"
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .bind(username)
        .bind(bio)
        .bind(avatar_url)
        .bind(is_public)
        .fetch_optional(pool)
        .instrument(span)
        .await;

    match row {
        Ok(Some(row)) => Ok(ProfileOutcome::Updated(user_from_row(&row))),
        Ok(None) => Ok(ProfileOutcome::Missing),
        Err(err) if is_unique_violation(&err) => Ok(ProfileOutcome::Conflict),
        Err(err) => Err(err).context("failed to update profile"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signup_outcome_debug_names() {
        assert!(format!("{:?}", SignupOutcome::Conflict).contains("Conflict"));
    }

    #[test]
    fn reset_outcome_debug_names() {
        assert!(format!("{:?}", ResetRequestOutcome::Queued).contains("Queued"));
        assert!(format!("{:?}", ResetRequestOutcome::Noop).contains("Noop"));
    }

    #[test]
    fn user_columns_cover_the_record() {
        for column in [
            "username",
            "wallet_address",
            "email",
            "role",
            "bio",
            "avatar_url",
            "is_public",
            "banned",
            "created_at_unix",
        ] {
            assert!(USER_COLUMNS.contains(column), "missing column {column}");
        }
    }
}
