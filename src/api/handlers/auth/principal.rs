//! Authenticated principal extraction, the gate every protected route
//! passes through.
//!
//! The chain per request: extract the token (bearer header, then cookie),
//! verify it cryptographically, resolve an unexpired session row, load the
//! owning account, and reject banned accounts. Any failure short-circuits
//! with no partial identity attached.

use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use super::role::Role;
use super::session::extract_session_token;
use super::state::AuthState;
use super::storage::lookup_session;
use super::utils::hash_session_token;

/// Authenticated user context derived from the session token.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user_id: Uuid,
    pub username: String,
    pub wallet_address: Option<String>,
    pub email: Option<String>,
    pub role: Role,
}

/// Terminal rejection states of the gate.
#[derive(Debug)]
pub enum AuthRejection {
    /// No token, invalid token, or no live session behind it. The response
    /// never says which.
    Unauthenticated,
    /// Valid session, banned account. Distinct so clients can render
    /// different messaging.
    Banned,
    /// Store failure while resolving the session.
    Internal,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, "Not authenticated".to_string()).into_response()
            }
            Self::Banned => (StatusCode::FORBIDDEN, "Account is banned".to_string()).into_response(),
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}

/// Resolve the request's credentials into a principal, or reject.
///
/// # Errors
/// Returns [`AuthRejection`] when any step of the chain fails.
pub async fn require_auth(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
) -> Result<Principal, AuthRejection> {
    let Some(token) = extract_session_token(headers) else {
        return Err(AuthRejection::Unauthenticated);
    };
    authenticate_token(&token, pool, state).await
}

/// Gate variant for routes that personalize output but work anonymously.
///
/// A missing token authorizes as anonymous; a present-but-invalid token is
/// still rejected.
///
/// # Errors
/// Returns [`AuthRejection`] when a presented credential fails the chain.
pub async fn optional_auth(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
) -> Result<Option<Principal>, AuthRejection> {
    let Some(token) = extract_session_token(headers) else {
        return Ok(None);
    };
    authenticate_token(&token, pool, state).await.map(Some)
}

async fn authenticate_token(
    token: &str,
    pool: &PgPool,
    state: &AuthState,
) -> Result<Principal, AuthRejection> {
    let Ok(claims) = state.tokens().verify(token) else {
        return Err(AuthRejection::Unauthenticated);
    };

    // A cryptographically valid token is only honored while its session row
    // lives; revocation wins over the token's own expiry.
    let token_hash = hash_session_token(token);
    let record = match lookup_session(pool, &token_hash).await {
        Ok(record) => record,
        Err(err) => {
            error!("Failed to lookup session: {err}");
            return Err(AuthRejection::Internal);
        }
    };
    let Some(record) = record else {
        return Err(AuthRejection::Unauthenticated);
    };

    // The session must belong to the token's subject.
    if record.user.id != claims.sub {
        return Err(AuthRejection::Unauthenticated);
    }

    if record.user.banned {
        return Err(AuthRejection::Banned);
    }

    Ok(Principal {
        user_id: record.user.id,
        username: record.user.username,
        wallet_address: record.user.wallet_address,
        email: record.user.email,
        role: record.user.role,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_statuses() {
        let response = AuthRejection::Unauthenticated.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = AuthRejection::Banned.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = AuthRejection::Internal.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
