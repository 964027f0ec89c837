//! Email/password login.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::password;
use super::session::{session_cookie, start_session};
use super::state::AuthState;
use super::storage::lookup_user_by_email;
use super::types::{AuthResponse, LoginRequest};
use super::utils::normalize_email;

// Unknown email and wrong password are deliberately indistinguishable.
const INVALID_CREDENTIALS: &str = "Invalid credentials";

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session started", body = AuthResponse),
        (status = 400, description = "Validation error", body = String),
        (status = 401, description = "Invalid credentials", body = String),
        (status = 403, description = "Account is banned", body = String)
    ),
    tag = "auth"
)]
pub async fn login(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);

    let (user, password_hash) = match lookup_user_by_email(&pool, &email).await {
        Ok(Some(row)) => row,
        Ok(None) => {
            return (StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS.to_string()).into_response()
        }
        Err(err) => {
            error!("Failed to lookup account: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // Wallet-only accounts have no stored hash and cannot log in here.
    let Some(password_hash) = password_hash else {
        return (StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS.to_string()).into_response();
    };
    if !password::verify(&request.password, &password_hash) {
        return (StatusCode::UNAUTHORIZED, INVALID_CREDENTIALS.to_string()).into_response();
    }

    if user.banned {
        return (StatusCode::FORBIDDEN, "Account is banned".to_string()).into_response();
    }

    let token = match start_session(&pool, &auth_state, &user).await {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to start session: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = session_cookie(auth_state.config(), &token) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (
        StatusCode::OK,
        response_headers,
        Json(AuthResponse {
            user: user.into(),
            token,
        }),
    )
        .into_response()
}
