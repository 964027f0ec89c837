//! Email/password account registration.

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
use super::storage::{insert_email_user, SignupOutcome};
use super::types::{AuthResponse, RegisterRequest};
use super::utils::{normalize_email, normalize_username, valid_email, valid_username};

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, session started", body = AuthResponse),
        (status = 400, description = "Validation error or duplicate email/username", body = String)
    ),
    tag = "auth"
)]
pub async fn register(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let request: RegisterRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response();
    }

    let username = normalize_username(&request.username);
    if !valid_username(&username) {
        return (StatusCode::BAD_REQUEST, "Invalid username".to_string()).into_response();
    }

    if !password::acceptable(&request.password) {
        return (
            StatusCode::BAD_REQUEST,
            "Password must be at least 8 characters with lowercase, uppercase, and a digit"
                .to_string(),
        )
            .into_response();
    }

    let password_hash = match password::hash(&request.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let user = match insert_email_user(&pool, &username, &email, &password_hash).await {
        Ok(SignupOutcome::Created(user)) => user,
        Ok(SignupOutcome::Conflict) => {
            return (
                StatusCode::BAD_REQUEST,
                "Email or username already registered".to_string(),
            )
                .into_response()
        }
        Err(err) => {
            error!("Failed to create account: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

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
        StatusCode::CREATED,
        response_headers,
        Json(AuthResponse {
            user: user.into(),
            token,
        }),
    )
        .into_response()
}
