//! Password reset request and redemption.
//!
//! The request endpoint answers identically whether or not the email is
//! registered, and redemption answers identically for absent, expired, and
//! already-used tokens. Neither endpoint is an oracle for account existence
//! or token state.

use axum::{
    extract::Extension, http::StatusCode, response::IntoResponse, Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::password;
use super::state::AuthState;
use super::storage::{enqueue_password_reset, redeem_password_reset, ResetRequestOutcome};
use super::types::{MessageResponse, RequestResetRequest, ResetPasswordRequest};
use super::utils::{hash_reset_token, normalize_email, valid_email};

const RESET_REQUESTED: &str =
    "If an account exists for that address, a reset link has been sent";
const INVALID_RESET_TOKEN: &str = "Invalid or expired token";

#[utoipa::path(
    post,
    path = "/auth/request-reset",
    request_body = RequestResetRequest,
    responses(
        (status = 200, description = "Uniform acknowledgement", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn request_reset(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RequestResetRequest>>,
) -> impl IntoResponse {
    let acknowledged = (
        StatusCode::OK,
        Json(MessageResponse {
            message: RESET_REQUESTED.to_string(),
        }),
    );

    let Some(Json(request)) = payload else {
        return acknowledged;
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        // A malformed address is as unregistered as any other; same answer.
        return acknowledged;
    }

    match enqueue_password_reset(&pool, &email, auth_state.config()).await {
        Ok(ResetRequestOutcome::Queued | ResetRequestOutcome::Noop) => {}
        Err(err) => {
            // Dispatch problems are an operator concern, not the caller's.
            error!("Failed to enqueue password reset: {err}");
        }
    }

    acknowledged
}

#[utoipa::path(
    post,
    path = "/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 204, description = "Password rotated, sessions revoked"),
        (status = 400, description = "Validation error or invalid/expired token", body = String)
    ),
    tag = "auth"
)]
pub async fn reset_password(
    pool: Extension<PgPool>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> impl IntoResponse {
    let request: ResetPasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let token = request.token.trim();
    if token.is_empty() {
        return (StatusCode::BAD_REQUEST, INVALID_RESET_TOKEN.to_string()).into_response();
    }

    if !password::acceptable(&request.password) {
        return (
            StatusCode::BAD_REQUEST,
            "Password must be at least 8 characters with lowercase, uppercase, and a digit"
                .to_string(),
        )
            .into_response();
    }

    let new_hash = match password::hash(&request.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let token_hash = hash_reset_token(token);
    match redeem_password_reset(&pool, &token_hash, &new_hash).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => (StatusCode::BAD_REQUEST, INVALID_RESET_TOKEN.to_string()).into_response(),
        Err(err) => {
            error!("Failed to redeem password reset: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
