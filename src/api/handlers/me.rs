//! Authenticated self-service endpoints.
//!
//! Flow Overview: authenticate through the gate, resolve the current user,
//! then apply allow-listed updates or rotate credentials.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::auth::password;
use super::auth::principal::require_auth;
use super::auth::session::extract_session_token;
use super::auth::state::AuthState;
use super::auth::storage::{
    fetch_user, lookup_password_hash, update_password, update_profile, ProfileOutcome,
};
use super::auth::types::{ChangePasswordRequest, ProfileUpdateRequest, UserResponse};
use super::auth::utils::{hash_session_token, normalize_username, valid_username};

#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current identity", body = UserResponse),
        (status = 401, description = "Missing or invalid session"),
        (status = 403, description = "Account is banned")
    ),
    tag = "me"
)]
pub async fn me(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(rejection) => return rejection.into_response(),
    };

    match fetch_user(&pool, principal.user_id).await {
        Ok(Some(user)) => (StatusCode::OK, Json(UserResponse::from(user))).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to fetch profile: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    patch,
    path = "/auth/profile",
    request_body = ProfileUpdateRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserResponse),
        (status = 400, description = "Invalid update payload or username conflict", body = String),
        (status = 401, description = "Missing or invalid session")
    ),
    tag = "me"
)]
pub async fn profile(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ProfileUpdateRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(rejection) => return rejection.into_response(),
    };

    let request: ProfileUpdateRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let username = match request.username {
        Some(username) => {
            let username = normalize_username(&username);
            if !valid_username(&username) {
                return (StatusCode::BAD_REQUEST, "Invalid username".to_string()).into_response();
            }
            Some(username)
        }
        None => None,
    };

    if username.is_none()
        && request.bio.is_none()
        && request.avatar_url.is_none()
        && request.is_public.is_none()
    {
        return (StatusCode::BAD_REQUEST, "No updates provided".to_string()).into_response();
    }

    match update_profile(
        &pool,
        principal.user_id,
        username,
        request.bio,
        request.avatar_url,
        request.is_public,
    )
    .await
    {
        Ok(ProfileOutcome::Updated(user)) => {
            (StatusCode::OK, Json(UserResponse::from(user))).into_response()
        }
        Ok(ProfileOutcome::Conflict) => {
            (StatusCode::BAD_REQUEST, "Username already taken".to_string()).into_response()
        }
        Ok(ProfileOutcome::Missing) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to update profile: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password rotated; other sessions revoked"),
        (status = 400, description = "Validation error", body = String),
        (status = 401, description = "Missing session or wrong current password", body = String)
    ),
    tag = "me"
)]
pub async fn change_password(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ChangePasswordRequest>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(rejection) => return rejection.into_response(),
    };

    let request: ChangePasswordRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let stored_hash = match lookup_password_hash(&pool, principal.user_id).await {
        Ok(Some(hash)) => hash,
        // Wallet-only accounts have no password to rotate.
        Ok(None) => {
            return (
                StatusCode::BAD_REQUEST,
                "Account has no password credential".to_string(),
            )
                .into_response()
        }
        Err(err) => {
            error!("Failed to lookup password hash: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if !password::verify(&request.current_password, &stored_hash) {
        return (StatusCode::UNAUTHORIZED, "Invalid credentials".to_string()).into_response();
    }

    if !password::acceptable(&request.new_password) {
        return (
            StatusCode::BAD_REQUEST,
            "Password must be at least 8 characters with lowercase, uppercase, and a digit"
                .to_string(),
        )
            .into_response();
    }

    let new_hash = match password::hash(&request.new_password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    // The session making this request survives; every other one is revoked
    // so a stolen token dies with the old password.
    let keep_hash = match extract_session_token(&headers) {
        Some(token) => hash_session_token(&token),
        None => Vec::new(),
    };

    match update_password(&pool, principal.user_id, &new_hash, &keep_hash).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!("Failed to rotate password: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
