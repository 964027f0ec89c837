//! Service banner, personalized when a session is present.

use axum::{
    extract::Extension,
    http::HeaderMap,
    response::{IntoResponse, Json},
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;

use super::auth::principal::optional_auth;
use super::auth::state::AuthState;

pub async fn root(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    // Anonymous visitors get the plain banner; a bad token is still rejected.
    let principal = match optional_auth(&headers, &pool, &auth_state).await {
        Ok(principal) => principal,
        Err(rejection) => return rejection.into_response(),
    };

    let body = match principal {
        Some(principal) => json!({
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "username": principal.username,
        }),
        None => json!({
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        }),
    };

    Json(body).into_response()
}
