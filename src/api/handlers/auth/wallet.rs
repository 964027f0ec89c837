//! Wallet challenge-response login.
//!
//! The server issues a single-use message; the wallet signs it off-band with
//! its Ed25519 key; verification proves possession without the key ever
//! leaving the client. Consuming the challenge is one conditional update, so
//! a signature can be redeemed at most once even under concurrent requests.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use ed25519_dalek::{Signature, VerifyingKey};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::role::determine_role;
use super::session::{session_cookie, start_session};
use super::state::AuthState;
use super::storage::{
    consume_challenge, insert_challenge, insert_wallet_user, lookup_user_by_wallet, update_role,
};
use super::types::{
    AuthResponse, WalletChallengeRequest, WalletChallengeResponse, WalletVerifyRequest,
};
use super::utils::{
    decode_hex_field, generate_challenge_nonce, normalize_wallet, unix_now, valid_wallet_address,
};

const INVALID_CHALLENGE: &str = "Invalid or expired challenge";

fn challenge_message(nonce: &str, issued_at: i64) -> String {
    format!("Sign in to Gardi\nnonce: {nonce}\nissued-at: {issued_at}")
}

/// Verify an Ed25519 signature over the UTF-8 bytes of the challenge text.
fn verify_challenge_signature(challenge: &str, signature: &[u8], public_key: &[u8]) -> bool {
    let Ok(key_bytes) = <[u8; 32]>::try_from(public_key) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    verifying_key
        .verify_strict(challenge.as_bytes(), &signature)
        .is_ok()
}

#[utoipa::path(
    post,
    path = "/auth/wallet/challenge",
    request_body = WalletChallengeRequest,
    responses(
        (status = 200, description = "Challenge issued", body = WalletChallengeResponse),
        (status = 400, description = "Validation error", body = String)
    ),
    tag = "auth"
)]
pub async fn wallet_challenge(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<WalletChallengeRequest>>,
) -> impl IntoResponse {
    let request: WalletChallengeRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let wallet = normalize_wallet(&request.wallet_address);
    if !valid_wallet_address(&wallet) {
        return (StatusCode::BAD_REQUEST, "Invalid wallet address".to_string()).into_response();
    }

    let nonce = match generate_challenge_nonce() {
        Ok(nonce) => nonce,
        Err(err) => {
            error!("Failed to generate challenge nonce: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let challenge = challenge_message(&nonce, unix_now());

    let ttl = auth_state.config().challenge_ttl_seconds();
    if let Err(err) = insert_challenge(&pool, &wallet, &challenge, ttl).await {
        error!("Failed to persist challenge: {err}");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        Json(WalletChallengeResponse {
            challenge,
            expires_in: ttl,
        }),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path = "/auth/wallet/verify",
    request_body = WalletVerifyRequest,
    responses(
        (status = 200, description = "Signature accepted, session started", body = AuthResponse),
        (status = 400, description = "Validation error", body = String),
        (status = 401, description = "Invalid or expired challenge", body = String),
        (status = 403, description = "Account is banned", body = String)
    ),
    tag = "auth"
)]
pub async fn wallet_verify(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<WalletVerifyRequest>>,
) -> impl IntoResponse {
    let request: WalletVerifyRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let wallet = normalize_wallet(&request.wallet_address);
    if !valid_wallet_address(&wallet) {
        return (StatusCode::BAD_REQUEST, "Invalid wallet address".to_string()).into_response();
    }

    let signature = match decode_hex_field(&request.signature, 64) {
        Ok(bytes) => bytes,
        Err(err) => return (StatusCode::BAD_REQUEST, err).into_response(),
    };
    let public_key = match decode_hex_field(&request.public_key, 32) {
        Ok(bytes) => bytes,
        Err(err) => return (StatusCode::BAD_REQUEST, err).into_response(),
    };

    // The address is the hex encoding of the public key; a signature from an
    // unrelated key must not authenticate someone else's wallet.
    let Ok(address_bytes) = hex::decode(&wallet) else {
        return (StatusCode::BAD_REQUEST, "Invalid wallet address".to_string()).into_response();
    };
    if address_bytes != public_key {
        return (StatusCode::UNAUTHORIZED, INVALID_CHALLENGE.to_string()).into_response();
    }

    if !verify_challenge_signature(&request.challenge, &signature, &public_key) {
        return (StatusCode::UNAUTHORIZED, INVALID_CHALLENGE.to_string()).into_response();
    }

    // Only a proven signature spends the challenge; the conditional update
    // rejects replays, expiry, and concurrent double-redeems in one step.
    match consume_challenge(&pool, &wallet, &request.challenge).await {
        Ok(true) => {}
        Ok(false) => {
            return (StatusCode::UNAUTHORIZED, INVALID_CHALLENGE.to_string()).into_response()
        }
        Err(err) => {
            error!("Failed to consume challenge: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    let resolved_role = determine_role(auth_state.config().operator_wallet(), &wallet);

    let user = match lookup_user_by_wallet(&pool, &wallet).await {
        Ok(Some(mut user)) => {
            if user.banned {
                return (StatusCode::FORBIDDEN, "Account is banned".to_string()).into_response();
            }
            // Re-resolve the tier on every wallet login so a newly configured
            // operator wallet elevates without an identity migration.
            if user.role != resolved_role {
                if let Err(err) = update_role(&pool, user.id, resolved_role).await {
                    error!("Failed to update role: {err}");
                    return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                }
                user.role = resolved_role;
            }
            user
        }
        Ok(None) => {
            match insert_wallet_user(&pool, &wallet, resolved_role).await {
                Ok(user) => user,
                Err(err) => {
                    error!("Failed to create wallet account: {err}");
                    return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                }
            }
        }
        Err(err) => {
            error!("Failed to lookup wallet account: {err}");
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
        StatusCode::OK,
        response_headers,
        Json(AuthResponse {
            user: user.into(),
            token,
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn keypair() -> (SigningKey, String) {
        let signing_key = SigningKey::from_bytes(&[7u8; 32]);
        let wallet = hex::encode(signing_key.verifying_key().to_bytes());
        (signing_key, wallet)
    }

    #[test]
    fn challenge_messages_are_unique_per_call() {
        let first = challenge_message(
            &generate_challenge_nonce().expect("nonce"),
            1_700_000_000,
        );
        let second = challenge_message(
            &generate_challenge_nonce().expect("nonce"),
            1_700_000_000,
        );
        assert_ne!(first, second);
        assert!(first.contains("nonce: "));
        assert!(first.contains("issued-at: 1700000000"));
    }

    #[test]
    fn valid_signature_verifies() {
        let (signing_key, _) = keypair();
        let challenge = challenge_message("abc123", 1_700_000_000);
        let signature = signing_key.sign(challenge.as_bytes());
        assert!(verify_challenge_signature(
            &challenge,
            &signature.to_bytes(),
            &signing_key.verifying_key().to_bytes(),
        ));
    }

    #[test]
    fn wrong_message_fails_verification() {
        let (signing_key, _) = keypair();
        let challenge = challenge_message("abc123", 1_700_000_000);
        let signature = signing_key.sign(challenge.as_bytes());
        assert!(!verify_challenge_signature(
            "a different message",
            &signature.to_bytes(),
            &signing_key.verifying_key().to_bytes(),
        ));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let (signing_key, _) = keypair();
        let other = SigningKey::from_bytes(&[9u8; 32]);
        let challenge = challenge_message("abc123", 1_700_000_000);
        let signature = signing_key.sign(challenge.as_bytes());
        assert!(!verify_challenge_signature(
            &challenge,
            &signature.to_bytes(),
            &other.verifying_key().to_bytes(),
        ));
    }

    #[test]
    fn tampered_signature_fails_verification() {
        let (signing_key, _) = keypair();
        let challenge = challenge_message("abc123", 1_700_000_000);
        let mut signature = signing_key.sign(challenge.as_bytes()).to_bytes();
        signature[0] ^= 0x01;
        assert!(!verify_challenge_signature(
            &challenge,
            &signature,
            &signing_key.verifying_key().to_bytes(),
        ));
    }

    #[test]
    fn malformed_key_material_fails_closed() {
        let challenge = challenge_message("abc123", 1_700_000_000);
        assert!(!verify_challenge_signature(&challenge, &[0u8; 64], &[0u8; 31]));
        assert!(!verify_challenge_signature(&challenge, &[0u8; 63], &[0u8; 32]));
    }

    #[test]
    fn wallet_matches_its_own_public_key() {
        let (signing_key, wallet) = keypair();
        let decoded = hex::decode(&wallet).expect("hex wallet");
        assert_eq!(decoded, signing_key.verifying_key().to_bytes().to_vec());
    }
}
