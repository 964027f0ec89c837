//! Small helpers for auth validation, nonces, and token hashing.

use anyhow::{Context, Result};
use base64::Engine;
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use sha2::{Digest, Sha256};

const USERNAME_MIN_LENGTH: usize = 3;
const USERNAME_MAX_LENGTH: usize = 32;

/// Unix seconds, saturating instead of panicking on clock weirdness.
#[must_use]
pub(crate) fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|duration| i64::try_from(duration.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

pub(crate) fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

pub(crate) fn valid_username(username_normalized: &str) -> bool {
    let length = username_normalized.len();
    if !(USERNAME_MIN_LENGTH..=USERNAME_MAX_LENGTH).contains(&length) {
        return false;
    }
    Regex::new(r"^[a-z0-9][a-z0-9_-]*$").is_ok_and(|regex| regex.is_match(username_normalized))
}

/// Wallet addresses are the lowercase hex encoding of a 32-byte public key.
pub(crate) fn normalize_wallet(wallet: &str) -> String {
    wallet.trim().to_lowercase()
}

pub(crate) fn valid_wallet_address(wallet_normalized: &str) -> bool {
    wallet_normalized.len() == 64
        && wallet_normalized
            .bytes()
            .all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}

/// Random nonce embedded in a wallet challenge message.
///
/// # Errors
/// Returns an error if the system RNG fails.
pub(crate) fn generate_challenge_nonce() -> Result<String> {
    let mut bytes = [0u8; 16];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate challenge nonce")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Create a new password reset token for email links.
///
/// The raw value is only sent to the user; the database stores a hash.
///
/// # Errors
/// Returns an error if the system RNG fails.
pub(crate) fn generate_reset_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate reset token")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Hash a session token so raw values never touch the database.
/// The hash is used for lookups when the token is presented.
pub(crate) fn hash_session_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Hash a password reset token before storing or looking it up.
pub(crate) fn hash_reset_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Build the frontend link included in reset notifications.
pub(crate) fn build_reset_url(frontend_base_url: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/reset-password#token={token}")
}

/// Decode a fixed-length lowercase/uppercase hex field from a request body.
pub(crate) fn decode_hex_field(value: &str, expected_bytes: usize) -> Result<Vec<u8>, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("Missing hex payload".to_string());
    }
    let bytes = hex::decode(trimmed).map_err(|_| "Invalid hex payload".to_string())?;
    if bytes.len() != expected_bytes {
        return Err("Invalid hex payload length".to_string());
    }
    Ok(bytes)
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn valid_username_bounds_and_charset() {
        assert!(valid_username("alice"));
        assert!(valid_username("a1_b-c"));
        assert!(!valid_username("ab"));
        assert!(!valid_username("-leading"));
        assert!(!valid_username("UPPER"));
        assert!(!valid_username(&"a".repeat(33)));
    }

    #[test]
    fn valid_wallet_address_is_64_lower_hex() {
        let wallet = "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a";
        assert!(valid_wallet_address(wallet));
        assert!(!valid_wallet_address(&wallet.to_uppercase()));
        assert!(!valid_wallet_address(&wallet[..63]));
        assert!(!valid_wallet_address("zz5a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a"));
    }

    #[test]
    fn challenge_nonces_are_unique() {
        let first = generate_challenge_nonce().expect("nonce");
        let second = generate_challenge_nonce().expect("nonce");
        assert_ne!(first, second);
    }

    #[test]
    fn generate_reset_token_round_trip() {
        let decoded_len = generate_reset_token()
            .ok()
            .and_then(|token| URL_SAFE_NO_PAD.decode(token.as_bytes()).ok())
            .map(|bytes| bytes.len());
        assert_eq!(decoded_len, Some(32));
    }

    #[test]
    fn hash_session_token_stable() {
        let first = hash_session_token("token");
        let second = hash_session_token("token");
        let different = hash_session_token("other");
        assert_eq!(first, second);
        assert_ne!(first, different);
    }

    #[test]
    fn build_reset_url_trims_trailing_slash() {
        let url = build_reset_url("https://gardi.dev/", "token");
        assert_eq!(url, "https://gardi.dev/reset-password#token=token");
    }

    #[test]
    fn decode_hex_field_enforces_length() {
        assert!(decode_hex_field("", 32).is_err());
        assert!(decode_hex_field("zz", 1).is_err());
        assert!(decode_hex_field("abcd", 1).is_err());
        assert_eq!(decode_hex_field("abcd", 2), Ok(vec![0xab, 0xcd]));
    }
}
