//! Password hashing, verification, and the acceptance policy.

use anyhow::{anyhow, Context, Result};
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::{rngs::OsRng, RngCore};

/// Hash a password with a fresh random salt.
///
/// Default Argon2 parameters are tuned for interactive login latency.
///
/// # Errors
/// Returns an error if salt generation or hashing fails.
pub fn hash(password: &str) -> Result<String> {
    let mut bytes = [0u8; 16];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate password salt")?;
    let salt =
        SaltString::encode_b64(&bytes).map_err(|err| anyhow!("failed to encode salt: {err}"))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| anyhow!("failed to hash password: {err}"))
}

/// Verify a password against a stored hash.
///
/// An unparseable stored hash verifies as false rather than erroring; the
/// caller treats it like any wrong password.
#[must_use]
pub fn verify(password: &str, password_hash: &str) -> bool {
    PasswordHash::new(password_hash)
        .ok()
        .as_ref()
        .map(|hash| {
            Argon2::default()
                .verify_password(password.as_bytes(), hash)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Acceptance policy applied before hashing: minimum length 8, at least one
/// lowercase, one uppercase, one digit.
#[must_use]
pub fn acceptable(password: &str) -> bool {
    password.len() >= 8
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verify_round_trip() {
        let hashed = hash("Abcdef12").expect("hash");
        assert!(verify("Abcdef12", &hashed));
        assert!(!verify("Abcdef13", &hashed));
    }

    #[test]
    fn hashes_are_salted() {
        let first = hash("Abcdef12").expect("hash");
        let second = hash("Abcdef12").expect("hash");
        assert_ne!(first, second);
    }

    #[test]
    fn garbage_stored_hash_verifies_false() {
        assert!(!verify("Abcdef12", "not-a-phc-string"));
    }

    #[test]
    fn policy_accepts_mixed_case_with_digit() {
        assert!(acceptable("Abcdef12"));
        assert!(acceptable("Sup3rSecret"));
    }

    #[test]
    fn policy_rejects_weak_passwords() {
        assert!(!acceptable("Abcde12")); // too short
        assert!(!acceptable("abcdef12")); // no uppercase
        assert!(!acceptable("ABCDEF12")); // no lowercase
        assert!(!acceptable("Abcdefgh")); // no digit
    }
}
