//! Signed bearer token issuance and verification.
//!
//! Tokens are compact HS256 JWTs carrying the identity claims below. The
//! codec is stateless; revocation is handled by the session ledger, not here.
//! A token that fails any check (signature, structure, expiry) verifies as
//! invalid with no partial trust.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::role::Role;
use super::utils::unix_now;

/// Identity claims carried by every issued token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Owning user id.
    pub sub: Uuid,
    /// Wallet address, when the account has one.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub wallet: Option<String>,
    /// Email, when the account has one.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub email: Option<String>,
    /// Privilege tier resolved at issuance and re-validated at the gate.
    pub role: Role,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expires-at, unix seconds.
    pub exp: i64,
}

impl Claims {
    #[must_use]
    pub fn new(
        sub: Uuid,
        wallet: Option<String>,
        email: Option<String>,
        role: Role,
        ttl_seconds: i64,
    ) -> Self {
        let now = unix_now();
        Self {
            sub,
            wallet,
            email,
            role,
            iat: now,
            exp: now + ttl_seconds,
        }
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token")]
    Invalid,
}

/// HS256 codec over a deployment-wide shared secret.
///
/// The secret comes from explicit configuration; startup fails without it.
/// If the deployment ever migrates to asymmetric signing only the key
/// material handled here changes, `issue`/`verify` stay the same.
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    #[must_use]
    pub fn new(secret: &SecretString) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is exact; tokens do not outlive their exp claim.
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret.expose_secret().as_bytes()),
            decoding: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation,
        }
    }

    /// Issue a signed token for the given claims.
    ///
    /// # Errors
    /// Returns an error if the claims cannot be serialized or signed.
    pub fn issue(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::default(), claims, &self.encoding).map_err(|_| TokenError::Invalid)
    }

    /// Verify a token and return its claims.
    ///
    /// # Errors
    /// Returns [`TokenError::Expired`] for a well-formed token past its
    /// expiry and [`TokenError::Invalid`] for anything else: bad signature,
    /// wrong segment count, or an unparseable claims body.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new(&SecretString::from(
            "0123456789abcdef0123456789abcdef".to_string(),
        ))
    }

    fn claims() -> Claims {
        Claims::new(
            Uuid::new_v4(),
            Some("d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a".to_string()),
            None,
            Role::User,
            3600,
        )
    }

    #[test]
    fn round_trip_preserves_claims() {
        let codec = codec();
        let claims = claims();
        let token = codec.issue(&claims).expect("issue");
        let verified = codec.verify(&token).expect("verify");
        assert_eq!(verified, claims);
    }

    #[test]
    fn email_only_claims_round_trip() {
        let codec = codec();
        let claims = Claims::new(
            Uuid::new_v4(),
            None,
            Some("a@x.com".to_string()),
            Role::User,
            3600,
        );
        let token = codec.issue(&claims).expect("issue");
        let verified = codec.verify(&token).expect("verify");
        assert_eq!(verified.email.as_deref(), Some("a@x.com"));
        assert_eq!(verified.wallet, None);
    }

    #[test]
    fn expired_token_rejected() {
        let codec = codec();
        let mut claims = claims();
        claims.iat -= 7200;
        claims.exp = claims.iat + 3600;
        let token = codec.issue(&claims).expect("issue");
        assert!(matches!(codec.verify(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn tampered_signature_rejected() {
        let codec = codec();
        let token = codec.issue(&claims()).expect("issue");
        let signature_start = token.rfind('.').expect("three segments") + 1;

        // Flip every character of the signature segment in turn.
        for index in signature_start..token.len() {
            let mut tampered: Vec<u8> = token.clone().into_bytes();
            tampered[index] = if tampered[index] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(tampered).expect("ascii");
            if tampered == token {
                continue;
            }
            assert!(codec.verify(&tampered).is_err(), "index {index} accepted");
        }
    }

    #[test]
    fn wrong_segment_count_rejected() {
        let codec = codec();
        assert!(codec.verify("not-a-token").is_err());
        assert!(codec.verify("a.b").is_err());
        assert!(codec.verify("a.b.c.d").is_err());
        assert!(codec.verify("").is_err());
    }

    #[test]
    fn wrong_secret_rejected() {
        let token = codec().issue(&claims()).expect("issue");
        let other = TokenCodec::new(&SecretString::from(
            "ffffffffffffffffffffffffffffffff".to_string(),
        ));
        assert!(matches!(other.verify(&token), Err(TokenError::Invalid)));
    }
}
