//! Auth configuration and shared request state.

use secrecy::SecretString;

use super::token::TokenCodec;

const DEFAULT_SESSION_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_CHALLENGE_TTL_SECONDS: i64 = 5 * 60;
const DEFAULT_RESET_TOKEN_TTL_SECONDS: i64 = 60 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    session_ttl_seconds: i64,
    challenge_ttl_seconds: i64,
    reset_token_ttl_seconds: i64,
    operator_wallet: Option<String>,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            challenge_ttl_seconds: DEFAULT_CHALLENGE_TTL_SECONDS,
            reset_token_ttl_seconds: DEFAULT_RESET_TOKEN_TTL_SECONDS,
            operator_wallet: None,
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_challenge_ttl_seconds(mut self, seconds: i64) -> Self {
        self.challenge_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_reset_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_operator_wallet(mut self, wallet: Option<String>) -> Self {
        self.operator_wallet = wallet.map(|wallet| wallet.trim().to_lowercase());
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(crate) fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    pub(crate) fn challenge_ttl_seconds(&self) -> i64 {
        self.challenge_ttl_seconds
    }

    pub(crate) fn reset_token_ttl_seconds(&self) -> i64 {
        self.reset_token_ttl_seconds
    }

    pub(crate) fn operator_wallet(&self) -> Option<&str> {
        self.operator_wallet.as_deref()
    }

    pub(crate) fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

/// Shared auth state attached to every request as an extension.
pub struct AuthState {
    config: AuthConfig,
    tokens: TokenCodec,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig, token_secret: &SecretString) -> Self {
        let tokens = TokenCodec::new(token_secret);
        Self { config, tokens }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenCodec {
        &self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new("https://gardi.dev".to_string());

        assert_eq!(config.frontend_base_url(), "https://gardi.dev");
        assert_eq!(config.session_ttl_seconds(), DEFAULT_SESSION_TTL_SECONDS);
        assert_eq!(
            config.challenge_ttl_seconds(),
            DEFAULT_CHALLENGE_TTL_SECONDS
        );
        assert_eq!(
            config.reset_token_ttl_seconds(),
            DEFAULT_RESET_TOKEN_TTL_SECONDS
        );
        assert_eq!(config.operator_wallet(), None);
        assert!(config.session_cookie_secure());

        let config = config
            .with_session_ttl_seconds(120)
            .with_challenge_ttl_seconds(30)
            .with_reset_token_ttl_seconds(60)
            .with_operator_wallet(Some(
                "3D4017C3E843895A92B70AA74D1B7EBC9C982CCF2EC4968CC0CD55F12AF4660C".to_string(),
            ));

        assert_eq!(config.session_ttl_seconds(), 120);
        assert_eq!(config.challenge_ttl_seconds(), 30);
        assert_eq!(config.reset_token_ttl_seconds(), 60);
        // Operator wallet is normalized to lowercase at configuration time.
        assert_eq!(
            config.operator_wallet(),
            Some("3d4017c3e843895a92b70aa74d1b7ebc9c982ccf2ec4968cc0cd55f12af4660c")
        );
    }

    #[test]
    fn plain_http_frontend_is_not_secure() {
        let config = AuthConfig::new("http://localhost:3000".to_string());
        assert!(!config.session_cookie_secure());
    }
}
