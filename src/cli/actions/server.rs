use crate::{
    api,
    api::handlers::auth::state::AuthConfig,
    api::outbox::OutboxConfig,
    cli::actions::Action,
};
use anyhow::Result;
use secrecy::SecretString;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub token_secret: SecretString,
    pub operator_wallet: Option<String>,
    pub frontend_base_url: String,
    pub session_ttl_seconds: i64,
    pub challenge_ttl_seconds: i64,
    pub reset_token_ttl_seconds: i64,
    pub outbox_poll_seconds: u64,
    pub outbox_batch_size: usize,
    pub outbox_max_attempts: u32,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the configuration is invalid or the server fails to start.
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server(args) => {
            let auth_config = AuthConfig::new(args.frontend_base_url)
                .with_session_ttl_seconds(args.session_ttl_seconds)
                .with_challenge_ttl_seconds(args.challenge_ttl_seconds)
                .with_reset_token_ttl_seconds(args.reset_token_ttl_seconds)
                .with_operator_wallet(args.operator_wallet);

            let outbox_config = OutboxConfig::new()
                .with_poll_interval_seconds(args.outbox_poll_seconds)
                .with_batch_size(args.outbox_batch_size)
                .with_max_attempts(args.outbox_max_attempts);

            api::new(
                args.port,
                args.dsn,
                args.token_secret,
                auth_config,
                outbox_config,
            )
            .await
        }
    }
}
