//! Command-line argument dispatch and server initialization.

use crate::cli::actions::{server::Args, Action};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    // Tokens must survive restarts; a missing secret is a startup error, not
    // a runtime fallback to a random value.
    let token_secret = matches
        .get_one::<String>("token-secret")
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --token-secret")?;

    let operator_wallet = matches.get_one::<String>("operator-wallet").cloned();

    let frontend_base_url = matches
        .get_one::<String>("frontend-base-url")
        .cloned()
        .unwrap_or_else(|| "http://localhost:3000".to_string());

    Ok(Action::Server(Box::new(Args {
        port,
        dsn,
        token_secret,
        operator_wallet,
        frontend_base_url,
        session_ttl_seconds: matches
            .get_one::<i64>("session-ttl-seconds")
            .copied()
            .unwrap_or(604_800),
        challenge_ttl_seconds: matches
            .get_one::<i64>("challenge-ttl-seconds")
            .copied()
            .unwrap_or(300),
        reset_token_ttl_seconds: matches
            .get_one::<i64>("reset-token-ttl-seconds")
            .copied()
            .unwrap_or(3600),
        outbox_poll_seconds: matches
            .get_one::<u64>("outbox-poll-seconds")
            .copied()
            .unwrap_or(5),
        outbox_batch_size: matches
            .get_one::<usize>("outbox-batch-size")
            .copied()
            .unwrap_or(10),
        outbox_max_attempts: matches
            .get_one::<u32>("outbox-max-attempts")
            .copied()
            .unwrap_or(5),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn server_action_from_args() {
        temp_env::with_vars(
            [
                ("GARDI_DSN", None::<&str>),
                ("GARDI_TOKEN_SECRET", None::<&str>),
                ("GARDI_OPERATOR_WALLET", None::<&str>),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec![
                    "gardi",
                    "--dsn",
                    "postgres://user@localhost:5432/gardi",
                    "--token-secret",
                    "0123456789abcdef0123456789abcdef",
                ]);
                let action = handler(&matches).expect("server action");
                let Action::Server(args) = action;
                assert_eq!(args.port, 8080);
                assert_eq!(args.dsn, "postgres://user@localhost:5432/gardi");
                assert_eq!(
                    args.token_secret.expose_secret(),
                    "0123456789abcdef0123456789abcdef"
                );
                assert_eq!(args.operator_wallet, None);
                assert_eq!(args.frontend_base_url, "http://localhost:3000");
                assert_eq!(args.session_ttl_seconds, 604_800);
                assert_eq!(args.challenge_ttl_seconds, 300);
                assert_eq!(args.reset_token_ttl_seconds, 3600);
            },
        );
    }
}
