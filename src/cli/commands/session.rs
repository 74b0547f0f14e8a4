use crate::gateway::{
    config::{SessionConfig, DEFAULT_LOGIN_TTL_SECONDS, DEFAULT_SESSION_TTL_SECONDS},
    session::MIN_SESSION_KEY_LEN,
};
use anyhow::{anyhow, Result};
use clap::{builder::BoolishValueParser, Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;
use std::time::Duration;

pub const ARG_SESSION_KEY: &str = "session-key";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_LOGIN_TTL_SECONDS: &str = "login-ttl-seconds";
pub const ARG_SECURE_COOKIES: &str = "secure-cookies";

/// Parse session arguments. Cookies are always `Secure` when serving TLS.
///
/// # Errors
/// Returns an error if the session key is shorter than [`MIN_SESSION_KEY_LEN`] bytes.
pub fn parse(matches: &ArgMatches, serve_tls: bool) -> Result<SessionConfig> {
    let key = match matches.get_one::<String>(ARG_SESSION_KEY) {
        Some(key) if key.len() < MIN_SESSION_KEY_LEN => {
            return Err(anyhow!(
                "--{ARG_SESSION_KEY} must be at least {MIN_SESSION_KEY_LEN} bytes"
            ));
        }
        Some(key) => Some(SecretString::from(key.clone())),
        None => None,
    };

    let seconds = |id: &str, default: u64| {
        Duration::from_secs(matches.get_one::<u64>(id).copied().unwrap_or(default))
    };

    Ok(SessionConfig {
        key,
        ttl: seconds(ARG_SESSION_TTL_SECONDS, DEFAULT_SESSION_TTL_SECONDS),
        login_ttl: seconds(ARG_LOGIN_TTL_SECONDS, DEFAULT_LOGIN_TTL_SECONDS),
        secure_cookies: serve_tls || matches.get_flag(ARG_SECURE_COOKIES),
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SESSION_KEY)
                .long(ARG_SESSION_KEY)
                .help("Session cookie encryption secret (at least 32 bytes); random per process if unset")
                .env("GANGWAY_SESSION_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Authenticated session cookie TTL in seconds")
                .env("GANGWAY_SESSION_TTL_SECONDS")
                .default_value("43200")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_LOGIN_TTL_SECONDS)
                .long(ARG_LOGIN_TTL_SECONDS)
                .help("Validity window of a login state nonce in seconds")
                .env("GANGWAY_LOGIN_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_SECURE_COOKIES)
                .long(ARG_SECURE_COOKIES)
                .help("Mark cookies Secure even when not serving TLS (behind a TLS proxy)")
                .env("GANGWAY_SECURE_COOKIES")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
}
