use crate::gateway::config::{AuthStyle, OAuthConfig};
use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use url::Url;

pub const ARG_CLIENT_ID: &str = "client-id";
pub const ARG_CLIENT_SECRET: &str = "client-secret";
pub const ARG_REDIRECT_URL: &str = "redirect-url";
pub const ARG_SCOPES: &str = "scopes";
pub const ARG_AUTHORIZE_URL: &str = "authorize-url";
pub const ARG_TOKEN_URL: &str = "token-url";
pub const ARG_TOKEN_AUTH_STYLE: &str = "token-auth-style";

pub const DEFAULT_SCOPES: [&str; 4] = ["openid", "profile", "email", "offline_access"];

/// Parse the OAuth2 client arguments.
///
/// # Errors
/// Returns an error if a required argument is missing, a URL does not
/// parse, or no scope is left after trimming.
pub fn parse(matches: &ArgMatches) -> Result<OAuthConfig> {
    let read_required = |id: &str| -> Result<String> {
        matches
            .get_one::<String>(id)
            .cloned()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow!("missing required argument: --{id}"))
    };
    let read_url = |id: &str| -> Result<Url> {
        let raw = read_required(id)?;
        Url::parse(&raw).with_context(|| format!("invalid --{id}: {raw}"))
    };

    let scopes: Vec<String> = matches
        .get_many::<String>(ARG_SCOPES)
        .map(|values| {
            values
                .map(|scope| scope.trim().to_string())
                .filter(|scope| !scope.is_empty())
                .collect()
        })
        .unwrap_or_default();
    if scopes.is_empty() {
        return Err(anyhow!("at least one scope is required: --{ARG_SCOPES}"));
    }

    Ok(OAuthConfig {
        client_id: read_required(ARG_CLIENT_ID)?,
        client_secret: SecretString::from(read_required(ARG_CLIENT_SECRET)?),
        redirect_url: read_url(ARG_REDIRECT_URL)?,
        scopes,
        authorize_url: read_url(ARG_AUTHORIZE_URL)?,
        token_url: read_url(ARG_TOKEN_URL)?,
        auth_style: matches
            .get_one::<AuthStyle>(ARG_TOKEN_AUTH_STYLE)
            .copied()
            .unwrap_or_default(),
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_CLIENT_ID)
                .long(ARG_CLIENT_ID)
                .help("OAuth2 client id")
                .env("GANGWAY_CLIENT_ID")
                .required(true),
        )
        .arg(
            Arg::new(ARG_CLIENT_SECRET)
                .long(ARG_CLIENT_SECRET)
                .help("OAuth2 client secret")
                .env("GANGWAY_CLIENT_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_REDIRECT_URL)
                .long(ARG_REDIRECT_URL)
                .help("Callback URL registered with the identity provider, example: https://gangway.tld/callback")
                .env("GANGWAY_REDIRECT_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_SCOPES)
                .long(ARG_SCOPES)
                .help("Comma separated OAuth2 scopes")
                .env("GANGWAY_SCOPES")
                .value_delimiter(',')
                .default_values(DEFAULT_SCOPES),
        )
        .arg(
            Arg::new(ARG_AUTHORIZE_URL)
                .long(ARG_AUTHORIZE_URL)
                .help("Identity provider authorization endpoint")
                .env("GANGWAY_AUTHORIZE_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_URL)
                .long(ARG_TOKEN_URL)
                .help("Identity provider token endpoint")
                .env("GANGWAY_TOKEN_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_AUTH_STYLE)
                .long(ARG_TOKEN_AUTH_STYLE)
                .help("Client authentication at the token endpoint: header (HTTP Basic) or params (form body)")
                .env("GANGWAY_TOKEN_AUTH_STYLE")
                .default_value("header")
                .value_parser(|value: &str| value.parse::<AuthStyle>()),
        )
}
