use crate::gateway::config::TlsConfig;
use anyhow::{anyhow, Result};
use clap::{builder::BoolishValueParser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;

pub const ARG_SERVE_TLS: &str = "serve-tls";
pub const ARG_CERT_FILE: &str = "cert-file";
pub const ARG_KEY_FILE: &str = "key-file";
pub const ARG_TRUSTED_CA_PATH: &str = "trusted-ca-path";

/// Parse TLS arguments from matches.
///
/// # Errors
/// Returns an error if `--serve-tls` is set without both a certificate and a key.
pub fn parse(matches: &ArgMatches) -> Result<TlsConfig> {
    let read_path = |id: &str| {
        matches
            .get_one::<String>(id)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
    };

    let config = TlsConfig {
        serve_tls: matches.get_flag(ARG_SERVE_TLS),
        cert_file: read_path(ARG_CERT_FILE),
        key_file: read_path(ARG_KEY_FILE),
        trusted_ca_path: read_path(ARG_TRUSTED_CA_PATH),
    };

    if config.serve_tls {
        if config.cert_file.is_none() {
            return Err(anyhow!(
                "missing required argument: --{ARG_CERT_FILE} (required with --{ARG_SERVE_TLS})"
            ));
        }
        if config.key_file.is_none() {
            return Err(anyhow!(
                "missing required argument: --{ARG_KEY_FILE} (required with --{ARG_SERVE_TLS})"
            ));
        }
    }

    Ok(config)
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SERVE_TLS)
                .long(ARG_SERVE_TLS)
                .help("Serve HTTPS using --cert-file and --key-file")
                .env("GANGWAY_SERVE_TLS")
                .action(ArgAction::SetTrue)
                .value_parser(BoolishValueParser::new()),
        )
        .arg(
            Arg::new(ARG_CERT_FILE)
                .long(ARG_CERT_FILE)
                .help("Path to TLS certificate chain (PEM)")
                .env("GANGWAY_CERT_FILE"),
        )
        .arg(
            Arg::new(ARG_KEY_FILE)
                .long(ARG_KEY_FILE)
                .help("Path to TLS private key (PEM)")
                .env("GANGWAY_KEY_FILE"),
        )
        .arg(
            Arg::new(ARG_TRUSTED_CA_PATH)
                .long(ARG_TRUSTED_CA_PATH)
                .help("Additional CA bundle (PEM) trusted for identity provider calls")
                .env("GANGWAY_TRUSTED_CA_PATH"),
        )
}
