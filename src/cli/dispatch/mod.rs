//! Command-line argument dispatch.
//!
//! Turns validated CLI matches into the immutable gateway [`Config`] and the
//! action that runs it.

use crate::cli::{
    actions::{server::Args, Action},
    commands::{cluster, oauth, session, tls, ARG_HOST, ARG_PORT},
};
use crate::gateway::config::Config;
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let host = matches
        .get_one::<String>(ARG_HOST)
        .cloned()
        .context("missing required argument: --host")?;
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);

    let tls = tls::parse(matches)?;
    let session = session::parse(matches, tls.serve_tls)?;

    Ok(Action::Server(Args {
        config: Config {
            host,
            port,
            oauth: oauth::parse(matches)?,
            tls,
            session,
            cluster: cluster::parse(matches)?,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::config::AuthStyle;
    use secrecy::ExposeSecret;
    use std::time::Duration;

    fn args(extra: &[&str]) -> Vec<String> {
        let mut args: Vec<String> = [
            "gangway",
            "--client-id",
            "gangway",
            "--client-secret",
            "s3cret",
            "--redirect-url",
            "https://gangway.tld/callback",
            "--authorize-url",
            "https://idp.tld/auth",
            "--token-url",
            "https://idp.tld/token",
            "--apiserver-url",
            "https://k8s.tld:6443",
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        args.extend(extra.iter().map(ToString::to_string));
        args
    }

    fn config(extra: &[&str]) -> Result<Config> {
        let matches = crate::cli::commands::new().try_get_matches_from(args(extra))?;
        let Action::Server(args) = handler(&matches)?;
        Ok(args.config)
    }

    fn with_clean_env<F: FnOnce()>(f: F) {
        temp_env::with_vars(
            [
                ("GANGWAY_SERVE_TLS", None::<&str>),
                ("GANGWAY_CERT_FILE", None),
                ("GANGWAY_KEY_FILE", None),
                ("GANGWAY_SESSION_KEY", None),
                ("GANGWAY_SECURE_COOKIES", None),
                ("GANGWAY_SCOPES", None),
                ("GANGWAY_ISSUER_URL", None),
            ],
            f,
        );
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn builds_config_with_defaults() {
        with_clean_env(|| {
            let config = config(&[]).unwrap();
            assert_eq!(config.host, "0.0.0.0");
            assert_eq!(config.port, 8080);
            assert_eq!(config.oauth.client_id, "gangway");
            assert_eq!(config.oauth.client_secret.expose_secret(), "s3cret");
            assert_eq!(
                config.oauth.scopes,
                ["openid", "profile", "email", "offline_access"]
            );
            assert_eq!(config.oauth.auth_style, AuthStyle::Header);
            assert_eq!(config.session.ttl, Duration::from_secs(43_200));
            assert_eq!(config.session.login_ttl, Duration::from_secs(300));
            assert!(!config.session.secure_cookies);
            assert!(config.session.key.is_none());
            assert_eq!(config.cluster.name, "kubernetes");
            assert_eq!(config.cluster.username_claim, "sub");
            assert!(!config.tls.serve_tls);
        });
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn scopes_keep_their_order() {
        with_clean_env(|| {
            let config = config(&["--scopes", "profile, openid,groups"]).unwrap();
            assert_eq!(config.oauth.scopes, ["profile", "openid", "groups"]);
        });
    }

    #[test]
    fn serve_tls_requires_cert_and_key() {
        with_clean_env(|| {
            let err = config(&["--serve-tls"]).err().map(|e| e.to_string());
            assert!(err.is_some_and(|e| e.contains("--cert-file")));

            let err = config(&["--serve-tls", "--cert-file", "/tmp/cert.pem"])
                .err()
                .map(|e| e.to_string());
            assert!(err.is_some_and(|e| e.contains("--key-file")));
        });
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn serving_tls_forces_secure_cookies() {
        with_clean_env(|| {
            let config = config(&[
                "--serve-tls",
                "--cert-file",
                "/tmp/cert.pem",
                "--key-file",
                "/tmp/key.pem",
            ])
            .unwrap();
            assert!(config.tls.serve_tls);
            assert!(config.session.secure_cookies);
        });
    }

    #[test]
    fn short_session_key_is_rejected() {
        with_clean_env(|| {
            let err = config(&["--session-key", "too-short"])
                .err()
                .map(|e| e.to_string());
            assert!(err.is_some_and(|e| e.contains("at least 32 bytes")));
        });
    }

    #[test]
    fn invalid_urls_are_rejected() {
        with_clean_env(|| {
            let mut argv = args(&[]);
            if let Some(pos) = argv.iter().position(|a| a == "https://idp.tld/token") {
                argv[pos] = "not a url".to_string();
            }
            let matches = crate::cli::commands::new().try_get_matches_from(argv);
            let err = matches
                .map_err(anyhow::Error::from)
                .and_then(|m| handler(&m))
                .err()
                .map(|e| e.to_string());
            assert!(err.is_some_and(|e| e.contains("--token-url")));

            let err = config(&["--issuer-url", "::nope"]).err().map(|e| e.to_string());
            assert!(err.is_some_and(|e| e.contains("--issuer-url")));
        });
    }

    #[test]
    fn zero_ttl_is_rejected() {
        with_clean_env(|| {
            assert!(config(&["--session-ttl-seconds", "0"]).is_err());
        });
    }
}
