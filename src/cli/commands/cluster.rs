use crate::gateway::config::ClusterConfig;
use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;
use url::Url;

pub const ARG_CLUSTER_NAME: &str = "cluster-name";
pub const ARG_APISERVER_URL: &str = "apiserver-url";
pub const ARG_CLUSTER_CA_PATH: &str = "cluster-ca-path";
pub const ARG_ISSUER_URL: &str = "issuer-url";
pub const ARG_USERNAME_CLAIM: &str = "username-claim";
pub const ARG_EMAIL_CLAIM: &str = "email-claim";

/// Parse the cluster description embedded in issued credentials.
///
/// # Errors
/// Returns an error if the API server URL is missing or a URL does not parse.
pub fn parse(matches: &ArgMatches) -> Result<ClusterConfig> {
    let defaults = ClusterConfig::default();
    let read = |id: &str| {
        matches
            .get_one::<String>(id)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let apiserver_url = read(ARG_APISERVER_URL)
        .ok_or_else(|| anyhow!("missing required argument: --{ARG_APISERVER_URL}"))?;
    Url::parse(&apiserver_url).with_context(|| format!("invalid --{ARG_APISERVER_URL}: {apiserver_url}"))?;

    let issuer_url = read(ARG_ISSUER_URL);
    if let Some(issuer) = &issuer_url {
        Url::parse(issuer).with_context(|| format!("invalid --{ARG_ISSUER_URL}: {issuer}"))?;
    }

    Ok(ClusterConfig {
        name: read(ARG_CLUSTER_NAME).unwrap_or(defaults.name),
        apiserver_url,
        ca_path: read(ARG_CLUSTER_CA_PATH).map(PathBuf::from),
        issuer_url,
        username_claim: read(ARG_USERNAME_CLAIM).unwrap_or(defaults.username_claim),
        email_claim: read(ARG_EMAIL_CLAIM).unwrap_or(defaults.email_claim),
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_CLUSTER_NAME)
                .long(ARG_CLUSTER_NAME)
                .help("Cluster name used for the kubectl cluster and context")
                .env("GANGWAY_CLUSTER_NAME")
                .default_value("kubernetes"),
        )
        .arg(
            Arg::new(ARG_APISERVER_URL)
                .long(ARG_APISERVER_URL)
                .help("Kubernetes API server URL, example: https://k8s.tld:6443")
                .env("GANGWAY_APISERVER_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_CLUSTER_CA_PATH)
                .long(ARG_CLUSTER_CA_PATH)
                .help("Cluster CA certificate (PEM) embedded in issued credentials")
                .env("GANGWAY_CLUSTER_CA_PATH"),
        )
        .arg(
            Arg::new(ARG_ISSUER_URL)
                .long(ARG_ISSUER_URL)
                .help("OIDC issuer written into credentials (default: the ID token's iss claim)")
                .env("GANGWAY_ISSUER_URL"),
        )
        .arg(
            Arg::new(ARG_USERNAME_CLAIM)
                .long(ARG_USERNAME_CLAIM)
                .help("ID token claim holding the username")
                .env("GANGWAY_USERNAME_CLAIM")
                .default_value("sub"),
        )
        .arg(
            Arg::new(ARG_EMAIL_CLAIM)
                .long(ARG_EMAIL_CLAIM)
                .help("ID token claim holding the email address")
                .env("GANGWAY_EMAIL_CLAIM")
                .default_value("email"),
        )
}
