//! Immutable runtime configuration, assembled once by the CLI layer.

use secrecy::SecretString;
use std::{path::PathBuf, str::FromStr, time::Duration};
use url::Url;

pub const DEFAULT_SESSION_TTL_SECONDS: u64 = 12 * 60 * 60;
pub const DEFAULT_LOGIN_TTL_SECONDS: u64 = 5 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub oauth: OAuthConfig,
    pub tls: TlsConfig,
    pub session: SessionConfig,
    pub cluster: ClusterConfig,
}

/// How the client authenticates itself at the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthStyle {
    /// `client_secret_basic`
    #[default]
    Header,
    /// `client_secret_post`
    Params,
}

impl FromStr for AuthStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "header" | "basic" => Ok(Self::Header),
            "params" | "post" => Ok(Self::Params),
            other => Err(format!("invalid token auth style: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub redirect_url: Url,
    pub scopes: Vec<String>,
    pub authorize_url: Url,
    pub token_url: Url,
    pub auth_style: AuthStyle,
}

#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    pub serve_tls: bool,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub trusted_ca_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Cookie encryption secret; a random key is generated when absent.
    pub key: Option<SecretString>,
    pub ttl: Duration,
    pub login_ttl: Duration,
    pub secure_cookies: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            key: None,
            ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECONDS),
            login_ttl: Duration::from_secs(DEFAULT_LOGIN_TTL_SECONDS),
            secure_cookies: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub name: String,
    pub apiserver_url: String,
    pub ca_path: Option<PathBuf>,
    pub issuer_url: Option<String>,
    pub username_claim: String,
    pub email_claim: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name: "kubernetes".to_string(),
            apiserver_url: String::new(),
            ca_path: None,
            issuer_url: None,
            username_claim: "sub".to_string(),
            email_claim: "email".to_string(),
        }
    }
}
