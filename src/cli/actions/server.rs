use crate::gateway::{self, config::Config};
use anyhow::Result;
use tracing::{debug, info};

#[derive(Debug)]
pub struct Args {
    pub config: Config,
}

/// Execute the server action.
/// # Errors
/// Returns an error if startup material cannot be loaded or the listener cannot be bound.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args.config);
    gateway::new(args.config).await
}

fn log_startup_args(config: &Config) {
    info!(
        host = %config.host,
        port = config.port,
        serve_tls = config.tls.serve_tls,
        cluster = %config.cluster.name,
        "Starting gangway"
    );
    debug!(
        client_id = %config.oauth.client_id,
        authorize_url = %config.oauth.authorize_url,
        token_url = %config.oauth.token_url,
        redirect_url = %config.oauth.redirect_url,
        scopes = %config.oauth.scopes.join(" "),
        auth_style = ?config.oauth.auth_style,
        trusted_ca = ?config.tls.trusted_ca_path,
        session_key_configured = config.session.key.is_some(),
        secure_cookies = config.session.secure_cookies,
        "Startup configuration"
    );
}
