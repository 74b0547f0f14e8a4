//! # Gangway (OIDC login gateway for cluster credentials)
//!
//! `gangway` sits between a browser and an external OAuth2/OIDC identity
//! provider. It runs the authorization-code flow, keeps the result in an
//! encrypted session cookie, and hands authenticated users a ready-to-use
//! cluster credential (`kubectl` commands or a kubeconfig document).
//!
//! ## Protocol
//!
//! - `GET /login` issues a single-use state nonce and redirects to the provider.
//! - `GET /callback` checks the nonce, exchanges the code over the trusted
//!   back channel and establishes the session.
//! - `GET /commandline`, `GET /kubeconf` and `GET /logout` require a session;
//!   anonymous requests are redirected to `/login`.
//!
//! ## Trust
//!
//! Calls to the provider use a dedicated HTTP client whose root store is the
//! system pool plus an optional private CA. The store is built once at startup
//! and never mutated afterwards.

pub mod cli;
pub mod gateway;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
