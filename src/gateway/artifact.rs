//! Cluster credentials derived from an authenticated session.
//!
//! Two renderings of the same data: `kubectl config` commands for copy/paste,
//! and a kubeconfig document for download. Both use the `oidc` auth provider
//! so kubectl can refresh the ID token on its own.

use super::{config::ClusterConfig, session::AuthenticatedSession};
use base64ct::{Base64, Encoding};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::{collections::BTreeMap, fmt::Write};

pub struct Credential<'a> {
    pub cluster: &'a ClusterConfig,
    pub client_id: &'a str,
    pub client_secret: &'a SecretString,
    pub session: &'a AuthenticatedSession,
    pub cluster_ca: Option<&'a [u8]>,
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct KubeConfig {
    #[serde(rename = "apiVersion")]
    api_version: &'static str,
    kind: &'static str,
    clusters: Vec<NamedCluster>,
    contexts: Vec<NamedContext>,
    current_context: String,
    preferences: BTreeMap<String, String>,
    users: Vec<NamedUser>,
}

#[derive(Serialize)]
struct NamedCluster {
    name: String,
    cluster: ClusterEntry,
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct ClusterEntry {
    server: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    certificate_authority_data: Option<String>,
}

#[derive(Serialize)]
struct NamedContext {
    name: String,
    context: ContextEntry,
}

#[derive(Serialize)]
struct ContextEntry {
    cluster: String,
    user: String,
}

#[derive(Serialize)]
struct NamedUser {
    name: String,
    user: UserEntry,
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct UserEntry {
    auth_provider: AuthProvider,
}

#[derive(Serialize)]
struct AuthProvider {
    name: &'static str,
    config: BTreeMap<&'static str, String>,
}

impl Credential<'_> {
    /// Issuer URL: configured value first, then the ID token's `iss` claim.
    #[must_use]
    pub fn issuer(&self) -> &str {
        self.cluster
            .issuer_url
            .as_deref()
            .or(self.session.identity.issuer.as_deref())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn user_name(&self) -> String {
        format!(
            "{}@{}",
            self.session.identity.display_name(),
            self.cluster.name
        )
    }

    fn id_token(&self) -> &str {
        self.session
            .token
            .id_token
            .as_deref()
            .unwrap_or(&self.session.token.access_token)
    }

    fn ca_file(&self) -> String {
        format!("ca-{}.pem", self.cluster.name)
    }

    fn auth_provider_config(&self) -> BTreeMap<&'static str, String> {
        let mut config = BTreeMap::new();
        config.insert("client-id", self.client_id.to_string());
        config.insert(
            "client-secret",
            self.client_secret.expose_secret().to_string(),
        );
        config.insert("id-token", self.id_token().to_string());
        config.insert("idp-issuer-url", self.issuer().to_string());
        if let Some(refresh) = &self.session.token.refresh_token {
            config.insert("refresh-token", refresh.clone());
        }
        config
    }

    /// Shell commands that configure kubectl for this user.
    #[must_use]
    pub fn commandline(&self) -> String {
        let cluster = &self.cluster.name;
        let user = self.user_name();
        let mut out = String::new();

        if let Some(ca) = self.cluster_ca {
            let _ = writeln!(
                out,
                "echo {} | base64 -d > {}",
                shell_quote(&Base64::encode_string(ca)),
                shell_quote(&self.ca_file())
            );
            let _ = writeln!(
                out,
                "kubectl config set-cluster {} --server={} --certificate-authority={} --embed-certs",
                shell_quote(cluster),
                shell_quote(&self.cluster.apiserver_url),
                shell_quote(&self.ca_file())
            );
        } else {
            let _ = writeln!(
                out,
                "kubectl config set-cluster {} --server={}",
                shell_quote(cluster),
                shell_quote(&self.cluster.apiserver_url)
            );
        }

        let _ = write!(
            out,
            "kubectl config set-credentials {} \\\n    --auth-provider=oidc",
            shell_quote(&user)
        );
        for (key, value) in self.auth_provider_config() {
            let _ = write!(
                out,
                " \\\n    --auth-provider-arg={key}={}",
                shell_quote(&value)
            );
        }
        out.push('\n');

        let _ = writeln!(
            out,
            "kubectl config set-context {} --cluster={} --user={}",
            shell_quote(cluster),
            shell_quote(cluster),
            shell_quote(&user)
        );
        let _ = writeln!(out, "kubectl config use-context {}", shell_quote(cluster));
        out
    }

    /// kubeconfig document for this user.
    ///
    /// # Errors
    /// Returns an error if YAML serialization fails.
    pub fn kubeconfig(&self) -> Result<String, serde_yaml::Error> {
        let cluster = self.cluster.name.clone();
        let user = self.user_name();
        let config = KubeConfig {
            api_version: "v1",
            kind: "Config",
            clusters: vec![NamedCluster {
                name: cluster.clone(),
                cluster: ClusterEntry {
                    server: self.cluster.apiserver_url.clone(),
                    certificate_authority_data: self.cluster_ca.map(Base64::encode_string),
                },
            }],
            contexts: vec![NamedContext {
                name: cluster.clone(),
                context: ContextEntry {
                    cluster: cluster.clone(),
                    user: user.clone(),
                },
            }],
            current_context: cluster,
            preferences: BTreeMap::new(),
            users: vec![NamedUser {
                name: user,
                user: UserEntry {
                    auth_provider: AuthProvider {
                        name: "oidc",
                        config: self.auth_provider_config(),
                    },
                },
            }],
        };
        serde_yaml::to_string(&config)
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
