//! Trust configuration for calls to the identity provider.
//!
//! The root store is the system pool (empty if the platform offers none) plus
//! every certificate found in an optional custom CA bundle. It is built once at
//! startup and only shared read-only afterwards.
//!
//! - An unreadable CA bundle is fatal.
//! - A readable bundle without certificates only logs a warning.

use crate::APP_USER_AGENT;
use reqwest::Client;
use rustls::{crypto::ring, pki_types::CertificateDer, ClientConfig, RootCertStore};
use rustls_pemfile::certs;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Kept below the per-request timeout so a slow provider surfaces as a
/// gateway error rather than a request timeout.
pub const IDP_REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, Error)]
pub enum TrustError {
    #[error("failed to read trusted CA bundle {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to build TLS client configuration: {0}")]
    Tls(#[from] rustls::Error),
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct TrustStore {
    roots: Arc<RootCertStore>,
    system: usize,
    custom: usize,
}

impl TrustStore {
    /// Build the store from the system pool and an optional PEM bundle.
    ///
    /// # Errors
    /// Returns [`TrustError::Read`] if `ca_path` is set but cannot be read.
    pub fn load(ca_path: Option<&Path>) -> Result<Self, TrustError> {
        let mut roots = RootCertStore::empty();
        let system = add_system_roots(&mut roots);

        let custom = match ca_path {
            Some(path) => {
                let pem = fs::read(path).map_err(|source| TrustError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                add_pem_roots(&mut roots, &pem, path)
            }
            None => 0,
        };

        info!(system, custom, "Trust store ready");

        Ok(Self {
            roots: Arc::new(roots),
            system,
            custom,
        })
    }

    #[must_use]
    pub fn roots(&self) -> Arc<RootCertStore> {
        self.roots.clone()
    }

    #[must_use]
    pub fn system_count(&self) -> usize {
        self.system
    }

    #[must_use]
    pub fn custom_count(&self) -> usize {
        self.custom
    }

    /// rustls client configuration trusting exactly this store.
    ///
    /// # Errors
    /// Returns an error if the crypto provider rejects the default protocol versions.
    pub fn client_config(&self) -> Result<ClientConfig, TrustError> {
        Ok(
            ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
                .with_safe_default_protocol_versions()?
                .with_root_certificates(self.roots.clone())
                .with_no_client_auth(),
        )
    }

    /// The HTTP client used for every server-to-provider call.
    ///
    /// # Errors
    /// Returns an error if the TLS configuration or the client cannot be built.
    pub fn http_client(&self) -> Result<Client, TrustError> {
        Ok(Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(IDP_REQUEST_TIMEOUT)
            .use_preconfigured_tls(self.client_config()?)
            .build()?)
    }
}

fn add_system_roots(store: &mut RootCertStore) -> usize {
    let native = rustls_native_certs::load_native_certs();
    for err in &native.errors {
        warn!("Failed to load system root certificates: {err}");
    }
    let (added, ignored) = store.add_parsable_certificates(native.certs);
    if ignored > 0 {
        debug!("Ignored {ignored} unparsable system root certificates");
    }
    added
}

fn add_pem_roots(store: &mut RootCertStore, pem: &[u8], path: &Path) -> usize {
    let mut reader = pem;
    let parsed: Vec<CertificateDer<'static>> = certs(&mut reader)
        .filter_map(|cert| match cert {
            Ok(cert) => Some(cert),
            Err(err) => {
                warn!("Skipping malformed PEM section in {}: {err}", path.display());
                None
            }
        })
        .collect();

    let (added, _) = store.add_parsable_certificates(parsed);
    if added == 0 {
        warn!(
            "No certs appended from {}, using system certs only",
            path.display()
        );
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{
        BasicConstraints, Certificate, CertificateParams, ExtendedKeyUsagePurpose, IsCa, KeyPair,
        KeyUsagePurpose,
    };
    use rustls::{
        client::{danger::ServerCertVerifier, WebPkiServerVerifier},
        pki_types::{ServerName, UnixTime},
    };
    use uuid::Uuid;

    #[test]
    fn provider_calls_time_out_before_the_request_does() {
        assert!(IDP_REQUEST_TIMEOUT < crate::gateway::server::WRITE_TIMEOUT);
    }

    fn temp_path(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!("gangway-trust-{label}-{}", Uuid::new_v4()))
    }

    fn private_ca() -> (Certificate, KeyPair) {
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        let key = KeyPair::generate().unwrap();
        let cert = params.self_signed(&key).unwrap();
        (cert, key)
    }

    fn leaf_signed_by(ca: &Certificate, ca_key: &KeyPair) -> Certificate {
        let mut params = CertificateParams::new(vec!["idp.test".to_string()]).unwrap();
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        let key = KeyPair::generate().unwrap();
        params.signed_by(&key, ca, ca_key).unwrap()
    }

    fn verifies(store: &TrustStore, leaf: &Certificate) -> bool {
        let verifier =
            WebPkiServerVerifier::builder_with_provider(store.roots(), Arc::new(ring::default_provider()))
                .build()
                .unwrap();
        let name = ServerName::try_from("idp.test").unwrap();
        verifier
            .verify_server_cert(leaf.der(), &[], &name, &[], UnixTime::now())
            .is_ok()
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn custom_ca_validates_chain() {
        let (ca, ca_key) = private_ca();
        let leaf = leaf_signed_by(&ca, &ca_key);

        let path = temp_path("ca");
        fs::write(&path, ca.pem()).unwrap();

        let store = TrustStore::load(Some(&path)).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(store.custom_count(), 1);
        assert!(verifies(&store, &leaf));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn system_pool_alone_rejects_private_chain() {
        let (ca, ca_key) = private_ca();
        let leaf = leaf_signed_by(&ca, &ca_key);

        let store = TrustStore::load(None).unwrap();
        assert_eq!(store.custom_count(), 0);
        assert!(!verifies(&store, &leaf));
    }

    #[test]
    fn missing_ca_file_is_fatal() {
        let path = temp_path("missing");
        let result = TrustStore::load(Some(&path));
        assert!(matches!(result, Err(TrustError::Read { .. })));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn bundle_without_certificates_keeps_system_pool() {
        let path = temp_path("empty");
        fs::write(&path, "this is not a certificate\n").unwrap();

        let store = TrustStore::load(Some(&path)).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(store.custom_count(), 0);
        assert_eq!(store.roots().len(), store.system_count());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn http_client_builds_from_store() {
        let store = TrustStore::load(None).unwrap();
        assert!(store.http_client().is_ok());
    }
}
