//! HTTP(S) listener with bounded timeouts and graceful drain.
//!
//! ## Flow Overview
//! 1) Accept TCP connections until the shutdown future resolves.
//! 2) Optionally wrap each stream in TLS (handshake bounded by [`READ_TIMEOUT`]).
//! 3) Serve HTTP/1.1 or HTTP/2 on it, tagging every request with the peer address.
//! 4) On shutdown stop accepting, ask live connections to finish their in-flight
//!    request, and wait at most [`SHUTDOWN_TIMEOUT`] for them to close.

use anyhow::{anyhow, Context, Result};
use axum::{extract::ConnectInfo, Router};
use hyper::{body::Incoming, service::service_fn, Request};
use hyper_util::{
    rt::{TokioExecutor, TokioIo, TokioTimer},
    server::conn::auto::Builder,
};
use rustls::{
    crypto::ring,
    pki_types::{CertificateDer, PrivateKeyDer},
    ServerConfig,
};
use rustls_pemfile::{certs, private_key};
use std::{
    fs::File,
    future::Future,
    io::BufReader,
    net::SocketAddr,
    path::Path,
    pin::Pin,
    sync::Arc,
    time::Duration,
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream},
    signal,
    sync::watch,
    time::{sleep, timeout},
};
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;
use tracing::{debug, error, info, warn};

/// Maximum time to receive request headers (and finish a TLS handshake).
pub const READ_TIMEOUT: Duration = Duration::from_secs(10);
/// Maximum time a handler may take to produce its response.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);
/// Maximum time to wait for in-flight requests once shutdown starts.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
/// Pause after a failed `accept`, e.g. when file descriptors run out.
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Bind the listening socket.
///
/// # Errors
/// Returns an error if the address cannot be bound.
pub async fn bind(host: &str, port: u16) -> Result<TcpListener> {
    let listener = TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind {host}:{port}"))?;
    Ok(listener)
}

/// TLS acceptor for the configured certificate chain and private key.
///
/// # Errors
/// Returns an error if either file cannot be read or parsed.
pub fn tls_acceptor(cert: &Path, key: &Path) -> Result<TlsAcceptor> {
    let chain = load_cert_chain(cert)?;
    let key = load_private_key(key)?;

    let mut config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .context("Failed to select TLS protocol versions")?
        .with_no_client_auth()
        .with_single_cert(chain, key)
        .context("Failed to build TLS server config")?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_cert_chain(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open TLS certificate: {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let chain = certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read TLS certificate: {}", path.display()))?;
    if chain.is_empty() {
        return Err(anyhow!("TLS certificate is empty: {}", path.display()));
    }
    Ok(chain)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open TLS key: {}", path.display()))?;
    let mut reader = BufReader::new(file);
    private_key(&mut reader)
        .with_context(|| format!("Failed to read TLS key: {}", path.display()))?
        .ok_or_else(|| anyhow!("No private key found in {}", path.display()))
}

/// Wait [`ACCEPT_ERROR_BACKOFF`] before accepting again. Returns `true` if
/// shutdown was requested meanwhile.
async fn accept_backoff<F>(shutdown: Pin<&mut F>) -> bool
where
    F: Future<Output = ()>,
{
    tokio::select! {
        () = sleep(ACCEPT_ERROR_BACKOFF) => false,
        () = shutdown => true,
    }
}

/// Serve `app` on `listener` until `shutdown` resolves, then drain.
///
/// Connections still open after [`SHUTDOWN_TIMEOUT`] are abandoned.
///
/// # Errors
/// Currently infallible once the listener is bound; accept errors are logged
/// and accepting resumes after [`ACCEPT_ERROR_BACKOFF`].
pub async fn serve<F>(
    listener: TcpListener,
    app: Router,
    tls: Option<TlsAcceptor>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (signal_tx, signal_rx) = watch::channel(());
    let (close_tx, close_rx) = watch::channel(());

    tokio::pin!(shutdown);

    loop {
        let (stream, remote) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(connection) => connection,
                Err(err) => {
                    warn!("Failed to accept connection: {err}");
                    if accept_backoff(shutdown.as_mut()).await {
                        break;
                    }
                    continue;
                }
            },
            () = &mut shutdown => break,
        };

        let app = app.clone();
        let tls = tls.clone();
        let signal_rx = signal_rx.clone();
        let close_rx = close_rx.clone();

        tokio::spawn(async move {
            handle(stream, remote, app, tls, signal_rx).await;
            drop(close_rx);
        });
    }

    drop(listener);
    drop(close_rx);

    info!(
        "Shutting down, waiting for {} open connection(s)",
        close_tx.receiver_count()
    );
    let _ = signal_tx.send(());

    match timeout(SHUTDOWN_TIMEOUT, close_tx.closed()).await {
        Ok(()) => info!("All connections closed"),
        Err(_) => warn!(
            "Shutdown deadline reached with {} connection(s) still open",
            close_tx.receiver_count()
        ),
    }

    Ok(())
}

async fn handle(
    stream: TcpStream,
    remote: SocketAddr,
    app: Router,
    tls: Option<TlsAcceptor>,
    signal: watch::Receiver<()>,
) {
    match tls {
        Some(acceptor) => match timeout(READ_TIMEOUT, acceptor.accept(stream)).await {
            Ok(Ok(stream)) => serve_connection(stream, remote, app, signal).await,
            Ok(Err(err)) => debug!(%remote, "TLS handshake failed: {err}"),
            Err(_) => debug!(%remote, "TLS handshake timed out"),
        },
        None => serve_connection(stream, remote, app, signal).await,
    }
}

async fn serve_connection<I>(
    io: I,
    remote: SocketAddr,
    app: Router,
    mut signal: watch::Receiver<()>,
) where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |mut request: Request<Incoming>| {
        request.extensions_mut().insert(ConnectInfo(remote));
        app.clone().oneshot(request)
    });

    let mut builder = Builder::new(TokioExecutor::new());
    builder
        .http1()
        .timer(TokioTimer::new())
        .header_read_timeout(READ_TIMEOUT);

    let connection = builder.serve_connection(TokioIo::new(io), service);
    tokio::pin!(connection);

    let mut draining = false;
    loop {
        tokio::select! {
            result = connection.as_mut() => {
                if let Err(err) = result {
                    debug!(%remote, "Connection closed with error: {err}");
                }
                break;
            }
            _ = signal.changed(), if !draining => {
                draining = true;
                connection.as_mut().graceful_shutdown();
            }
        }
    }
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs, path::PathBuf};

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("gangway-{}-{name}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn accept_backoff_pauses_before_retrying() {
        let started = tokio::time::Instant::now();
        let never = std::future::pending::<()>();
        tokio::pin!(never);
        assert!(!accept_backoff(never.as_mut()).await);
        assert!(started.elapsed() >= ACCEPT_ERROR_BACKOFF);
    }

    #[tokio::test]
    async fn accept_backoff_yields_to_shutdown() {
        let started = tokio::time::Instant::now();
        let stop = std::future::ready(());
        tokio::pin!(stop);
        assert!(accept_backoff(stop.as_mut()).await);
        assert!(started.elapsed() < ACCEPT_ERROR_BACKOFF);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn tls_acceptor_loads_generated_pair() {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert_path = temp_path("cert.pem");
        let key_path = temp_path("key.pem");
        fs::write(&cert_path, cert.cert.pem()).unwrap();
        fs::write(&key_path, cert.key_pair.serialize_pem()).unwrap();

        let acceptor = tls_acceptor(&cert_path, &key_path);

        let _ = fs::remove_file(&cert_path);
        let _ = fs::remove_file(&key_path);
        assert!(acceptor.is_ok());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn tls_acceptor_rejects_missing_key() {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert_path = temp_path("cert.pem");
        let key_path = temp_path("empty-key.pem");
        fs::write(&cert_path, cert.cert.pem()).unwrap();
        fs::write(&key_path, "").unwrap();

        let result = tls_acceptor(&cert_path, &key_path);

        let _ = fs::remove_file(&cert_path);
        let _ = fs::remove_file(&key_path);
        let err = result.err().unwrap();
        assert!(err.to_string().contains("No private key found"));
    }

    #[test]
    fn tls_acceptor_rejects_missing_files() {
        let result = tls_acceptor(Path::new("/nonexistent/cert.pem"), Path::new("/nonexistent/key.pem"));
        assert!(result.is_err());
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn bind_fails_when_port_taken() {
        let first = bind("127.0.0.1", 0).await.unwrap();
        let port = first.local_addr().unwrap().port();
        assert!(bind("127.0.0.1", port).await.is_err());
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn serve_returns_after_shutdown_without_connections() {
        let listener = bind("127.0.0.1", 0).await.unwrap();
        let result = timeout(
            Duration::from_secs(5),
            serve(listener, Router::new(), None, async {}),
        )
        .await
        .unwrap();
        assert!(result.is_ok());
    }
}
