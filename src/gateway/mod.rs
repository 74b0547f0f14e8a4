pub mod artifact;
pub mod config;
pub mod handlers;
pub mod identity;
pub mod middleware;
pub mod oauth;
pub mod server;
pub mod session;
pub mod trust;

use self::{
    config::{ClusterConfig, Config},
    middleware::{protect, SessionCheck},
    oauth::OAuthClient,
    session::{PrivateCookieCodec, SessionCodec, SessionManager},
    trust::TrustStore,
};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{ConnectInfo, MatchedPath},
    http::{HeaderName, HeaderValue, Request, StatusCode},
    routing::get,
    Extension, Router,
};
use std::{fs, net::SocketAddr, sync::Arc};
use tokio::sync::oneshot;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    timeout::TimeoutLayer,
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{info, info_span, warn, Level, Span};
use ulid::Ulid;

/// Everything a handler needs, built once at startup and shared read-only.
pub struct AppContext {
    pub oauth: OAuthClient,
    pub sessions: Arc<SessionManager>,
    pub cluster: ClusterConfig,
    /// PEM bytes of the cluster CA, embedded in issued credentials.
    pub cluster_ca: Option<Vec<u8>>,
}

impl AppContext {
    #[must_use]
    pub fn new(
        oauth: OAuthClient,
        sessions: Arc<SessionManager>,
        cluster: ClusterConfig,
        cluster_ca: Option<Vec<u8>>,
    ) -> Self {
        Self {
            oauth,
            sessions,
            cluster,
            cluster_ca,
        }
    }
}

/// Build the application router.
///
/// `/logout`, `/commandline` and `/kubeconf` sit behind the session gate; the
/// rest is public.
pub fn router(ctx: Arc<AppContext>) -> Router {
    let check: Arc<dyn SessionCheck> = ctx.sessions.clone();

    let protected = protect(
        Router::new()
            .route("/logout", get(handlers::logout))
            .route("/commandline", get(handlers::commandline))
            .route("/kubeconf", get(handlers::kubeconf)),
        check,
    );

    Router::new()
        .route("/", get(handlers::home))
        .route("/health", get(handlers::health).options(handlers::health))
        .route("/login", get(handlers::login))
        .route("/callback", get(handlers::callback))
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(make_span)
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    server::WRITE_TIMEOUT,
                ))
                .layer(Extension(ctx)),
        )
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |info| info.0.to_string());

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        remote = %remote,
        request_id
    )
}

/// Wire everything from `config` and serve until SIGINT/SIGTERM.
///
/// # Errors
/// Returns an error if the trust store, TLS material, session key or cluster CA
/// cannot be loaded, or if the listener cannot be bound.
pub async fn new(config: Config) -> Result<()> {
    let trust = TrustStore::load(config.tls.trusted_ca_path.as_deref())
        .context("Failed to load trusted CA bundle")?;
    let http = trust.http_client()?;

    let codec: Arc<dyn SessionCodec> = match &config.session.key {
        Some(secret) => Arc::new(PrivateCookieCodec::from_secret(secret)?),
        None => {
            warn!("No session key configured, using an ephemeral key: sessions will not survive a restart");
            Arc::new(PrivateCookieCodec::generate())
        }
    };
    let sessions = Arc::new(SessionManager::new(codec, &config.session));

    let cluster_ca = match &config.cluster.ca_path {
        Some(path) => Some(
            fs::read(path)
                .with_context(|| format!("Failed to read cluster CA: {}", path.display()))?,
        ),
        None => None,
    };

    let acceptor = if config.tls.serve_tls {
        let cert = config
            .tls
            .cert_file
            .as_deref()
            .context("TLS serving requires a certificate file")?;
        let key = config
            .tls
            .key_file
            .as_deref()
            .context("TLS serving requires a key file")?;
        Some(server::tls_acceptor(cert, key)?)
    } else {
        None
    };

    let oauth = OAuthClient::new(config.oauth, http);
    let ctx = Arc::new(AppContext::new(oauth, sessions, config.cluster, cluster_ca));
    let app = router(ctx);

    let listener = server::bind(&config.host, config.port).await?;
    let scheme = if acceptor.is_some() { "https" } else { "http" };
    info!("Listening on {scheme}://{}", listener.local_addr()?);

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let serving = tokio::spawn(server::serve(listener, app, acceptor, async move {
        let _ = stop_rx.await;
    }));

    server::shutdown_signal().await;
    let _ = stop_tx.send(());

    serving.await.context("Server task failed")??;

    info!("Gracefully shutdown");

    Ok(())
}
