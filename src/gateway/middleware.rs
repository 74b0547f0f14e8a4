//! Session gate for protected routes.

use super::{handlers::found, session::SessionManager};
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::{from_fn_with_state, Next},
    response::Response,
    Router,
};
use std::sync::Arc;
use tracing::debug;

/// Anything able to tell whether a request carries a valid session.
pub trait SessionCheck: Send + Sync + 'static {
    fn is_authenticated(&self, headers: &HeaderMap) -> bool;
}

impl SessionCheck for SessionManager {
    fn is_authenticated(&self, headers: &HeaderMap) -> bool {
        SessionManager::is_authenticated(self, headers)
    }
}

/// Wrap every route of `router` so anonymous requests are redirected to
/// `/login` and never reach the handler.
pub fn protect<S>(router: Router<S>, check: Arc<dyn SessionCheck>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.route_layer(from_fn_with_state(check, require_session))
}

async fn require_session(
    State(check): State<Arc<dyn SessionCheck>>,
    request: Request,
    next: Next,
) -> Response {
    if check.is_authenticated(request.headers()) {
        next.run(request).await
    } else {
        debug!(path = %request.uri().path(), "No session, redirecting to login");
        found("/login")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header::LOCATION, Request as HttpRequest, StatusCode},
        routing::get,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    struct Fixed(bool);

    impl SessionCheck for Fixed {
        fn is_authenticated(&self, _headers: &HeaderMap) -> bool {
            self.0
        }
    }

    fn app(authenticated: bool, hits: Arc<AtomicUsize>) -> Router {
        let router = Router::new().route(
            "/secret",
            get(move || {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    "artifact"
                }
            }),
        );
        protect(router, Arc::new(Fixed(authenticated)))
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn anonymous_requests_are_redirected() {
        let hits = Arc::new(AtomicUsize::new(0));
        let response = app(false, hits.clone())
            .oneshot(HttpRequest::get("/secret").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers().get(LOCATION).unwrap(), "/login");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn authenticated_requests_pass_through() {
        let hits = Arc::new(AtomicUsize::new(0));
        let response = app(true, hits.clone())
            .oneshot(HttpRequest::get("/secret").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
