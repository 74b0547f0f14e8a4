use super::found;
use crate::gateway::{artifact::Credential, session::AuthenticatedSession, AppContext};
use axum::{
    extract::Extension,
    http::{
        header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{error, instrument};

fn credential<'a>(ctx: &'a AppContext, session: &'a AuthenticatedSession) -> Credential<'a> {
    Credential {
        cluster: &ctx.cluster,
        client_id: &ctx.oauth.config().client_id,
        client_secret: &ctx.oauth.config().client_secret,
        session,
        cluster_ca: ctx.cluster_ca.as_deref(),
    }
}

/// `kubectl` commands configuring the signed-in user's credentials.
#[instrument(skip_all)]
pub async fn commandline(
    Extension(ctx): Extension<Arc<AppContext>>,
    headers: HeaderMap,
) -> Response {
    let Some(session) = ctx.sessions.current(&headers) else {
        return found("/login");
    };

    (
        StatusCode::OK,
        [
            (CONTENT_TYPE, "text/plain; charset=utf-8"),
            (CACHE_CONTROL, "no-store"),
        ],
        credential(&ctx, &session).commandline(),
    )
        .into_response()
}

/// Downloadable kubeconfig for the signed-in user.
#[instrument(skip_all)]
pub async fn kubeconf(Extension(ctx): Extension<Arc<AppContext>>, headers: HeaderMap) -> Response {
    let Some(session) = ctx.sessions.current(&headers) else {
        return found("/login");
    };

    match credential(&ctx, &session).kubeconfig() {
        Ok(yaml) => (
            StatusCode::OK,
            [
                (CONTENT_TYPE, "application/yaml"),
                (CONTENT_DISPOSITION, "attachment; filename=\"kubeconfig\""),
                (CACHE_CONTROL, "no-store"),
            ],
            yaml,
        )
            .into_response(),
        Err(err) => {
            error!("Failed to render kubeconfig: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
