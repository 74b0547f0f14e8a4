use super::found;
use crate::gateway::AppContext;
use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, error, instrument};

/// Start the authorization-code flow: bind a fresh state nonce to the browser
/// and send it to the provider.
#[instrument(skip(ctx))]
pub async fn login(Extension(ctx): Extension<Arc<AppContext>>) -> Response {
    let login = match ctx.sessions.new_login_state() {
        Ok(login) => login,
        Err(err) => {
            error!("Failed to start login: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let url = ctx.oauth.authorization_url(&login.nonce);
    debug!("Redirecting to {}", ctx.oauth.config().authorize_url);

    let mut response = found(url.as_str());
    response.headers_mut().insert(SET_COOKIE, login.cookie);
    response
}
