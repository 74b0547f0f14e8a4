use super::found;
use crate::gateway::{identity::Identity, AppContext};
use axum::{
    extract::{Extension, Query},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

pub const AUTHENTICATED_LANDING: &str = "/commandline";

#[derive(Deserialize, Default)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Finish the authorization-code flow.
///
/// 400 without `code`/`state`, 403 when the state does not redeem the
/// browser's pending nonce, 502 when the provider refuses the code. Only a
/// successful exchange sets an authenticated session, and a rejected callback
/// never clears one that is already established.
#[instrument(skip_all)]
pub async fn callback(
    Extension(ctx): Extension<Arc<AppContext>>,
    headers: HeaderMap,
    params: Option<Query<CallbackParams>>,
) -> Response {
    let params = params.map(|Query(params)| params).unwrap_or_default();

    let (Some(code), Some(state)) = (
        params.code.filter(|code| !code.is_empty()),
        params.state.filter(|state| !state.is_empty()),
    ) else {
        if let Some(err) = params.error {
            warn!(
                "Provider returned an error: {err} {}",
                params.error_description.unwrap_or_default()
            );
        }
        return (StatusCode::BAD_REQUEST, "Missing code or state parameter").into_response();
    };

    if !ctx.sessions.validate_and_consume_state(&headers, &state) {
        warn!("Rejected callback: state does not match a pending login");
        return rejected(&ctx, &headers, StatusCode::FORBIDDEN, "Invalid state parameter");
    }

    let token = match ctx.oauth.exchange_code(&code, &state).await {
        Ok(token) => token,
        Err(err) => {
            error!("Token exchange failed: {err}");
            return rejected(&ctx, &headers, StatusCode::BAD_GATEWAY, "Token exchange failed");
        }
    };

    let identity = Identity::from_id_token(
        token.id_token.as_deref(),
        &ctx.cluster.username_claim,
        &ctx.cluster.email_claim,
    );
    info!(user = identity.display_name(), "Login succeeded");

    let cookie = match ctx.sessions.establish_session(identity, token) {
        Ok(cookie) => cookie,
        Err(err) => {
            error!("Failed to establish session: {err}");
            return rejected(
                &ctx,
                &headers,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to establish session",
            );
        }
    };

    let mut response = found(AUTHENTICATED_LANDING);
    response.headers_mut().insert(SET_COOKIE, cookie);
    response
}

/// Error response that drops a leftover pending login but keeps a signed-in
/// session intact.
fn rejected(
    ctx: &AppContext,
    headers: &HeaderMap,
    status: StatusCode,
    message: &'static str,
) -> Response {
    let mut response = (status, message).into_response();
    if !ctx.sessions.is_authenticated(headers) {
        response
            .headers_mut()
            .insert(SET_COOKIE, ctx.sessions.destroy());
    }
    response
}
