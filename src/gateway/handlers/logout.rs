use super::found;
use crate::gateway::AppContext;
use axum::{extract::Extension, http::header::SET_COOKIE, response::Response};
use std::sync::Arc;
use tracing::{info, instrument};

#[instrument(skip(ctx))]
pub async fn logout(Extension(ctx): Extension<Arc<AppContext>>) -> Response {
    info!("Session destroyed");

    let mut response = found("/");
    response
        .headers_mut()
        .insert(SET_COOKIE, ctx.sessions.destroy());
    response
}
