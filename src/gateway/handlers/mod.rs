pub mod callback;
pub use self::callback::callback;

pub mod commandline;
pub use self::commandline::{commandline, kubeconf};

pub mod health;
pub use self::health::health;

pub mod home;
pub use self::home::home;

pub mod login;
pub use self::login::login;

pub mod logout;
pub use self::logout::logout;

// common functions for the handlers
use axum::{
    http::{header::LOCATION, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::error;

/// `302 Found` to `location`.
pub fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(LOCATION, value)]).into_response(),
        Err(err) => {
            error!("Invalid redirect location {location}: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
