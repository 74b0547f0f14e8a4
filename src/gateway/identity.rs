//! Identity claims read from the provider's ID token.
//!
//! Only the payload segment is decoded. The token arrived over the trusted back
//! channel in direct response to our code exchange, so the signature is not
//! checked again here.

use base64ct::{Base64UrlUnpadded, Encoding};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
}

impl Identity {
    /// Extract the identity from an ID token; missing or unreadable tokens
    /// yield an empty identity.
    #[must_use]
    pub fn from_id_token(id_token: Option<&str>, username_claim: &str, email_claim: &str) -> Self {
        let Some(claims) = id_token.and_then(decode_claims) else {
            return Self::default();
        };

        Self {
            username: claim(&claims, username_claim),
            email: claim(&claims, email_claim),
            issuer: claim(&claims, "iss"),
        }
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        self.username
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or("oidc-user")
    }
}

fn decode_claims(token: &str) -> Option<Map<String, Value>> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_)) => payload.trim_end_matches('='),
        _ => {
            debug!("ID token is not a compact JWS");
            return None;
        }
    };

    let bytes = match Base64UrlUnpadded::decode_vec(payload) {
        Ok(bytes) => bytes,
        Err(err) => {
            debug!("ID token payload is not base64url: {err}");
            return None;
        }
    };

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(claims)) => Some(claims),
        Ok(_) => None,
        Err(err) => {
            debug!("ID token payload is not JSON: {err}");
            None
        }
    }
}

fn claim(claims: &Map<String, Value>, name: &str) -> Option<String> {
    match claims.get(name)? {
        Value::String(value) if !value.is_empty() => Some(value.clone()),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    }
}
