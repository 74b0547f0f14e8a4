//! Browser sessions carried in an encrypted cookie.
//!
//! A session is either *pending* (a login is in flight and a state nonce is
//! outstanding) or *authenticated* (the code exchange succeeded). Sessions are
//! never edited in place: every transition writes a whole new cookie.
//!
//! Only this module interprets cookie contents. Anything that fails to decode
//! or verify is treated as "no session".

use super::{config::SessionConfig, identity::Identity, oauth::Token};
use anyhow::{anyhow, Result};
use axum::http::{
    header::{InvalidHeaderValue, COOKIE},
    HeaderMap, HeaderValue,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use cookie::{Cookie, CookieJar, Key};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};
use thiserror::Error;
use tracing::debug;

pub const SESSION_COOKIE_NAME: &str = "gangway_session";
pub const MIN_SESSION_KEY_LEN: usize = 32;
/// Browsers drop cookies whose `name=value` exceeds this many bytes.
pub const MAX_COOKIE_BYTES: usize = 4096;
const NONCE_BYTES: usize = 32;
const CLEAR_COOKIE: &str = "gangway_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0";
const CLEAR_COOKIE_SECURE: &str =
    "gangway_session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0; Secure";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to serialize session: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("session cookie failed verification")]
    Verify,
    #[error("invalid cookie header: {0}")]
    Header(#[from] InvalidHeaderValue),
    #[error("session cookie is {0} bytes, browsers accept at most {MAX_COOKIE_BYTES}")]
    TooLarge(usize),
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Session {
    Pending { state: String, issued_at: u64 },
    Authenticated(AuthenticatedSession),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedSession {
    pub identity: Identity,
    pub token: Token,
    pub issued_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

/// Turns a session into an opaque cookie value and back.
pub trait SessionCodec: Send + Sync {
    /// # Errors
    /// Returns an error if the session cannot be serialized.
    fn encode(&self, session: &Session) -> Result<String, SessionError>;

    /// # Errors
    /// Returns an error if the value was not produced by this codec or was tampered with.
    fn decode(&self, value: &str) -> Result<Session, SessionError>;
}

/// Authenticated encryption of the session using the `cookie` crate's private jar.
pub struct PrivateCookieCodec {
    key: Key,
}

impl PrivateCookieCodec {
    #[must_use]
    pub fn new(key: Key) -> Self {
        Self { key }
    }

    /// Derive the cookie key from a configured secret.
    ///
    /// # Errors
    /// Returns an error if the secret is shorter than [`MIN_SESSION_KEY_LEN`] bytes.
    pub fn from_secret(secret: &SecretString) -> Result<Self> {
        let bytes = secret.expose_secret().as_bytes();
        if bytes.len() < MIN_SESSION_KEY_LEN {
            return Err(anyhow!(
                "session key must be at least {MIN_SESSION_KEY_LEN} bytes, got {}",
                bytes.len()
            ));
        }
        Ok(Self::new(Key::derive_from(bytes)))
    }

    #[must_use]
    pub fn generate() -> Self {
        Self::new(Key::generate())
    }
}

impl SessionCodec for PrivateCookieCodec {
    fn encode(&self, session: &Session) -> Result<String, SessionError> {
        let payload = serde_json::to_string(session)?;
        let mut jar = CookieJar::new();
        jar.private_mut(&self.key)
            .add(Cookie::new(SESSION_COOKIE_NAME, payload));
        jar.get(SESSION_COOKIE_NAME)
            .map(|cookie| cookie.value().to_string())
            .ok_or(SessionError::Verify)
    }

    fn decode(&self, value: &str) -> Result<Session, SessionError> {
        let mut jar = CookieJar::new();
        jar.add_original(Cookie::new(SESSION_COOKIE_NAME, value.to_string()));
        let cookie = jar
            .private(&self.key)
            .get(SESSION_COOKIE_NAME)
            .ok_or(SessionError::Verify)?;
        Ok(serde_json::from_str(cookie.value())?)
    }
}

/// Outstanding state nonces, kept in-process so a replayed pre-login cookie
/// cannot redeem the same nonce twice.
#[derive(Default)]
struct NonceRegistry {
    issued: Mutex<HashMap<String, Instant>>,
}

impl NonceRegistry {
    fn record(&self, nonce: &str, ttl: Duration) {
        let now = Instant::now();
        let mut issued = self.issued.lock().unwrap_or_else(PoisonError::into_inner);
        issued.retain(|_, deadline| *deadline > now);
        issued.insert(nonce.to_string(), now + ttl);
    }

    fn consume(&self, nonce: &str) -> bool {
        let mut issued = self.issued.lock().unwrap_or_else(PoisonError::into_inner);
        issued
            .remove(nonce)
            .is_some_and(|deadline| deadline > Instant::now())
    }

    fn len(&self) -> usize {
        self.issued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// A freshly issued login nonce plus the cookie that binds it to the browser.
pub struct LoginState {
    pub nonce: String,
    pub cookie: HeaderValue,
}

pub struct SessionManager {
    codec: Arc<dyn SessionCodec>,
    nonces: NonceRegistry,
    ttl: Duration,
    login_ttl: Duration,
    secure: bool,
}

impl SessionManager {
    #[must_use]
    pub fn new(codec: Arc<dyn SessionCodec>, config: &SessionConfig) -> Self {
        Self {
            codec,
            nonces: NonceRegistry::default(),
            ttl: config.ttl,
            login_ttl: config.login_ttl,
            secure: config.secure_cookies,
        }
    }

    /// Issue an unguessable state nonce bound to a new pending session.
    ///
    /// # Errors
    /// Returns an error if the pending session cannot be encoded.
    pub fn new_login_state(&self) -> Result<LoginState, SessionError> {
        let nonce = generate_nonce();
        let session = Session::Pending {
            state: nonce.clone(),
            issued_at: unix_now(),
        };
        let cookie = self.cookie(&self.codec.encode(&session)?, self.login_ttl)?;
        self.nonces.record(&nonce, self.login_ttl);
        Ok(LoginState { nonce, cookie })
    }

    /// Check the supplied state against the browser's pending session and burn
    /// the nonce on success. Returns `false` on any mismatch or absence.
    pub fn validate_and_consume_state(&self, headers: &HeaderMap, supplied: &str) -> bool {
        let Some(Session::Pending { state, .. }) = self.load(headers) else {
            debug!("No pending login for this browser");
            return false;
        };
        if state != supplied {
            debug!("State parameter does not match the pending login");
            return false;
        }
        self.nonces.consume(&state)
    }

    /// Build the cookie for a freshly authenticated session.
    ///
    /// The access token is only kept when there is no ID token, since issued
    /// credentials never use both. An `expires_in` of zero means the provider
    /// set no expiry.
    ///
    /// # Errors
    /// Returns an error if the session cannot be encoded or the resulting cookie
    /// is larger than [`MAX_COOKIE_BYTES`].
    pub fn establish_session(
        &self,
        identity: Identity,
        mut token: Token,
    ) -> Result<HeaderValue, SessionError> {
        if token.id_token.is_some() {
            token.access_token.clear();
        }
        let issued_at = unix_now();
        let expires_at = token
            .expires_in
            .filter(|seconds| *seconds > 0)
            .map(|seconds| issued_at.saturating_add(seconds));
        let session = Session::Authenticated(AuthenticatedSession {
            identity,
            token,
            issued_at,
            expires_at,
        });
        self.cookie(&self.codec.encode(&session)?, self.ttl)
    }

    /// The authenticated session, if the cookie is valid and neither the
    /// session lifetime nor the provider token has expired.
    #[must_use]
    pub fn current(&self, headers: &HeaderMap) -> Option<AuthenticatedSession> {
        let Some(Session::Authenticated(session)) = self.load(headers) else {
            return None;
        };
        let now = unix_now();
        if now >= session.issued_at.saturating_add(self.ttl.as_secs()) {
            debug!("Session lifetime exceeded");
            return None;
        }
        if session.expires_at.is_some_and(|expires_at| now >= expires_at) {
            debug!("Provider token expired");
            return None;
        }
        Some(session)
    }

    #[must_use]
    pub fn is_authenticated(&self, headers: &HeaderMap) -> bool {
        self.current(headers).is_some()
    }

    /// Cookie that clears the session in the browser.
    #[must_use]
    pub fn destroy(&self) -> HeaderValue {
        HeaderValue::from_static(if self.secure {
            CLEAR_COOKIE_SECURE
        } else {
            CLEAR_COOKIE
        })
    }

    #[must_use]
    pub fn outstanding_nonces(&self) -> usize {
        self.nonces.len()
    }

    fn load(&self, headers: &HeaderMap) -> Option<Session> {
        let value = extract_session_cookie(headers)?;
        match self.codec.decode(&value) {
            Ok(session) => Some(session),
            Err(err) => {
                debug!("Ignoring session cookie: {err}");
                None
            }
        }
    }

    fn cookie(&self, value: &str, max_age: Duration) -> Result<HeaderValue, SessionError> {
        let size = SESSION_COOKIE_NAME.len() + 1 + value.len();
        if size > MAX_COOKIE_BYTES {
            return Err(SessionError::TooLarge(size));
        }
        let mut cookie = format!(
            "{SESSION_COOKIE_NAME}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            max_age.as_secs()
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        Ok(HeaderValue::from_str(&cookie)?)
    }
}

fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    Base64UrlUnpadded::encode_string(&bytes)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

fn extract_session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (key, val) = pair.trim().split_once('=')?;
            (key.trim() == SESSION_COOKIE_NAME && !val.trim().is_empty())
                .then(|| val.trim().to_string())
        })
}
