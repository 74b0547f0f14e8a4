//! OAuth2 authorization-code client.
//!
//! Built once from [`OAuthConfig`]; every token request goes through the HTTP
//! client handed in at construction, which trusts the configured private CA.

use super::config::{AuthStyle, OAuthConfig};
use reqwest::{header::CONTENT_TYPE, Client, Response, StatusCode};
use secrecy::ExposeSecret;
use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, instrument};
use url::{form_urlencoded, Url};

/// Largest token endpoint response body that will be read.
pub const MAX_TOKEN_RESPONSE_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("token request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("token endpoint returned {status}: {error}{}", describe(.description.as_deref()))]
    Status {
        status: StatusCode,
        error: String,
        description: Option<String>,
    },
    #[error("malformed token response: {0}")]
    Payload(String),
}

fn describe(description: Option<&str>) -> String {
    description.map_or_else(String::new, |d| format!(" ({d})"))
}

/// Token set returned by the provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(
        default,
        deserialize_with = "seconds_or_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Some providers send `expires_in` as a quoted number.
fn seconds_or_string<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(u64),
        Text(String),
    }

    match Option::<Seconds>::deserialize(deserializer)? {
        Some(Seconds::Number(seconds)) => Ok(Some(seconds)),
        Some(Seconds::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(Seconds::Text(text)) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("invalid expires_in: {text}"))),
        None => Ok(None),
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_in", &self.expires_in)
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
    error_description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OAuthClient {
    config: OAuthConfig,
    http: Client,
}

impl OAuthClient {
    #[must_use]
    pub fn new(config: OAuthConfig, http: Client) -> Self {
        Self { config, http }
    }

    #[must_use]
    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Authorization endpoint URL for the given state. No network access.
    ///
    /// Scopes are joined with a single space, encoded as `%20`.
    #[must_use]
    pub fn authorization_url(&self, state: &str) -> Url {
        let ours = form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.config.redirect_url.as_str())
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("response_type", "code")
            .append_pair("state", state)
            .finish()
            // form encoding renders spaces as '+', a literal '+' is already %2B
            .replace('+', "%20");

        let mut url = self.config.authorize_url.clone();
        let query = match url.query() {
            Some(existing) if !existing.is_empty() => format!("{existing}&{ours}"),
            _ => ours,
        };
        url.set_query(Some(&query));
        url
    }

    /// Exchange an authorization code for a token set.
    ///
    /// `state` is only recorded on the tracing span; callers validate it
    /// before calling.
    ///
    /// # Errors
    /// Fails on transport errors, non-success responses and payloads without an
    /// access token.
    #[instrument(skip(self, code), fields(token_url = %self.config.token_url))]
    pub async fn exchange_code(&self, code: &str, state: &str) -> Result<Token, ExchangeError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_url.as_str()),
        ];

        let mut request = self.http.post(self.config.token_url.clone());
        match self.config.auth_style {
            AuthStyle::Header => {
                request = request.basic_auth(
                    form_escape(&self.config.client_id),
                    Some(form_escape(self.config.client_secret.expose_secret())),
                );
            }
            AuthStyle::Params => {
                form.push(("client_id", self.config.client_id.as_str()));
                form.push(("client_secret", self.config.client_secret.expose_secret()));
            }
        }

        let response = request
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(ExchangeError::Transport)?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = read_body(response).await?;

        debug!(%status, "token endpoint responded");

        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        parse_token(&content_type, &body)
    }
}

async fn read_body(mut response: Response) -> Result<Vec<u8>, ExchangeError> {
    let limit = MAX_TOKEN_RESPONSE_BYTES;
    let too_large = || ExchangeError::Payload(format!("token response exceeds {limit} bytes"));

    if response
        .content_length()
        .is_some_and(|length| length > limit as u64)
    {
        return Err(too_large());
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(ExchangeError::Transport)? {
        if body.len() + chunk.len() > limit {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

fn form_escape(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn status_error(status: StatusCode, body: &[u8]) -> ExchangeError {
    match serde_json::from_slice::<ErrorResponse>(body) {
        Ok(err) => ExchangeError::Status {
            status,
            error: err.error,
            description: err.error_description,
        },
        Err(_) => {
            let text = String::from_utf8_lossy(body);
            ExchangeError::Status {
                status,
                error: text.chars().take(256).collect(),
                description: None,
            }
        }
    }
}

fn parse_token(content_type: &str, body: &[u8]) -> Result<Token, ExchangeError> {
    let token = if content_type.starts_with("application/x-www-form-urlencoded")
        || content_type.starts_with("text/plain")
    {
        token_from_form(body)?
    } else {
        serde_json::from_slice::<Token>(body)
            .map_err(|err| ExchangeError::Payload(err.to_string()))?
    };

    if token.access_token.is_empty() {
        return Err(ExchangeError::Payload(
            "server response missing access_token".to_string(),
        ));
    }
    Ok(token)
}

fn token_from_form(body: &[u8]) -> Result<Token, ExchangeError> {
    let mut token = Token {
        access_token: String::new(),
        token_type: default_token_type(),
        refresh_token: None,
        expires_in: None,
        id_token: None,
    };
    for (key, value) in form_urlencoded::parse(body) {
        match key.as_ref() {
            "access_token" => token.access_token = value.into_owned(),
            "token_type" => token.token_type = value.into_owned(),
            "refresh_token" => token.refresh_token = Some(value.into_owned()),
            "id_token" => token.id_token = Some(value.into_owned()),
            "expires_in" => {
                token.expires_in = Some(value.parse().map_err(|_| {
                    ExchangeError::Payload(format!("invalid expires_in: {value}"))
                })?);
            }
            "error" => {
                return Err(ExchangeError::Payload(format!(
                    "token endpoint error: {value}"
                )))
            }
            _ => {}
        }
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn config() -> OAuthConfig {
        OAuthConfig {
            client_id: "gangway".to_string(),
            client_secret: SecretString::from("s3cret".to_string()),
            redirect_url: Url::parse("https://gangway.test/callback").unwrap(),
            scopes: vec!["openid".to_string(), "profile".to_string()],
            authorize_url: Url::parse("https://idp/auth").unwrap(),
            token_url: Url::parse("https://idp/token").unwrap(),
            auth_style: AuthStyle::Header,
        }
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn authorization_url_embeds_parameters_in_order() {
        let client = OAuthClient::new(config(), Client::new());
        let url = client.authorization_url("nonce-123");
        assert_eq!(
            url.as_str(),
            "https://idp/auth?client_id=gangway&redirect_uri=https%3A%2F%2Fgangway.test%2Fcallback&scope=openid%20profile&response_type=code&state=nonce-123"
        );
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn authorization_url_is_deterministic_and_keeps_existing_query() {
        let mut cfg = config();
        cfg.authorize_url = Url::parse("https://idp/auth?prompt=login").unwrap();
        let client = OAuthClient::new(cfg, Client::new());
        let first = client.authorization_url("abc");
        let second = client.authorization_url("abc");
        assert_eq!(first, second);
        assert!(first.as_str().starts_with("https://idp/auth?prompt=login&client_id=gangway&"));
        assert!(first.as_str().ends_with("&state=abc"));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn parse_json_token() {
        let body = br#"{"access_token":"at","token_type":"bearer","expires_in":3600,"id_token":"a.b.c","refresh_token":"rt"}"#;
        let token = parse_token("application/json", body).unwrap();
        assert_eq!(token.access_token, "at");
        assert_eq!(token.expires_in, Some(3600));
        assert_eq!(token.id_token.as_deref(), Some("a.b.c"));
        assert_eq!(token.refresh_token.as_deref(), Some("rt"));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn parse_json_token_with_quoted_expires_in() {
        let token =
            parse_token("application/json", br#"{"access_token":"at","expires_in":"3600"}"#)
                .unwrap();
        assert_eq!(token.expires_in, Some(3600));

        let token =
            parse_token("application/json", br#"{"access_token":"at","expires_in":""}"#).unwrap();
        assert_eq!(token.expires_in, None);

        let result =
            parse_token("application/json", br#"{"access_token":"at","expires_in":"soon"}"#);
        assert!(matches!(result, Err(ExchangeError::Payload(_))));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn parse_form_token() {
        let token =
            parse_token("application/x-www-form-urlencoded", b"access_token=at&expires_in=60")
                .unwrap();
        assert_eq!(token.access_token, "at");
        assert_eq!(token.token_type, "Bearer");
        assert_eq!(token.expires_in, Some(60));
    }

    #[test]
    fn parse_rejects_missing_access_token() {
        let result = parse_token("application/json", br#"{"token_type":"bearer"}"#);
        assert!(matches!(result, Err(ExchangeError::Payload(_))));

        let result = parse_token("application/json", br#"{"access_token":""}"#);
        assert!(matches!(result, Err(ExchangeError::Payload(_))));

        let result = parse_token("application/json", b"<html>oops</html>");
        assert!(matches!(result, Err(ExchangeError::Payload(_))));
    }

    #[test]
    fn status_error_reads_oauth_error_body() {
        let err = status_error(
            StatusCode::BAD_REQUEST,
            br#"{"error":"invalid_grant","error_description":"code already used"}"#,
        );
        assert_eq!(
            err.to_string(),
            "token endpoint returned 400 Bad Request: invalid_grant (code already used)"
        );

        let err = status_error(StatusCode::BAD_GATEWAY, b"upstream down");
        assert_eq!(
            err.to_string(),
            "token endpoint returned 502 Bad Gateway: upstream down"
        );
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn oversized_token_response_is_rejected() {
        let idp = MockServer::start().await;
        let padding = "x".repeat(MAX_TOKEN_RESPONSE_BYTES);
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                format!(r#"{{"access_token":"at","padding":"{padding}"}}"#),
                "application/json",
            ))
            .mount(&idp)
            .await;

        let mut cfg = config();
        cfg.token_url = Url::parse(&format!("{}/token", idp.uri())).unwrap();
        let client = OAuthClient::new(cfg, Client::new());

        let result = client.exchange_code("code", "state").await;
        assert!(
            matches!(&result, Err(ExchangeError::Payload(msg)) if msg.contains("exceeds")),
            "unexpected result: {result:?}"
        );
    }

    #[test]
    fn token_debug_is_redacted() {
        let token = Token {
            access_token: "very-secret".to_string(),
            token_type: "Bearer".to_string(),
            refresh_token: Some("also-secret".to_string()),
            expires_in: None,
            id_token: None,
        };
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("very-secret"));
        assert!(!rendered.contains("also-secret"));
    }
}
