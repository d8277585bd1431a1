//! OAuth2 token exchange against Google's token endpoint.

use std::fmt;

use serde::Deserialize;
use tracing::debug;
use urlencoding::encode as url_encode;

use crate::config::{Credentials, mask_secret};
use crate::error::MailerError;
use crate::http::{HttpClient, HttpError, HttpRequest, HttpResponse};

pub const GMAIL_SEND_SCOPE: &str = "https://www.googleapis.com/auth/gmail.send";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
/// Refresh tokens may rotate and access tokens expire quickly, so every
/// exchange must reach the provider.
const NO_STORE: &str = "no-cache, no-store";

/// Short-lived bearer credential, valid for one submission.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken({})", mask_secret(&self.0))
    }
}

/// Result of the authorization-code grant used to mint a refresh token.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: AccessToken,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

pub fn form_encode(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| format!("{}={}", url_encode(key), url_encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Raw refresh-token request; callers decide what a non-2xx status means.
pub fn request_refresh(
    client: &dyn HttpClient,
    token_url: &str,
    credentials: &Credentials,
) -> Result<HttpResponse, HttpError> {
    let body = form_encode(&[
        ("client_id", &credentials.client_id),
        ("client_secret", &credentials.client_secret),
        ("refresh_token", &credentials.refresh_token),
        ("grant_type", "refresh_token"),
    ]);
    let request =
        HttpRequest::post(token_url, FORM_CONTENT_TYPE, body).with_header("Cache-Control", NO_STORE);
    client.send(&request)
}

/// Trade the long-lived refresh token for an access token.
pub fn exchange_refresh_token(
    client: &dyn HttpClient,
    token_url: &str,
    credentials: &Credentials,
) -> Result<AccessToken, MailerError> {
    for (name, value) in [
        ("client_id", &credentials.client_id),
        ("client_secret", &credentials.client_secret),
        ("refresh_token", &credentials.refresh_token),
    ] {
        if value.trim().is_empty() {
            return Err(MailerError::auth(format!("missing credential: {name}")));
        }
    }
    debug!("exchanging refresh token for access token");
    let resp = request_refresh(client, token_url, credentials)
        .map_err(|err| MailerError::auth(format!("token exchange error: {err}")))?;
    parse_token_response(&resp).map(|grant| grant.access_token)
}

/// Authorization-code grant for the one-time OAuth bootstrap.
pub fn exchange_authorization_code(
    client: &dyn HttpClient,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
    code: &str,
    redirect_uri: &str,
) -> Result<TokenGrant, MailerError> {
    let body = form_encode(&[
        ("client_id", client_id),
        ("client_secret", client_secret),
        ("code", code),
        ("redirect_uri", redirect_uri),
        ("grant_type", "authorization_code"),
    ]);
    let request =
        HttpRequest::post(token_url, FORM_CONTENT_TYPE, body).with_header("Cache-Control", NO_STORE);
    let resp = client
        .send(&request)
        .map_err(|err| MailerError::auth(format!("code exchange error: {err}")))?;
    parse_token_response(&resp)
}

fn parse_token_response(resp: &HttpResponse) -> Result<TokenGrant, MailerError> {
    if !resp.is_success() {
        return Err(MailerError::auth(format!(
            "token endpoint returned status {} body={}",
            resp.status,
            resp.truncated_text()
        )));
    }
    let parsed: TokenResponse = serde_json::from_slice(&resp.body)
        .map_err(|err| MailerError::auth(format!("invalid token response: {err}")))?;
    let access_token = parsed
        .access_token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| MailerError::auth("token response missing access_token"))?;
    Ok(TokenGrant {
        access_token: AccessToken(access_token),
        refresh_token: parsed.refresh_token.filter(|token| !token.is_empty()),
    })
}

/// Consent-screen URL that yields an offline (refresh-token) grant.
pub fn authorization_url(auth_url: &str, client_id: &str, redirect_uri: &str, state: &str) -> String {
    let query = form_encode(&[
        ("client_id", client_id),
        ("redirect_uri", redirect_uri),
        ("response_type", "code"),
        ("scope", GMAIL_SEND_SCOPE),
        ("access_type", "offline"),
        ("prompt", "consent"),
        ("include_granted_scopes", "true"),
        ("state", state),
    ]);
    format!("{auth_url}?{query}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::RecordingClient;
    use serde_json::json;

    fn creds() -> Credentials {
        Credentials {
            client_id: "client id".into(),
            client_secret: "s&cret".into(),
            refresh_token: "1//refresh".into(),
        }
    }

    #[test]
    fn posts_refresh_grant_and_returns_token() {
        let client = RecordingClient::with_responses([HttpResponse::json(
            200,
            &json!({"access_token": "ya29.token", "expires_in": 3599}),
        )]);
        let token = exchange_refresh_token(&client, "https://token.invalid", &creds()).unwrap();
        assert_eq!(token.secret(), "ya29.token");

        let calls = client.calls();
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert_eq!(call.method, "POST");
        assert_eq!(
            call.header("content-type"),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(call.header("cache-control"), Some(NO_STORE));
        assert_eq!(
            call.body_text().unwrap(),
            "client_id=client%20id&client_secret=s%26cret&refresh_token=1%2F%2Frefresh&grant_type=refresh_token"
        );
    }

    #[test]
    fn non_success_status_is_auth_error() {
        let client = RecordingClient::with_responses([HttpResponse::json(
            400,
            &json!({"error": "invalid_grant"}),
        )]);
        let err = exchange_refresh_token(&client, "https://token.invalid", &creds()).unwrap_err();
        assert_eq!(err.kind(), "auth");
        assert!(err.to_string().contains("invalid_grant"));
    }

    #[test]
    fn missing_access_token_is_auth_error() {
        let client =
            RecordingClient::with_responses([HttpResponse::json(200, &json!({"access_token": ""}))]);
        let err = exchange_refresh_token(&client, "https://token.invalid", &creds()).unwrap_err();
        assert_eq!(
            err,
            MailerError::Auth("token response missing access_token".into())
        );
    }

    #[test]
    fn transport_failure_is_auth_error() {
        let client = RecordingClient::new();
        let err = exchange_refresh_token(&client, "https://token.invalid", &creds()).unwrap_err();
        assert_eq!(err.kind(), "auth");
    }

    #[test]
    fn blank_credential_fails_before_network() {
        let client = RecordingClient::new();
        let mut blank = creds();
        blank.client_secret = " ".into();
        let err = exchange_refresh_token(&client, "https://token.invalid", &blank).unwrap_err();
        assert_eq!(
            err,
            MailerError::Auth("missing credential: client_secret".into())
        );
        assert!(client.calls().is_empty());
    }

    #[test]
    fn code_grant_returns_optional_refresh_token() {
        let client = RecordingClient::with_responses([
            HttpResponse::json(200, &json!({"access_token": "a", "refresh_token": "1//r"})),
            HttpResponse::json(200, &json!({"access_token": "b"})),
        ]);
        let first = exchange_authorization_code(
            &client,
            "https://token.invalid",
            "id",
            "secret",
            "4/code",
            "https://site.example/cb",
        )
        .unwrap();
        assert_eq!(first.refresh_token.as_deref(), Some("1//r"));
        let second = exchange_authorization_code(
            &client,
            "https://token.invalid",
            "id",
            "secret",
            "4/code",
            "https://site.example/cb",
        )
        .unwrap();
        assert!(second.refresh_token.is_none());
        let body = client.calls()[0].body_text().unwrap();
        assert!(body.contains("grant_type=authorization_code"));
        assert!(body.contains("redirect_uri=https%3A%2F%2Fsite.example%2Fcb"));
    }

    #[test]
    fn authorization_url_requests_offline_send_scope() {
        let url = authorization_url(
            "https://accounts.invalid/auth",
            "id",
            "https://site.example/cb",
            "st4te",
        );
        assert!(url.starts_with("https://accounts.invalid/auth?client_id=id&"));
        assert!(url.contains("scope=https%3A%2F%2Fwww.googleapis.com%2Fauth%2Fgmail.send"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains("state=st4te"));
    }

    #[test]
    fn debug_masks_access_token() {
        let token = AccessToken::new("ya29.very-secret");
        assert_eq!(format!("{token:?}"), "AccessToken(ya29***)");
    }
}
