//! One-time authorization-code flow an operator runs to mint the refresh token.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use site_mailer::MailerSettings;
use site_mailer::auth::{authorization_url, exchange_authorization_code};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{AppState, OAUTH_CALLBACK_PATH, OAUTH_START_PATH, json_error};

pub const STATE_COOKIE: &str = "google_oauth_state";
const STATE_MAX_AGE_SECS: u32 = 600;
const PERMISSIONS_URL: &str = "https://myaccount.google.com/permissions";

pub async fn start(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(client_id) = state.config.client_id.as_deref() else {
        return json_error(StatusCode::INTERNAL_SERVER_ERROR, "Missing GMAIL_CLIENT_ID");
    };
    let settings = &state.config.settings;
    let redirect_uri = format!("{}{OAUTH_CALLBACK_PATH}", origin(settings, &headers));
    let nonce = Uuid::new_v4().to_string();
    let location = authorization_url(&settings.endpoints.auth_url, client_id, &redirect_uri, &nonce);
    info!(redirect_uri = %redirect_uri, "starting oauth consent flow");
    (
        StatusCode::TEMPORARY_REDIRECT,
        [
            (header::LOCATION, location),
            (header::SET_COOKIE, state_cookie(&nonce, STATE_MAX_AGE_SECS)),
        ],
    )
        .into_response()
}

pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let (Some(client_id), Some(client_secret)) = (
        state.config.client_id.clone(),
        state.config.client_secret.clone(),
    ) else {
        return json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Missing GMAIL_CLIENT_ID or GMAIL_CLIENT_SECRET",
        );
    };

    let code = params.get("code").filter(|v| !v.is_empty());
    let returned = params.get("state").filter(|v| !v.is_empty());
    let saved = cookie_value(&headers, STATE_COOKIE);
    let (Some(code), Some(returned), Some(saved)) = (code, returned, saved) else {
        warn!("oauth callback without code, state or state cookie");
        return json_error(StatusCode::BAD_REQUEST, "Invalid or missing OAuth state/code");
    };
    if *returned != saved {
        warn!("oauth callback state mismatch");
        return json_error(StatusCode::BAD_REQUEST, "Invalid or missing OAuth state/code");
    }

    let origin = origin(&state.config.settings, &headers);
    let redirect_uri = format!("{origin}{OAUTH_CALLBACK_PATH}");
    let token_url = state.config.settings.endpoints.token_url.clone();
    let client = state.client.clone();
    let code = code.clone();
    let exchanged = tokio::task::spawn_blocking(move || {
        exchange_authorization_code(
            client.as_ref(),
            &token_url,
            &client_id,
            &client_secret,
            &code,
            &redirect_uri,
        )
    })
    .await;

    let clear = [(header::SET_COOKIE, state_cookie("", 0))];
    let grant = match exchanged {
        Ok(Ok(grant)) => grant,
        Ok(Err(err)) => {
            error!(error = %err, "authorization code exchange failed");
            let body = json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to exchange code: {err}"),
            );
            return (clear, body).into_response();
        }
        Err(err) => {
            error!(error = %err, "authorization code worker failed");
            let body = json_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to exchange code");
            return (clear, body).into_response();
        }
    };

    let page = match grant.refresh_token.as_deref() {
        Some(refresh_token) => {
            info!("oauth flow returned a refresh token");
            refresh_token_page(refresh_token)
        }
        None => {
            warn!("oauth flow returned no refresh token");
            no_refresh_token_page(&origin)
        }
    };
    (clear, Html(page)).into_response()
}

/// Configured public origin, else `http://` plus the request's Host header.
pub fn origin(settings: &MailerSettings, headers: &HeaderMap) -> String {
    if let Some(base) = settings.public_base_url.as_deref() {
        return base.trim_end_matches('/').to_string();
    }
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{host}")
}

fn state_cookie(value: &str, max_age: u32) -> String {
    format!("{STATE_COOKIE}={value}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={max_age}")
}

pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

fn page_shell(title: &str, content: &str) -> String {
    format!(
        r#"<!doctype html>
<html>
  <head><meta charset="utf-8"><title>{title}</title></head>
  <body style="font-family: system-ui, -apple-system, Segoe UI, Roboto, Helvetica, Arial;">
    <main style="max-width:680px;margin:40px auto;padding:0 16px;">
{content}
    </main>
  </body>
</html>
"#
    )
}

fn refresh_token_page(refresh_token: &str) -> String {
    let token = htmlescape::encode_minimal(refresh_token);
    page_shell(
        "Google OAuth - Refresh Token",
        &format!(
            r#"      <h1>Copy your refresh token</h1>
      <p>Set this value in the server environment:</p>
      <pre style="white-space:pre-wrap;word-break:break-all;background:#f6f8fa;border:1px solid #e5e7eb;border-radius:8px;padding:12px;">GMAIL_REFRESH_TOKEN={token}</pre>
      <p>Restart the server after saving it. Form submissions will then be sent through Gmail.</p>"#
        ),
    )
}

fn no_refresh_token_page(origin: &str) -> String {
    let retry = htmlescape::encode_minimal(&format!("{origin}{OAUTH_START_PATH}"));
    page_shell(
        "Google OAuth - No Refresh Token",
        &format!(
            r#"      <h1>No refresh token returned</h1>
      <p>Google did not return a refresh_token. This usually means the account approved this app before without a fresh consent screen.</p>
      <ol>
        <li>Remove the app's access at <a href="{PERMISSIONS_URL}" target="_blank">Google Account &gt; Security &gt; Third-party access</a>.</li>
        <li>Try again: <a href="{retry}">{retry}</a></li>
      </ol>"#
        ),
    )
}
