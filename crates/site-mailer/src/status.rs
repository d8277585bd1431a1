//! Operator-facing report on the mail configuration and a live token check.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::auth::request_refresh;
use crate::config::MailerConfig;
use crate::http::HttpClient;

pub const NOT_SET: &str = "NOT_SET";
pub const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailStatus {
    pub timestamp: String,
    pub environment: String,
    pub variables: StatusVariables,
    pub all_variables_set: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_test: Option<TokenTest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusVariables {
    #[serde(rename = "GMAIL_CLIENT_ID")]
    pub client_id: SecretPresence,
    #[serde(rename = "GMAIL_CLIENT_SECRET")]
    pub client_secret: SecretPresence,
    #[serde(rename = "GMAIL_REFRESH_TOKEN")]
    pub refresh_token: SecretPresence,
    #[serde(rename = "GMAIL_RECIPIENT_EMAIL")]
    pub recipient: AddressPresence,
    #[serde(rename = "GMAIL_SENDER_EMAIL")]
    pub sender: AddressPresence,
}

/// Secrets report presence and length only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecretPresence {
    pub exists: bool,
    pub length: usize,
}

impl SecretPresence {
    fn of(value: Option<&str>) -> Self {
        Self {
            exists: value.is_some(),
            length: value.map(|v| v.chars().count()).unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressPresence {
    pub exists: bool,
    pub value: String,
}

impl AddressPresence {
    fn of(value: Option<&str>) -> Self {
        Self {
            exists: value.is_some(),
            value: value.unwrap_or(NOT_SET).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenTest {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn email_status(config: &MailerConfig, client: &dyn HttpClient) -> EmailStatus {
    email_status_at(config, client, Utc::now())
}

pub fn email_status_at(
    config: &MailerConfig,
    client: &dyn HttpClient,
    now: DateTime<Utc>,
) -> EmailStatus {
    let credentials = config.credentials().ok();
    let token_test = credentials.as_ref().map(|credentials| {
        match request_refresh(client, &config.settings.endpoints.token_url, credentials) {
            Ok(resp) => TokenTest {
                success: resp.is_success(),
                status: Some(resp.status),
                error: (!resp.is_success()).then(|| resp.truncated_text()),
            },
            Err(err) => TokenTest {
                success: false,
                status: None,
                error: Some(err.to_string()),
            },
        }
    });

    EmailStatus {
        timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        environment: config
            .settings
            .environment
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        variables: StatusVariables {
            client_id: SecretPresence::of(config.client_id.as_deref()),
            client_secret: SecretPresence::of(config.client_secret.as_deref()),
            refresh_token: SecretPresence::of(config.refresh_token.as_deref()),
            recipient: AddressPresence::of(config.recipient.as_deref()),
            sender: AddressPresence::of(config.sender.as_deref()),
        },
        all_variables_set: credentials.is_some(),
        token_test,
    }
}
