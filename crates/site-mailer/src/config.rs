use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::MailerError;

pub const CLIENT_ID_VAR: &str = "GMAIL_CLIENT_ID";
pub const CLIENT_SECRET_VAR: &str = "GMAIL_CLIENT_SECRET";
pub const REFRESH_TOKEN_VAR: &str = "GMAIL_REFRESH_TOKEN";
pub const RECIPIENT_VAR: &str = "GMAIL_RECIPIENT_EMAIL";
pub const SENDER_VAR: &str = "GMAIL_SENDER_EMAIL";

pub const SETTINGS_SCHEMA_VERSION: u32 = 1;

pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const DEFAULT_PROFILE_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me/profile";
pub const DEFAULT_SEND_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me/messages/send";

/// Process-wide mailer configuration, built once at startup and shared by
/// every request.
#[derive(Clone, Default)]
pub struct MailerConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub recipient: Option<String>,
    pub sender: Option<String>,
    pub settings: MailerSettings,
}

impl MailerConfig {
    pub fn from_env(settings: MailerSettings) -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), settings)
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F, settings: MailerSettings) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| non_blank(lookup(key));
        Self {
            client_id: read(CLIENT_ID_VAR),
            client_secret: read(CLIENT_SECRET_VAR),
            refresh_token: read(REFRESH_TOKEN_VAR),
            recipient: read(RECIPIENT_VAR),
            sender: read(SENDER_VAR),
            settings,
        }
    }

    /// Value of a configuration variable by its environment name.
    pub fn get(&self, var: &str) -> Option<&str> {
        match var {
            CLIENT_ID_VAR => self.client_id.as_deref(),
            CLIENT_SECRET_VAR => self.client_secret.as_deref(),
            REFRESH_TOKEN_VAR => self.refresh_token.as_deref(),
            RECIPIENT_VAR => self.recipient.as_deref(),
            SENDER_VAR => self.sender.as_deref(),
            _ => None,
        }
    }

    pub fn missing(&self, required: &[&'static str]) -> Vec<&'static str> {
        required
            .iter()
            .copied()
            .filter(|var| self.get(var).is_none())
            .collect()
    }

    pub fn missing_credentials(&self) -> Vec<&'static str> {
        self.missing(&[CLIENT_ID_VAR, CLIENT_SECRET_VAR, REFRESH_TOKEN_VAR])
    }

    pub fn credentials(&self) -> Result<Credentials, MailerError> {
        match (&self.client_id, &self.client_secret, &self.refresh_token) {
            (Some(client_id), Some(client_secret), Some(refresh_token)) => Ok(Credentials {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                refresh_token: refresh_token.clone(),
            }),
            _ => Err(MailerError::Config {
                missing: self.missing_credentials(),
            }),
        }
    }

    pub fn configured_sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }
}

impl fmt::Debug for MailerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailerConfig")
            .field("client_id", &self.client_id.as_deref().map(mask_secret))
            .field(
                "client_secret",
                &self.client_secret.as_deref().map(mask_secret),
            )
            .field(
                "refresh_token",
                &self.refresh_token.as_deref().map(mask_secret),
            )
            .field("recipient", &self.recipient)
            .field("sender", &self.sender)
            .field("settings", &self.settings)
            .finish()
    }
}

/// OAuth2 client credentials plus the long-lived refresh token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &mask_secret(&self.client_id))
            .field("client_secret", &mask_secret(&self.client_secret))
            .field("refresh_token", &mask_secret(&self.refresh_token))
            .finish()
    }
}

/// First four characters followed by `***`; short values are fully masked.
pub fn mask_secret(value: &str) -> String {
    match value.char_indices().nth(4) {
        Some((idx, _)) => format!("{}***", &value[..idx]),
        None => "***".to_string(),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn default_schema_version() -> u32 {
    SETTINGS_SCHEMA_VERSION
}

fn default_site_name() -> String {
    "MathNuts".to_string()
}

fn default_support_contact() -> String {
    "mathnuts@googlegroups.com".to_string()
}

fn default_recipient() -> String {
    "mathnutscontroller@gmail.com".to_string()
}

/// Deployment settings read from an optional JSON file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MailerSettings {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default = "default_site_name")]
    pub site_name: String,
    #[serde(default = "default_support_contact")]
    pub support_contact: String,
    #[serde(default = "default_recipient")]
    pub default_recipient: String,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub public_base_url: Option<String>,
    #[serde(default)]
    pub http_timeout_secs: Option<u64>,
    #[serde(default)]
    pub enable_debug_status: bool,
    #[serde(default)]
    pub enable_oauth_bootstrap: bool,
    #[serde(default)]
    pub endpoints: GoogleEndpoints,
}

impl Default for MailerSettings {
    fn default() -> Self {
        Self {
            schema_version: SETTINGS_SCHEMA_VERSION,
            site_name: default_site_name(),
            support_contact: default_support_contact(),
            default_recipient: default_recipient(),
            environment: None,
            public_base_url: None,
            http_timeout_secs: None,
            enable_debug_status: false,
            enable_oauth_bootstrap: false,
            endpoints: GoogleEndpoints::default(),
        }
    }
}

impl MailerSettings {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let contents = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: MailerSettings =
            serde_json::from_str(&contents).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.schema_version != SETTINGS_SCHEMA_VERSION {
            return Err(SettingsError::UnsupportedSchemaVersion {
                expected: SETTINGS_SCHEMA_VERSION,
                got: self.schema_version,
            });
        }
        for (field, value) in [
            ("site_name", &self.site_name),
            ("support_contact", &self.support_contact),
            ("default_recipient", &self.default_recipient),
            ("endpoints.token_url", &self.endpoints.token_url),
            ("endpoints.auth_url", &self.endpoints.auth_url),
            ("endpoints.profile_url", &self.endpoints.profile_url),
            ("endpoints.send_url", &self.endpoints.send_url),
        ] {
            if value.trim().is_empty() {
                return Err(SettingsError::Empty { field });
            }
        }
        if let Some(base) = self.public_base_url.as_deref()
            && !(base.starts_with("http://") || base.starts_with("https://"))
        {
            return Err(SettingsError::PublicBaseUrl);
        }
        if self.http_timeout_secs == Some(0) {
            return Err(SettingsError::ZeroTimeout);
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Option<Duration> {
        self.http_timeout_secs.map(Duration::from_secs)
    }
}

fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.to_string()
}

fn default_auth_url() -> String {
    DEFAULT_AUTH_URL.to_string()
}

fn default_profile_url() -> String {
    DEFAULT_PROFILE_URL.to_string()
}

fn default_send_url() -> String {
    DEFAULT_SEND_URL.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GoogleEndpoints {
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_profile_url")]
    pub profile_url: String,
    #[serde(default = "default_send_url")]
    pub send_url: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            token_url: default_token_url(),
            auth_url: default_auth_url(),
            profile_url: default_profile_url(),
            send_url: default_send_url(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported schema version: expected {expected}, got {got}")]
    UnsupportedSchemaVersion { expected: u32, got: u32 },
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("public_base_url must be an absolute http(s) URL")]
    PublicBaseUrl,
    #[error("http_timeout_secs must be greater than zero")]
    ZeroTimeout,
}
