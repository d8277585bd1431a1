pub mod extract;
pub mod routes;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use site_mailer::{HttpClient, MailerConfig, UreqClient};

/// Request bodies above this are refused before parsing. Kept above the
/// attachment limit so oversized PDFs still get a validation message.
pub const MAX_BODY_BYTES: usize = 12 * 1024 * 1024;

pub const APPLICATION_PATH: &str = "/api/applications/submit";
pub const ASSESSMENT_PATH: &str = "/api/assessment/submit";
pub const CONTACT_PATH: &str = "/api/contact/submit";
pub const EMAIL_STATUS_PATH: &str = "/api/debug/email-status";
pub const OAUTH_START_PATH: &str = "/api/google/oauth2/start";
pub const OAUTH_CALLBACK_PATH: &str = "/api/google/oauth2/callback";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<MailerConfig>,
    pub client: Arc<dyn HttpClient>,
}

impl AppState {
    pub fn new(config: MailerConfig, client: Arc<dyn HttpClient>) -> Self {
        Self {
            config: Arc::new(config),
            client,
        }
    }

    /// State backed by the real transport, honouring the configured timeout.
    pub fn with_ureq(config: MailerConfig) -> Self {
        let client = UreqClient::new(config.settings.http_timeout());
        Self::new(config, Arc::new(client))
    }
}

pub fn build_router(state: AppState) -> Router {
    let settings = &state.config.settings;
    let mut router = Router::new()
        .route("/healthz", get(healthz))
        .route(APPLICATION_PATH, post(routes::submit::application))
        .route(ASSESSMENT_PATH, post(routes::submit::assessment))
        .route(CONTACT_PATH, post(routes::submit::contact));
    if settings.enable_debug_status {
        router = router.route(EMAIL_STATUS_PATH, get(routes::status::email_status));
    }
    if settings.enable_oauth_bootstrap {
        router = router
            .route(OAUTH_START_PATH, get(routes::oauth::start))
            .route(OAUTH_CALLBACK_PATH, get(routes::oauth::callback));
    }
    router
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

pub(crate) fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}
