use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use site_mailer::status::{self, NO_CACHE};
use tracing::error;

use crate::{AppState, json_error};

pub async fn email_status(State(state): State<AppState>) -> Response {
    let config = state.config.clone();
    let client = state.client.clone();
    let report = match tokio::task::spawn_blocking(move || {
        status::email_status(&config, client.as_ref())
    })
    .await
    {
        Ok(report) => report,
        Err(err) => {
            error!(error = %err, "email status worker failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "status check failed");
        }
    };
    (
        [
            (header::CACHE_CONTROL, NO_CACHE),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        Json(report),
    )
        .into_response()
}
