use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::json;
use tracing::debug;

use crate::auth::AccessToken;
use crate::compose::ComposedMessage;
use crate::error::MailerError;
use crate::http::{HttpClient, HttpRequest};

/// Gmail's `raw` encoding: URL-safe base64 without padding.
pub fn encode_raw(message: &ComposedMessage) -> String {
    URL_SAFE_NO_PAD.encode(message.as_bytes())
}

pub fn send_message(
    client: &dyn HttpClient,
    send_url: &str,
    token: &AccessToken,
    message: &ComposedMessage,
) -> Result<(), MailerError> {
    let payload = json!({ "raw": encode_raw(message) });
    let body = serde_json::to_vec(&payload)
        .map_err(|err| MailerError::internal(format!("serialize send payload: {err}")))?;
    let request = HttpRequest::post(send_url, "application/json", body)
        .with_header("Authorization", token.bearer());
    debug!(bytes = message.len(), "sending composed message");

    let resp = client
        .send(&request)
        .map_err(|err| MailerError::delivery(format!("send transport error: {err}")))?;
    if !resp.is_success() {
        return Err(MailerError::delivery(format!(
            "send endpoint returned status {} body={}",
            resp.status,
            resp.truncated_text()
        )));
    }
    Ok(())
}
