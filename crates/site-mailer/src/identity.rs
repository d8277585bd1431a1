use serde::Deserialize;
use tracing::debug;

use crate::auth::AccessToken;
use crate::error::MailerError;
use crate::http::{HttpClient, HttpRequest};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Profile {
    #[serde(default)]
    email_address: Option<String>,
}

/// Sender mailbox: the configured address when set, otherwise the
/// authenticated account's address from the profile endpoint.
pub fn resolve_sender(
    client: &dyn HttpClient,
    profile_url: &str,
    configured: Option<&str>,
    token: &AccessToken,
) -> Result<String, MailerError> {
    if let Some(sender) = configured.map(str::trim)
        && !sender.is_empty()
    {
        return Ok(sender.to_string());
    }

    debug!("no configured sender; querying mailbox profile");
    let request = HttpRequest::get(profile_url).with_header("Authorization", token.bearer());
    let resp = client
        .send(&request)
        .map_err(|err| MailerError::auth(format!("profile lookup error: {err}")))?;
    if !resp.is_success() {
        return Err(MailerError::auth(format!(
            "profile endpoint returned status {} body={}",
            resp.status,
            resp.truncated_text()
        )));
    }
    let profile: Profile = serde_json::from_slice(&resp.body)
        .map_err(|err| MailerError::auth(format!("invalid profile response: {err}")))?;
    profile
        .email_address
        .map(|address| address.trim().to_string())
        .filter(|address| !address.is_empty())
        .ok_or_else(|| MailerError::auth("profile response missing emailAddress"))
}
