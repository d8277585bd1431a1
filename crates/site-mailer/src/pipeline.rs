//! One submission, start to finish: configuration check, validation, token
//! exchange, sender lookup, composition and dispatch.

use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::auth::exchange_refresh_token;
use crate::compose::compose_submission;
use crate::config::MailerConfig;
use crate::dispatch::send_message;
use crate::error::MailerError;
use crate::forms::{self, FormKind, FormSubmission, RecipientFallback};
use crate::http::HttpClient;
use crate::identity::resolve_sender;

/// Relay one submission. Every step runs at most once; the first failure ends
/// the request.
pub fn submit(
    kind: FormKind,
    submission: &FormSubmission,
    config: &MailerConfig,
    client: &dyn HttpClient,
) -> Result<(), MailerError> {
    let missing = config.missing(kind.required_config());
    if !missing.is_empty() {
        return Err(MailerError::Config { missing });
    }

    forms::validate(kind, submission)?;

    let endpoints = &config.settings.endpoints;
    let credentials = config.credentials()?;
    let token = exchange_refresh_token(client, &endpoints.token_url, &credentials)?;
    let sender = resolve_sender(
        client,
        &endpoints.profile_url,
        config.configured_sender(),
        &token,
    )?;
    let recipient = resolve_recipient(kind, config, &sender);

    let message = compose_submission(
        kind,
        submission,
        &sender,
        &recipient,
        &config.settings.site_name,
    );
    send_message(client, &endpoints.send_url, &token, &message)?;

    info!(
        form = %kind,
        recipient = %recipient,
        bytes = message.len(),
        attachment = submission.attachment().is_some(),
        "submission delivered"
    );
    Ok(())
}

/// Configured recipient override, else the form's fallback.
pub fn resolve_recipient(kind: FormKind, config: &MailerConfig, sender: &str) -> String {
    if let Some(recipient) = config.recipient.as_deref() {
        return recipient.to_string();
    }
    match kind.recipient_fallback() {
        RecipientFallback::DefaultRecipient => config.settings.default_recipient.clone(),
        RecipientFallback::Sender => sender.to_string(),
    }
}

/// HTTP-shaped outcome of a submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionReply {
    pub status: u16,
    pub body: Value,
}

impl SubmissionReply {
    pub fn ok() -> Self {
        Self {
            status: 200,
            body: json!({ "ok": true }),
        }
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }),
        }
    }
}

/// Log the outcome in full and reduce it to what the submitter may see.
pub fn respond(
    kind: FormKind,
    result: Result<(), MailerError>,
    config: &MailerConfig,
) -> SubmissionReply {
    let err = match result {
        Ok(()) => return SubmissionReply::ok(),
        Err(err) => err,
    };
    match &err {
        MailerError::Validation(reason) => {
            warn!(form = %kind, reason = %reason, "submission rejected")
        }
        MailerError::Config { missing } => {
            warn!(form = %kind, missing = ?missing, "email configuration incomplete")
        }
        MailerError::Auth(_) | MailerError::Delivery(_) | MailerError::Internal(_) => {
            error!(form = %kind, kind = err.kind(), error = %err, "submission failed")
        }
    }
    SubmissionReply::error(
        err.status_code(),
        err.public_message(&config.settings.support_contact),
    )
}

pub fn handle(
    kind: FormKind,
    submission: &FormSubmission,
    config: &MailerConfig,
    client: &dyn HttpClient,
) -> SubmissionReply {
    respond(kind, submit(kind, submission, config, client), config)
}
