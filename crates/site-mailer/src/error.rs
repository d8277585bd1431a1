use thiserror::Error;

/// Failure taxonomy of the submission pipeline.
///
/// Only [`MailerError::Validation`] carries a message meant for the submitter;
/// every other variant is logged in full and shown as a generic apology.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MailerError {
    #[error("email is not configured; missing {}", .missing.join(", "))]
    Config { missing: Vec<&'static str> },
    #[error("{0}")]
    Validation(String),
    #[error("authorization failed: {0}")]
    Auth(String),
    #[error("delivery failed: {0}")]
    Delivery(String),
    #[error("unexpected error: {0}")]
    Internal(String),
}

impl MailerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        MailerError::Validation(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        MailerError::Auth(msg.into())
    }

    pub fn delivery(msg: impl Into<String>) -> Self {
        MailerError::Delivery(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        MailerError::Internal(msg.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MailerError::Config { .. } => "config",
            MailerError::Validation(_) => "validation",
            MailerError::Auth(_) => "auth",
            MailerError::Delivery(_) => "delivery",
            MailerError::Internal(_) => "internal",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            MailerError::Validation(_) => 400,
            _ => 500,
        }
    }

    /// Message safe to return to the person who submitted the form.
    pub fn public_message(&self, support_contact: &str) -> String {
        match self {
            MailerError::Validation(msg) => msg.clone(),
            MailerError::Config { .. } => format!(
                "We're experiencing technical difficulties with our email system. Please try again later or contact us directly at {support_contact}."
            ),
            _ => generic_failure_message(support_contact),
        }
    }
}

pub fn generic_failure_message(support_contact: &str) -> String {
    format!(
        "We're experiencing technical difficulties. Please try again later or contact us directly at {support_contact}."
    )
}
