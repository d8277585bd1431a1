//! Relays the website's application, assessment and contact forms to a Gmail
//! mailbox using OAuth2 refresh-token credentials.

pub mod auth;
pub mod compose;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod forms;
pub mod http;
pub mod identity;
pub mod pipeline;
pub mod status;

pub use auth::AccessToken;
pub use compose::ComposedMessage;
pub use config::{Credentials, MailerConfig, MailerSettings, SettingsError};
pub use error::MailerError;
pub use forms::{Attachment, FormKind, FormSubmission};
pub use http::{HttpClient, RecordingClient, UreqClient};
pub use pipeline::{SubmissionReply, handle, submit};
pub use status::{EmailStatus, email_status};
