//! Form types accepted by the site, their field tables and email templates.

use std::collections::BTreeMap;
use std::fmt;

use crate::config::{CLIENT_ID_VAR, CLIENT_SECRET_VAR, REFRESH_TOKEN_VAR, SENDER_VAR};
use crate::error::MailerError;

/// Largest accepted attachment: 10 MiB.
pub const MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;
pub const PDF_MIME: &str = "application/pdf";
/// Multipart field name carrying the uploaded file.
pub const ATTACHMENT_FIELD: &str = "attachment";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormKind {
    Application,
    Assessment,
    Contact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldCheck {
    Any,
    /// Must contain `@` when non-empty.
    Email,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub required: bool,
    pub check: FieldCheck,
}

const fn required(name: &'static str, label: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        label,
        required: true,
        check: FieldCheck::Any,
    }
}

const fn optional(name: &'static str, label: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        label,
        required: false,
        check: FieldCheck::Any,
    }
}

const fn email(name: &'static str, label: &'static str, required: bool) -> FieldSpec {
    FieldSpec {
        name,
        label,
        required,
        check: FieldCheck::Email,
    }
}

const APPLICATION_FIELDS: &[FieldSpec] = &[
    required("parentName", "Parent's Full Name"),
    required("studentName", "Student's Full Name"),
    optional("age", "Age"),
    optional("schooling", "Schooling"),
    email("email", "Email", true),
    optional("phone", "Phone"),
    required("recentBooks", "Recent books read in math"),
    required("reading", "Rate this student's engagement in reading"),
    required(
        "approachExamples",
        "State specific examples, showing how your student approaches challenging work",
    ),
    required("courses", "Math courses completed"),
    required("contests", "Competitions/Contests taken (and results)"),
    required("clubs", "Math circle/clubs/events attended"),
    optional("extra", "Additional Notes"),
];

const ASSESSMENT_FIELDS: &[FieldSpec] = &[
    optional("firstName", "First Name"),
    optional("lastName", "Last Name"),
    optional("email", "Email"),
    optional("message", "Message"),
];

const CONTACT_FIELDS: &[FieldSpec] = &[
    optional("firstName", "First Name"),
    optional("lastName", "Last Name"),
    email("email", "Email", true),
    optional("message", "Message"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentRule {
    /// Checked and attached when present.
    Optional,
    Required,
}

/// Where the `To` address comes from when no recipient override is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientFallback {
    DefaultRecipient,
    Sender,
}

impl FormKind {
    pub const ALL: [FormKind; 3] = [FormKind::Application, FormKind::Assessment, FormKind::Contact];

    pub fn as_str(self) -> &'static str {
        match self {
            FormKind::Application => "application",
            FormKind::Assessment => "assessment",
            FormKind::Contact => "contact",
        }
    }

    pub fn fields(self) -> &'static [FieldSpec] {
        match self {
            FormKind::Application => APPLICATION_FIELDS,
            FormKind::Assessment => ASSESSMENT_FIELDS,
            FormKind::Contact => CONTACT_FIELDS,
        }
    }

    pub fn attachment_rule(self) -> AttachmentRule {
        match self {
            FormKind::Assessment => AttachmentRule::Required,
            FormKind::Application | FormKind::Contact => AttachmentRule::Optional,
        }
    }

    /// Configuration variables that must be set before this form can be relayed.
    /// Only the application form may fall back to the profile lookup for its
    /// sender address.
    pub fn required_config(self) -> &'static [&'static str] {
        match self {
            FormKind::Application => &[CLIENT_ID_VAR, CLIENT_SECRET_VAR, REFRESH_TOKEN_VAR],
            FormKind::Assessment | FormKind::Contact => {
                &[CLIENT_ID_VAR, CLIENT_SECRET_VAR, REFRESH_TOKEN_VAR, SENDER_VAR]
            }
        }
    }

    pub fn recipient_fallback(self) -> RecipientFallback {
        match self {
            FormKind::Assessment => RecipientFallback::Sender,
            FormKind::Application | FormKind::Contact => RecipientFallback::DefaultRecipient,
        }
    }

    pub fn default_filename(self) -> &'static str {
        match self {
            FormKind::Assessment => "assessment.pdf",
            FormKind::Application | FormKind::Contact => "attachment.pdf",
        }
    }

    fn accepts(self, name: &str) -> bool {
        self.fields().iter().any(|field| field.name == name)
    }
}

impl fmt::Display for FormKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    /// Media type without parameters, lowercased.
    pub fn essence(&self) -> String {
        self.content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Text fields plus at most one uploaded file, as posted by a site form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormSubmission {
    fields: BTreeMap<String, String>,
    attachment: Option<Attachment>,
}

impl FormSubmission {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut submission = Self::new();
        for (name, value) in pairs {
            submission.insert_field(name, value);
        }
        submission
    }

    /// The first value posted for a field wins.
    pub fn insert_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.entry(name.into()).or_insert_with(|| value.into());
    }

    /// Only the first uploaded file is kept.
    pub fn set_attachment(&mut self, attachment: Attachment) {
        if self.attachment.is_none() {
            self.attachment = Some(attachment);
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.set_attachment(attachment);
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Field value, or `""` when the field was not posted.
    pub fn value(&self, name: &str) -> &str {
        self.field(name).unwrap_or_default()
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    /// Keep only the fields this form type understands.
    pub fn for_kind(mut self, kind: FormKind) -> Self {
        self.fields.retain(|name, _| kind.accepts(name));
        self
    }
}

/// Check the submitted fields and upload against the form's table.
pub fn validate(kind: FormKind, submission: &FormSubmission) -> Result<(), MailerError> {
    let missing: Vec<&str> = kind
        .fields()
        .iter()
        .filter(|field| field.required && submission.value(field.name).trim().is_empty())
        .map(|field| field.label)
        .collect();
    if !missing.is_empty() {
        return Err(MailerError::validation(format!(
            "Please fill in the following required fields: {}",
            missing.join(", ")
        )));
    }

    let bad_email = kind.fields().iter().any(|field| {
        let value = submission.value(field.name).trim();
        field.check == FieldCheck::Email && !value.is_empty() && !value.contains('@')
    });
    if bad_email {
        return Err(MailerError::validation(
            "Please provide a valid email address.",
        ));
    }

    match (kind.attachment_rule(), submission.attachment()) {
        (_, Some(attachment)) => validate_attachment(attachment),
        (AttachmentRule::Required, None) => Err(MailerError::validation(
            "Please attach a single PDF file.",
        )),
        (AttachmentRule::Optional, None) => Ok(()),
    }
}

fn validate_attachment(attachment: &Attachment) -> Result<(), MailerError> {
    if attachment.essence() != PDF_MIME {
        return Err(MailerError::validation("Attachment must be a PDF."));
    }
    if attachment.data.len() > MAX_ATTACHMENT_BYTES {
        return Err(MailerError::validation("Attachment too large (max 10MB)."));
    }
    Ok(())
}

/// Unencoded subject line for a submission.
pub fn subject(kind: FormKind, submission: &FormSubmission) -> String {
    let or = |name: &str, fallback: &'static str| -> String {
        let value = submission.value(name);
        if value.is_empty() {
            fallback.to_string()
        } else {
            value.to_string()
        }
    };
    match kind {
        FormKind::Application => format!(
            "New Application - {} ({})",
            or("studentName", "Student"),
            or("parentName", "Parent")
        ),
        FormKind::Assessment => format!(
            "Assessment Upload - {} {}",
            or("firstName", "First"),
            or("lastName", "Last")
        )
        .trim()
        .to_string(),
        FormKind::Contact => {
            let name = format!(
                "{} {}",
                submission.value("firstName"),
                submission.value("lastName")
            );
            let name = name.trim();
            if name.is_empty() {
                "Website Contact".to_string()
            } else {
                format!("Contact Form - {name}")
            }
        }
    }
}

/// Plain-text body lines, in the fixed order the office reads them.
pub fn body_lines(kind: FormKind, submission: &FormSubmission, site_name: &str) -> Vec<String> {
    let v = |name: &str| submission.value(name).to_string();
    let labelled = |label: &str, name: &str| format!("{label}: {}", submission.value(name));
    match kind {
        FormKind::Application => vec![
            format!("New {site_name} Application Submission"),
            String::new(),
            labelled("Parent Name", "parentName"),
            labelled("Student Name", "studentName"),
            labelled("Age", "age"),
            labelled("Schooling", "schooling"),
            labelled("Applicant Email", "email"),
            labelled("Phone", "phone"),
            String::new(),
            labelled("Recent Math Books", "recentBooks"),
            labelled("Reading Engagement", "reading"),
            String::new(),
            "Approach to Challenging Work:".to_string(),
            v("approachExamples"),
            String::new(),
            "Math Courses Completed:".to_string(),
            v("courses"),
            String::new(),
            "Competitions / Contests:".to_string(),
            v("contests"),
            String::new(),
            "Math Circles / Clubs / Events:".to_string(),
            v("clubs"),
            String::new(),
            "Additional Notes:".to_string(),
            v("extra"),
        ],
        FormKind::Assessment => vec![
            "New Assessment Submission".to_string(),
            String::new(),
            format!("Student: {} {}", v("firstName"), v("lastName"))
                .trim()
                .to_string(),
            labelled("Email", "email"),
            String::new(),
            "Message:".to_string(),
            v("message"),
        ],
        FormKind::Contact => {
            let message = submission.value("message");
            vec![
                format!("New Contact Form Submission from {site_name} Website"),
                String::new(),
                format!("Name: {} {}", v("firstName"), v("lastName"))
                    .trim()
                    .to_string(),
                labelled("Email", "email"),
                String::new(),
                "Message:".to_string(),
                if message.is_empty() {
                    "(No message provided)".to_string()
                } else {
                    message.to_string()
                },
                String::new(),
                "---".to_string(),
                format!("This message was sent from the Get in Touch form on the {site_name} website."),
            ]
        }
    }
}

/// Submitter address for `Reply-To`, when one was given.
pub fn submitter_email(submission: &FormSubmission) -> Option<&str> {
    Some(submission.value("email").trim()).filter(|value| !value.is_empty())
}
