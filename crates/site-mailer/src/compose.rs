//! RFC 2822 message assembly: a single text part, or multipart/mixed with one
//! base64 attachment.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use urlencoding::encode as url_encode;
use uuid::Uuid;

use crate::forms::{self, Attachment, FormKind, FormSubmission};

const CRLF: &str = "\r\n";
const BASE64_LINE: usize = 76;
/// Characters `encodeURIComponent` leaves alone but `urlencoding` escapes.
const SUBJECT_LITERALS: &str = "!'()*";

/// Finished message bytes, ready for the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedMessage {
    bytes: Vec<u8>,
}

impl ComposedMessage {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct MessageDraft<'a> {
    pub from: &'a str,
    pub to: &'a str,
    pub reply_to: &'a str,
    /// Unencoded subject; encoded on output.
    pub subject: &'a str,
    pub body: &'a str,
    pub attachment: Option<&'a Attachment>,
    /// Used when the attachment's sanitized name comes out empty.
    pub fallback_filename: &'a str,
}

/// Percent-encode like `encodeURIComponent`, then turn `%20` back into spaces.
/// Nothing else is decoded.
pub fn encode_subject(subject: &str) -> String {
    let mut out = String::with_capacity(subject.len());
    let mut buf = [0u8; 4];
    for ch in subject.chars() {
        if SUBJECT_LITERALS.contains(ch) {
            out.push(ch);
        } else {
            out.push_str(&url_encode(ch.encode_utf8(&mut buf)));
        }
    }
    out.replace("%20", " ")
}

/// Header values never carry line breaks.
pub fn sanitize_header_value(value: &str) -> String {
    value.chars().filter(|c| !matches!(c, '\r' | '\n')).collect()
}

pub fn sanitize_filename(name: &str, fallback: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '\r' | '\n' | '"'))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        fallback.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Every line break becomes CRLF, whatever the input used.
pub fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\n', CRLF)
}

pub fn new_boundary() -> String {
    format!("mixed_{}", Uuid::new_v4().simple())
}

pub fn compose(draft: &MessageDraft<'_>) -> ComposedMessage {
    compose_with_boundary(draft, &new_boundary())
}

pub fn compose_with_boundary(draft: &MessageDraft<'_>, boundary: &str) -> ComposedMessage {
    let mut out = String::new();
    append_header(&mut out, "From", &sanitize_header_value(draft.from));
    append_header(&mut out, "To", &sanitize_header_value(draft.to));
    append_header(&mut out, "Reply-To", &sanitize_header_value(draft.reply_to));
    append_header(
        &mut out,
        "Subject",
        &encode_subject(&sanitize_header_value(draft.subject)),
    );
    append_header(&mut out, "MIME-Version", "1.0");

    let body = normalize_newlines(draft.body);
    match draft.attachment {
        None => {
            append_text_headers(&mut out, &body);
            out.push_str(CRLF);
            out.push_str(&body);
        }
        Some(attachment) => {
            append_header(
                &mut out,
                "Content-Type",
                &format!("multipart/mixed; boundary=\"{boundary}\""),
            );
            out.push_str(CRLF);

            out.push_str(&format!("--{boundary}{CRLF}"));
            append_text_headers(&mut out, &body);
            out.push_str(CRLF);
            out.push_str(&body);
            out.push_str(CRLF);

            let filename = sanitize_filename(&attachment.filename, draft.fallback_filename);
            let essence = attachment.essence();
            out.push_str(&format!("--{boundary}{CRLF}"));
            append_header(
                &mut out,
                "Content-Type",
                &format!("{essence}; name=\"{filename}\""),
            );
            append_header(
                &mut out,
                "Content-Disposition",
                &format!("attachment; filename=\"{filename}\""),
            );
            append_header(&mut out, "Content-Transfer-Encoding", "base64");
            out.push_str(CRLF);
            append_base64_lines(&mut out, &attachment.data);
            out.push_str(&format!("--{boundary}--{CRLF}"));
        }
    }
    ComposedMessage {
        bytes: out.into_bytes(),
    }
}

/// Build the notification email for a validated submission.
pub fn compose_submission(
    kind: FormKind,
    submission: &FormSubmission,
    sender: &str,
    recipient: &str,
    site_name: &str,
) -> ComposedMessage {
    let subject = forms::subject(kind, submission);
    let body = forms::body_lines(kind, submission, site_name).join("\n");
    let reply_to = forms::submitter_email(submission).unwrap_or(sender);
    compose(&MessageDraft {
        from: sender,
        to: recipient,
        reply_to,
        subject: &subject,
        body: &body,
        attachment: submission.attachment(),
        fallback_filename: kind.default_filename(),
    })
}

fn append_header(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str(": ");
    out.push_str(value);
    out.push_str(CRLF);
}

fn append_text_headers(out: &mut String, body: &str) {
    append_header(out, "Content-Type", "text/plain; charset=\"UTF-8\"");
    let encoding = if body.is_ascii() { "7bit" } else { "8bit" };
    append_header(out, "Content-Transfer-Encoding", encoding);
}

fn append_base64_lines(out: &mut String, data: &[u8]) {
    let encoded = STANDARD.encode(data);
    // Base64 output is ASCII, so byte offsets are char boundaries.
    let mut rest = encoded.as_str();
    while !rest.is_empty() {
        let (line, tail) = rest.split_at(rest.len().min(BASE64_LINE));
        out.push_str(line);
        out.push_str(CRLF);
        rest = tail;
    }
}
