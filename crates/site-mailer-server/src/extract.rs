//! Turns a posted form body into a [`FormSubmission`].

use axum::{
    Form,
    extract::{FromRequest, Multipart, Request, multipart::MultipartError},
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use site_mailer::forms::ATTACHMENT_FIELD;
use site_mailer::{Attachment, FormSubmission};
use tracing::warn;

use crate::json_error;

const OCTET_STREAM: &str = "application/octet-stream";

/// Body that could not be read as a form. The detail is logged, the client
/// only sees a short reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyRejection {
    pub status: StatusCode,
    pub detail: String,
}

impl BodyRejection {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    fn multipart(err: MultipartError) -> Self {
        Self::new(err.status(), err.body_text())
    }

    pub fn public_message(&self) -> &'static str {
        match self.status {
            StatusCode::PAYLOAD_TOO_LARGE => "Request body too large.",
            StatusCode::UNSUPPORTED_MEDIA_TYPE => "Unsupported content type.",
            _ => "Invalid form submission.",
        }
    }
}

impl IntoResponse for BodyRejection {
    fn into_response(self) -> Response {
        warn!(status = %self.status, detail = %self.detail, "form body rejected");
        json_error(self.status, self.public_message())
    }
}

/// Read a `multipart/form-data` or `application/x-www-form-urlencoded` body.
pub async fn read_submission(req: Request) -> Result<FormSubmission, BodyRejection> {
    let is_multipart = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| {
            value
                .trim_start()
                .to_ascii_lowercase()
                .starts_with("multipart/form-data")
        });
    if is_multipart {
        let multipart = Multipart::from_request(req, &())
            .await
            .map_err(|rejection| BodyRejection::new(rejection.status(), rejection.body_text()))?;
        read_multipart(multipart).await
    } else {
        let Form(pairs) = Form::<Vec<(String, String)>>::from_request(req, &())
            .await
            .map_err(|rejection| BodyRejection::new(rejection.status(), rejection.body_text()))?;
        Ok(FormSubmission::from_pairs(pairs))
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<FormSubmission, BodyRejection> {
    let mut submission = FormSubmission::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(BodyRejection::multipart)?
    {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        match field.file_name().map(str::to_owned) {
            Some(file_name) => {
                let content_type = field
                    .content_type()
                    .map(str::to_owned)
                    .unwrap_or_else(|| OCTET_STREAM.to_string());
                let data = field.bytes().await.map_err(BodyRejection::multipart)?;
                // Browsers post an empty, unnamed part for an untouched file input.
                if name != ATTACHMENT_FIELD || (file_name.is_empty() && data.is_empty()) {
                    continue;
                }
                submission.set_attachment(Attachment::new(file_name, content_type, data.to_vec()));
            }
            None => {
                let value = field.text().await.map_err(BodyRejection::multipart)?;
                submission.insert_field(name, value);
            }
        }
    }
    Ok(submission)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;

    const BOUNDARY: &str = "XyZboundary";

    fn multipart_request(body: String) -> Request {
        HttpRequest::builder()
            .method("POST")
            .uri("/")
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn text_part(name: &str, value: &str) -> String {
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        )
    }

    fn file_part(name: &str, filename: &str, content_type: &str, data: &str) -> String {
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n{data}\r\n"
        )
    }

    #[tokio::test]
    async fn reads_urlencoded_fields() {
        let req = HttpRequest::builder()
            .method("POST")
            .uri("/")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("firstName=Jo&email=jo%40example.com&message=hi+there"))
            .unwrap();
        let submission = read_submission(req).await.unwrap();
        assert_eq!(submission.value("email"), "jo@example.com");
        assert_eq!(submission.value("message"), "hi there");
        assert!(submission.attachment().is_none());
    }

    #[tokio::test]
    async fn reads_multipart_fields_and_attachment() {
        let body = [
            text_part("firstName", "Kai"),
            file_part("attachment", "work.pdf", "application/pdf", "%PDF-1.7"),
            file_part("attachment", "second.pdf", "application/pdf", "%PDF-2"),
            file_part("photo", "me.png", "image/png", "png"),
            format!("--{BOUNDARY}--\r\n"),
        ]
        .concat();
        let submission = read_submission(multipart_request(body)).await.unwrap();
        assert_eq!(submission.value("firstName"), "Kai");
        let attachment = submission.attachment().unwrap();
        assert_eq!(attachment.filename, "work.pdf");
        assert_eq!(attachment.content_type, "application/pdf");
        assert_eq!(attachment.data, b"%PDF-1.7");
    }

    #[tokio::test]
    async fn empty_file_input_is_no_attachment() {
        let body = [
            text_part("email", "jo@example.com"),
            file_part("attachment", "", "application/octet-stream", ""),
            format!("--{BOUNDARY}--\r\n"),
        ]
        .concat();
        let submission = read_submission(multipart_request(body)).await.unwrap();
        assert!(submission.attachment().is_none());
    }

    #[tokio::test]
    async fn other_content_types_are_rejected() {
        let req = HttpRequest::builder()
            .method("POST")
            .uri("/")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let rejection = read_submission(req).await.unwrap_err();
        assert_eq!(rejection.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(rejection.public_message(), "Unsupported content type.");
    }
}
