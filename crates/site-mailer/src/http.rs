//! Blocking HTTP seam for every call made to the identity and mail provider.
//!
//! Production code talks to Google through [`UreqClient`]; tests script the
//! upstream with [`RecordingClient`] and inspect which calls were made.

use std::collections::VecDeque;
use std::io::Read;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use http::{Request, Response as RawResponse};
use serde_json::Value;
use ureq::{Agent, Body};

/// Upstream error bodies are cut to this many bytes before they are logged.
pub const ERROR_BODY_LIMIT: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".into(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            method: "POST".into(),
            url: url.into(),
            headers: vec![("Content-Type".into(), content_type.to_string())],
            body: Some(body.into()),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body_text(&self) -> Option<String> {
        self.body
            .as_deref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json(status: u16, value: &Value) -> Self {
        Self::new(status, value.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body as text, cut to [`ERROR_BODY_LIMIT`] bytes on a char boundary.
    pub fn truncated_text(&self) -> String {
        let text = self.text();
        if text.len() <= ERROR_BODY_LIMIT {
            return text;
        }
        let mut end = ERROR_BODY_LIMIT;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text[..end].to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct HttpError {
    pub code: String,
    pub message: String,
}

impl HttpError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

pub trait HttpClient: Send + Sync {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// Real transport. Non-2xx statuses come back as responses, not errors, so the
/// callers can read the provider's error body.
pub struct UreqClient {
    agent: Agent,
}

impl UreqClient {
    pub fn new(timeout: Option<Duration>) -> Self {
        let config = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(timeout)
            .build();
        Self {
            agent: Agent::new_with_config(config),
        }
    }
}

impl Default for UreqClient {
    fn default() -> Self {
        Self::new(None)
    }
}

impl HttpClient for UreqClient {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut builder = Request::builder()
            .method(request.method.as_str())
            .uri(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = match &request.body {
            Some(bytes) => {
                let built = builder
                    .body(bytes.clone())
                    .map_err(|err| HttpError::new("http_request_build", err.to_string()))?;
                self.agent.run(built)
            }
            None => {
                let built = builder
                    .body(())
                    .map_err(|err| HttpError::new("http_request_build", err.to_string()))?;
                self.agent.run(built)
            }
        };
        match response {
            Ok(resp) => build_response(resp),
            Err(err) => Err(HttpError::new("http_transport_error", err.to_string())),
        }
    }
}

fn build_response(resp: RawResponse<Body>) -> Result<HttpResponse, HttpError> {
    let status = resp.status().as_u16();
    let mut reader = resp.into_body().into_reader();
    let mut body = Vec::new();
    reader
        .read_to_end(&mut body)
        .map_err(|err| HttpError::new("http_read_error", err.to_string()))?;
    Ok(HttpResponse { status, body })
}

pub type HttpHistory = Arc<Mutex<Vec<HttpRequest>>>;

/// Scripted client: answers requests in order from a queue and records every
/// request it sees. An exhausted queue answers with a transport error.
#[derive(Default)]
pub struct RecordingClient {
    responses: Mutex<VecDeque<Result<HttpResponse, HttpError>>>,
    history: HttpHistory,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(responses: impl IntoIterator<Item = HttpResponse>) -> Self {
        let client = Self::new();
        for response in responses {
            client.push_response(response);
        }
        client
    }

    pub fn push_response(&self, response: HttpResponse) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(Ok(response));
        }
    }

    pub fn push_error(&self, error: HttpError) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(Err(error));
        }
    }

    pub fn history(&self) -> HttpHistory {
        self.history.clone()
    }

    pub fn calls(&self) -> Vec<HttpRequest> {
        self.history
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl HttpClient for RecordingClient {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, HttpError> {
        if let Ok(mut calls) = self.history.lock() {
            calls.push(request.clone());
        }
        self.responses
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or_else(|| {
                Err(HttpError::new(
                    "no_scripted_response",
                    format!("no response scripted for {} {}", request.method, request.url),
                ))
            })
    }
}
