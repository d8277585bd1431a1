use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use mailparse::MailHeaderMap;
use serde_json::{Value, json};
use site_mailer::config::{
    CLIENT_ID_VAR, CLIENT_SECRET_VAR, GoogleEndpoints, REFRESH_TOKEN_VAR, SENDER_VAR,
};
use site_mailer::forms::MAX_ATTACHMENT_BYTES;
use site_mailer::http::HttpResponse;
use site_mailer::{MailerConfig, MailerSettings, RecordingClient};
use site_mailer_server::{AppState, build_router};
use tower::ServiceExt;

const BOUNDARY: &str = "formBoundary7MA4YWxk";

fn settings() -> MailerSettings {
    MailerSettings {
        endpoints: GoogleEndpoints {
            token_url: "https://token.test/token".into(),
            auth_url: "https://accounts.test/auth".into(),
            profile_url: "https://gmail.test/profile".into(),
            send_url: "https://gmail.test/send".into(),
        },
        ..MailerSettings::default()
    }
}

fn full_config(settings: MailerSettings) -> MailerConfig {
    MailerConfig::from_lookup(
        |key| match key {
            CLIENT_ID_VAR => Some("client-id".into()),
            CLIENT_SECRET_VAR => Some("client-secret".into()),
            REFRESH_TOKEN_VAR => Some("1//refresh".into()),
            SENDER_VAR => Some("office@example.org".into()),
            _ => None,
        },
        settings,
    )
}

fn app(config: MailerConfig, client: &Arc<RecordingClient>) -> axum::Router {
    build_router(AppState::new(config, client.clone()))
}

fn urlencoded(path: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn multipart(path: &str, fields: &[(&str, &str)], file: Option<(&str, &str, &[u8])>) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((filename, content_type, data)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"attachment\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    Request::builder()
        .method("POST")
        .uri(path)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(resp: Response) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn text_body(resp: Response) -> String {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn token_ok() -> HttpResponse {
    HttpResponse::json(200, &json!({"access_token": "ya29.test"}))
}

#[tokio::test]
async fn healthz_answers_ok() {
    let client = Arc::new(RecordingClient::new());
    let resp = app(full_config(settings()), &client)
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(text_body(resp).await, "ok");
}

#[tokio::test]
async fn urlencoded_application_is_delivered() {
    let client = Arc::new(RecordingClient::with_responses([
        token_ok(),
        HttpResponse::json(200, &json!({"id": "1"})),
    ]));
    let body = "parentName=Ann+Lee&studentName=Sam+Lee&email=ann%40example.com&recentBooks=X\
                &reading=High&approachExamples=Y&courses=Z&contests=W&clubs=V&unknown=ignored";
    let resp = app(full_config(settings()), &client)
        .oneshot(urlencoded("/api/applications/submit", body))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await, json!({"ok": true}));

    let calls = client.calls();
    assert_eq!(calls.len(), 2);
    let payload: Value = serde_json::from_slice(calls[1].body.as_deref().unwrap()).unwrap();
    let raw = URL_SAFE_NO_PAD
        .decode(payload["raw"].as_str().unwrap())
        .unwrap();
    let parsed = mailparse::parse_mail(&raw).unwrap();
    assert_eq!(
        parsed.headers.get_first_value("Subject").as_deref(),
        Some("New Application - Sam Lee (Ann Lee)")
    );
    assert!(!parsed.get_body().unwrap().contains("ignored"));
}

#[tokio::test]
async fn missing_email_is_rejected_without_upstream_calls() {
    let client = Arc::new(RecordingClient::new());
    let resp = app(full_config(settings()), &client)
        .oneshot(urlencoded("/api/contact/submit", "firstName=Jo&message=hi"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(resp).await,
        json!({"error": "Please fill in the following required fields: Email"})
    );
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn non_pdf_upload_is_rejected() {
    let client = Arc::new(RecordingClient::new());
    let req = multipart(
        "/api/assessment/submit",
        &[("firstName", "Kai")],
        Some(("scan.png", "image/png", &b"\x89PNG"[..])),
    );
    let resp = app(full_config(settings()), &client).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(resp).await, json!({"error": "Attachment must be a PDF."}));
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn oversized_pdf_gets_validation_message() {
    let client = Arc::new(RecordingClient::new());
    let data = vec![b'0'; MAX_ATTACHMENT_BYTES + 1];
    let req = multipart(
        "/api/assessment/submit",
        &[("firstName", "Kai")],
        Some(("big.pdf", "application/pdf", data.as_slice())),
    );
    let resp = app(full_config(settings()), &client).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(resp).await,
        json!({"error": "Attachment too large (max 10MB)."})
    );
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn assessment_pdf_is_delivered_as_multipart() {
    let client = Arc::new(RecordingClient::with_responses([
        token_ok(),
        HttpResponse::json(200, &json!({"id": "1"})),
    ]));
    let req = multipart(
        "/api/assessment/submit",
        &[("firstName", "Kai"), ("lastName", "Okafor")],
        Some(("work.pdf", "application/pdf", &b"%PDF-1.7 test"[..])),
    );
    let resp = app(full_config(settings()), &client).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let calls = client.calls();
    let payload: Value = serde_json::from_slice(calls[1].body.as_deref().unwrap()).unwrap();
    let raw = URL_SAFE_NO_PAD
        .decode(payload["raw"].as_str().unwrap())
        .unwrap();
    let parsed = mailparse::parse_mail(&raw).unwrap();
    assert_eq!(parsed.subparts.len(), 2);
    assert_eq!(parsed.subparts[1].get_body_raw().unwrap(), b"%PDF-1.7 test");
}

#[tokio::test]
async fn token_failure_is_generic_500() {
    let client = Arc::new(RecordingClient::with_responses([HttpResponse::json(
        401,
        &json!({"error": "invalid_client"}),
    )]));
    let resp = app(full_config(settings()), &client)
        .oneshot(urlencoded("/api/contact/submit", "email=jo%40example.com"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(resp).await;
    let message = body["error"].as_str().unwrap();
    assert!(message.starts_with("We're experiencing technical difficulties."));
    assert!(!message.contains("invalid_client"));
    assert_eq!(client.calls().len(), 1);
}

#[tokio::test]
async fn unsupported_content_type_is_415() {
    let client = Arc::new(RecordingClient::new());
    let req = Request::builder()
        .method("POST")
        .uri("/api/contact/submit")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"email":"jo@example.com"}"#))
        .unwrap();
    let resp = app(full_config(settings()), &client).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn debug_status_is_off_by_default() {
    let client = Arc::new(RecordingClient::new());
    let resp = app(full_config(settings()), &client)
        .oneshot(
            Request::get("/api/debug/email-status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn debug_status_reports_without_caching() {
    let client = Arc::new(RecordingClient::with_responses([token_ok()]));
    let config = full_config(MailerSettings {
        enable_debug_status: true,
        ..settings()
    });
    let resp = app(config, &client)
        .oneshot(
            Request::get("/api/debug/email-status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-cache, no-store, must-revalidate"
    );
    let body = json_body(resp).await;
    assert_eq!(body["allVariablesSet"], true);
    assert_eq!(body["tokenTest"]["success"], true);
    assert_eq!(body["variables"]["GMAIL_REFRESH_TOKEN"]["exists"], true);
    assert!(body["variables"]["GMAIL_REFRESH_TOKEN"].get("preview").is_none());
}

fn oauth_settings() -> MailerSettings {
    MailerSettings {
        enable_oauth_bootstrap: true,
        ..settings()
    }
}

#[tokio::test]
async fn oauth_start_redirects_with_state_cookie() {
    let client = Arc::new(RecordingClient::new());
    let resp = app(full_config(oauth_settings()), &client)
        .oneshot(
            Request::get("/api/google/oauth2/start")
                .header(header::HOST, "site.test")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = resp
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(location.starts_with("https://accounts.test/auth?client_id=client-id&"));
    assert!(location.contains(
        "redirect_uri=http%3A%2F%2Fsite.test%2Fapi%2Fgoogle%2Foauth2%2Fcallback"
    ));
    let cookie = resp
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(cookie.starts_with("google_oauth_state="));
    assert!(cookie.ends_with("; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=600"));
    let nonce = cookie
        .trim_start_matches("google_oauth_state=")
        .split(';')
        .next()
        .unwrap();
    assert!(location.contains(&format!("state={nonce}")));
}

#[tokio::test]
async fn oauth_start_requires_client_id() {
    let client = Arc::new(RecordingClient::new());
    let resp = app(MailerConfig::from_lookup(|_| None, oauth_settings()), &client)
        .oneshot(
            Request::get("/api/google/oauth2/start")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json_body(resp).await,
        json!({"error": "Missing GMAIL_CLIENT_ID"})
    );
}

#[tokio::test]
async fn oauth_callback_rejects_state_mismatch() {
    let client = Arc::new(RecordingClient::new());
    let resp = app(full_config(oauth_settings()), &client)
        .oneshot(
            Request::get("/api/google/oauth2/callback?code=4%2Fabc&state=one")
                .header(header::COOKIE, "google_oauth_state=two")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn oauth_callback_shows_refresh_token() {
    let client = Arc::new(RecordingClient::with_responses([HttpResponse::json(
        200,
        &json!({"access_token": "ya29", "refresh_token": "1//new<token>"}),
    )]));
    let resp = app(full_config(oauth_settings()), &client)
        .oneshot(
            Request::get("/api/google/oauth2/callback?code=4%2Fabc&state=nonce-1")
                .header(header::HOST, "site.test")
                .header(header::COOKIE, "google_oauth_state=nonce-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = resp
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("google_oauth_state=;"));
    assert!(cookie.ends_with("Max-Age=0"));
    let page = text_body(resp).await;
    assert!(page.contains("GMAIL_REFRESH_TOKEN=1//new&lt;token&gt;"));

    let calls = client.calls();
    assert_eq!(calls.len(), 1);
    let form = calls[0].body_text().unwrap();
    assert!(form.contains("code=4%2Fabc"));
    assert!(form.contains("grant_type=authorization_code"));
    assert!(form.contains("redirect_uri=http%3A%2F%2Fsite.test%2Fapi%2Fgoogle%2Foauth2%2Fcallback"));
}

#[tokio::test]
async fn oauth_callback_without_refresh_token_explains_retry() {
    let client = Arc::new(RecordingClient::with_responses([HttpResponse::json(
        200,
        &json!({"access_token": "ya29"}),
    )]));
    let resp = app(
        full_config(MailerSettings {
            public_base_url: Some("https://mathnuts.example".into()),
            ..oauth_settings()
        }),
        &client,
    )
    .oneshot(
        Request::get("/api/google/oauth2/callback?code=c&state=s")
            .header(header::COOKIE, "google_oauth_state=s")
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let page = text_body(resp).await;
    assert!(page.contains("No refresh token returned"));
    assert!(page.contains("https://mathnuts.example/api/google/oauth2/start"));
}
